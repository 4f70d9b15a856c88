//! gscdata library
//!
//! Cached access to Google Search Console performance data. The binary in
//! `main.rs` is a thin CLI over `PerformanceService`.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod performance;
pub mod report;

pub use performance::PerformanceService;
