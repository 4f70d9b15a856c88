//! gscdata - Google Search Console performance data in the terminal
//!
//! Shows clicks, impressions, CTR and position for a site's pages. Results are
//! cached on disk so repeated lookups do not hit the API.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::Parser;
use futures::future::join_all;

use gscdata::auth::{CredentialAuth, CredentialSource};
use gscdata::cache::{CacheManager, MemoryStore, Store};
use gscdata::cli::{
    parse_page_url_arg, parse_site_url_arg, CacheAction, Cli, CliError, Command, LogAction,
    QueryOptions,
};
use gscdata::config::{default_log_path, PerformanceConfig, Settings};
use gscdata::data::{PerformanceOutcome, SitesOutcome};
use gscdata::report::{detail_lines, render_table, status_line, ColumnLayout};
use gscdata::{logging, PerformanceService};

/// Builds the store: the on-disk cache if a directory is known, otherwise memory only
fn build_store(settings: &Settings) -> Arc<dyn Store> {
    match settings.resolved_cache_dir() {
        Some(dir) => Arc::new(CacheManager::with_dir(dir)),
        None => {
            tracing::warn!("No cache directory available; results will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_service(settings: &Settings) -> PerformanceService {
    let auth = CredentialAuth::new(CredentialSource::from_settings(&settings.auth));
    PerformanceService::new(
        Arc::new(auth),
        build_store(settings),
        PerformanceConfig::default(),
    )
}

/// Prints a page's status line followed by its indented detail lines
fn print_page(outcome: &PerformanceOutcome, start: NaiveDate, end: NaiveDate) {
    println!("{}", status_line(outcome));
    for line in detail_lines(outcome, start, end) {
        println!("  {}", line);
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let options = QueryOptions::resolve(&cli, &settings)?;
    let service = build_service(&settings);
    let (start, end) = options.date_range.window(Local::now().date_naive());

    match cli.command {
        Command::Page { url } => {
            let url = parse_page_url_arg(&url)?;
            let property = options.require_property()?;
            let outcome = service
                .get_performance_data(property, start, end, Some(url.as_str()))
                .await;
            print_page(&outcome, start, end);
        }
        Command::Columns { urls } => {
            let urls = urls
                .iter()
                .map(|url| parse_page_url_arg(url))
                .collect::<Result<Vec<_>, _>>()?;
            let property = options.require_property()?;
            let outcomes = join_all(urls.iter().map(|url| {
                service.get_performance_data(property, start, end, Some(url.as_str()))
            }))
            .await;
            let pages: Vec<_> = urls.into_iter().zip(outcomes).collect();
            print!("{}", render_table(&pages, ColumnLayout::from_settings(&settings)));
        }
        Command::Site => {
            let property = options.require_property()?;
            let outcome = service.get_performance_data(property, start, end, None).await;
            match &outcome {
                PerformanceOutcome::Rows(rows) if !rows.is_empty() => {
                    let pages: Vec<_> = rows
                        .iter()
                        .map(|row| (row.page.clone(), PerformanceOutcome::Rows(vec![row.clone()])))
                        .collect();
                    let layout = ColumnLayout {
                        combine_clicks_impressions: settings.combine_clicks_impressions,
                        show_extra_columns: true,
                    };
                    println!("{} ({} - {})", property, start, end);
                    print!("{}", render_table(&pages, layout));
                }
                _ => print_page(&outcome, start, end),
            }
        }
        Command::Sites { site_url } => {
            let site_url = site_url
                .or_else(|| settings.site_url.clone())
                .ok_or(CliError::MissingSiteUrl)?;
            let host = parse_site_url_arg(&site_url)?;
            match service.get_filtered_sites(&host).await {
                SitesOutcome::Sites(sites) if sites.is_empty() => {
                    println!("No Search Console properties match {}", host);
                }
                SitesOutcome::Sites(sites) => {
                    for site in sites {
                        println!("{}", site);
                    }
                }
                SitesOutcome::Error(message) => {
                    println!("API Error: {}", gscdata::report::sanitize_message(&message));
                }
                SitesOutcome::Unauthenticated => {
                    println!("Not authenticated. Configure an access token first.");
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Clear => {
                let removed = service.clear_cache()?;
                println!("Removed {} cached result(s)", removed);
            }
            CacheAction::Count => println!("{}", service.cache_count()?),
        },
        Command::Log { action } => {
            let path = default_log_path().ok_or("No data directory available for the log file")?;
            match action {
                LogAction::Clear => {
                    if logging::clear_log(&path)? {
                        println!("Log file cleared");
                    } else {
                        println!("No log file to clear");
                    }
                }
                LogAction::Path => println!("{}", path.display()),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    // Logging failures never stop the command
    let log_file = if settings.enable_logging {
        default_log_path()
    } else {
        None
    };
    if let Some(path) = logging::init(log_file.as_deref()) {
        tracing::debug!(path = %path.display(), "Writing debug log");
    }

    if let Err(e) = run(cli, settings).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
