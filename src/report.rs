//! Text rendering of performance outcomes
//!
//! Two views: a one-line status (with detail lines) for a single page, and a
//! table with one row per page whose columns follow the user's layout flags.
//! Every outcome renders to something: a number, "No Data"/"0", an error
//! marker, or an authentication marker.

use chrono::NaiveDate;

use crate::config::Settings;
use crate::data::{PerformanceOutcome, Row};

/// Prefix of the status line
const STATUS_PREFIX: &str = "GSC: ";

/// Longest error message shown to the user
const MAX_MESSAGE_CHARS: usize = 300;

/// Formats an integer with thousands separators (`12345` -> `12,345`)
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// CTR fraction as a percentage with two decimals (`0.0345` -> `3.45%`)
pub fn format_ctr(ctr: f64) -> String {
    format!("{:.2}%", ctr * 100.0)
}

pub fn format_position(position: f64) -> String {
    format!("{:.1}", position)
}

/// Makes an upstream message safe to print on a terminal
///
/// Control characters (including ANSI escapes) are dropped, whitespace runs
/// collapse to one space and the result is capped in length.
pub fn sanitize_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = collapsed.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}…", truncated)
    } else {
        collapsed
    }
}

/// First row of a successful, non-empty outcome
///
/// Page-filtered queries return at most one row, so it is the page's total.
fn first_row(outcome: &PerformanceOutcome) -> Option<&Row> {
    outcome.rows().and_then(|rows| rows.first())
}

/// One-line summary, e.g. `GSC: 1,204 Clicks / 33,870 Impr.`
pub fn status_line(outcome: &PerformanceOutcome) -> String {
    let body = match outcome {
        PerformanceOutcome::Unauthenticated => "Auth Error".to_string(),
        PerformanceOutcome::Error(_) => "API Error".to_string(),
        PerformanceOutcome::Rows(rows) => match rows.first() {
            None => "No Data".to_string(),
            Some(row) => format!(
                "{} Clicks / {} Impr.",
                format_count(row.clicks),
                format_count(row.impressions)
            ),
        },
    };
    format!("{}{}", STATUS_PREFIX, body)
}

/// Detail lines shown under the status line
///
/// Data outcomes list every metric and the date range; an error outcome gives
/// its sanitized message; other outcomes have no details.
pub fn detail_lines(
    outcome: &PerformanceOutcome,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<String> {
    if let PerformanceOutcome::Error(error) = outcome {
        return vec![format!("Error: {}", sanitize_message(&error.message))];
    }
    let Some(row) = first_row(outcome) else {
        return Vec::new();
    };
    vec![
        format!("Clicks: {}", format_count(row.clicks)),
        format!("Impressions: {}", format_count(row.impressions)),
        format!("CTR: {}", format_ctr(row.ctr)),
        format!("Position: {}", format_position(row.position)),
        format!("Range: {} - {}", start_date, end_date),
    ]
}

/// A metric column in the page table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Clicks,
    Impressions,
    ClicksImpressions,
    Ctr,
    Position,
}

impl Column {
    pub fn title(self) -> &'static str {
        match self {
            Column::Clicks => "Clicks",
            Column::Impressions => "Impressions",
            Column::ClicksImpressions => "Clicks / Impr.",
            Column::Ctr => "CTR",
            Column::Position => "Position",
        }
    }

    /// Cell text for this column
    pub fn render(self, outcome: &PerformanceOutcome) -> String {
        match outcome {
            PerformanceOutcome::Unauthenticated => return "-".to_string(),
            PerformanceOutcome::Error(_) => return "Error".to_string(),
            PerformanceOutcome::Rows(_) => {}
        }
        let Some(row) = first_row(outcome) else {
            return "0".to_string();
        };
        match self {
            Column::Clicks => format_count(row.clicks),
            Column::Impressions => format_count(row.impressions),
            Column::ClicksImpressions => format!(
                "{} / {}",
                format_count(row.clicks),
                format_count(row.impressions)
            ),
            Column::Ctr => format_ctr(row.ctr),
            Column::Position => format_position(row.position),
        }
    }
}

/// Which metric columns to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub combine_clicks_impressions: bool,
    pub show_extra_columns: bool,
}

impl ColumnLayout {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            combine_clicks_impressions: settings.combine_clicks_impressions,
            show_extra_columns: settings.show_extra_columns,
        }
    }

    pub fn columns(&self) -> Vec<Column> {
        let mut columns = if self.combine_clicks_impressions {
            vec![Column::ClicksImpressions]
        } else {
            vec![Column::Clicks, Column::Impressions]
        };
        if self.show_extra_columns {
            columns.extend([Column::Ctr, Column::Position]);
        }
        columns
    }
}

/// Renders an aligned table with one line per page
///
/// Error messages are listed below the table so the cells stay narrow.
pub fn render_table(pages: &[(String, PerformanceOutcome)], layout: ColumnLayout) -> String {
    let columns = layout.columns();

    let mut header = vec!["Page".to_string()];
    header.extend(columns.iter().map(|c| c.title().to_string()));

    let mut lines = vec![header];
    for (page, outcome) in pages {
        let mut line = vec![page.clone()];
        line.extend(columns.iter().map(|c| c.render(outcome)));
        lines.push(line);
    }

    let widths: Vec<usize> = (0..columns.len() + 1)
        .map(|i| lines.iter().map(|l| l[i].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for line in &lines {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == 0 {
                    format!("{:<width$}", cell, width = *width)
                } else {
                    format!("{:>width$}", cell, width = *width)
                }
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }

    for (page, outcome) in pages {
        if let PerformanceOutcome::Error(error) = outcome {
            out.push_str(&format!(
                "API Error for {}: {}\n",
                page,
                sanitize_message(&error.message)
            ));
        }
    }
    out
}
