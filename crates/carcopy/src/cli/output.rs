//! Output formatting for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use std::time::{Duration, SystemTime};

/// Format a system time relative to now, e.g. "5 minutes ago".
///
/// Anything older than a week is shown as an absolute local date.
pub fn format_time(time: SystemTime) -> String {
    match SystemTime::now().duration_since(time) {
        Ok(duration) => format_duration_ago(duration, time),
        Err(_) => "just now".to_string(),
    }
}

fn format_duration_ago(duration: Duration, time: SystemTime) -> String {
    let secs = duration.as_secs();
    let (value, unit) = match secs {
        0..=59 => (secs, "second"),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=604_799 => (secs / 86_400, "day"),
        _ => {
            let datetime: chrono::DateTime<chrono::Local> = time.into();
            return datetime.format("%Y-%m-%d %H:%M").to_string();
        }
    };
    format!("{} {}{} ago", value, unit, if value == 1 { "" } else { "s" })
}

/// RFC 3339 UTC timestamp, used in JSON output.
pub fn format_time_rfc3339(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339()
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}
