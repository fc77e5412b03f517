//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use profiler_lib::error::{SearchError, StatsError};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No rows".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a table whose columns are only known at runtime
pub fn print_grid(header: Vec<String>, rows: Vec<Vec<String>>) {
    let mut builder = Builder::default();
    builder.push_record(header);
    for row in rows {
        builder.push_record(row);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a percentage with one decimal
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.1}%", ratio)
}

/// Format a percentile result, keeping Na results visible
pub fn format_stat(result: &Result<u64, StatsError>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(e) => e.to_string().yellow().to_string(),
    }
}

/// Color a search result cell
pub fn color_search_result(result: &Result<u64, SearchError>) -> String {
    match result {
        Ok(rate) => rate.to_string().green().to_string(),
        Err(SearchError::Unservable { .. }) => "unservable".red().to_string(),
        Err(SearchError::NoResult { rate, .. }) => format!("no result @ {rate}").yellow().to_string(),
        Err(SearchError::Cancelled { .. }) => "cancelled".yellow().to_string(),
        Err(e) => e.to_string().red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ratio() {
        assert_eq!(format_ratio(12.345), "12.3%");
        assert_eq!(format_ratio(0.0), "0.0%");
    }

    #[test]
    fn test_format_stat() {
        colored::control::set_override(false);
        assert_eq!(format_stat(&Ok(17)), "17");
        let na = format_stat(&Err(StatsError::InsufficientSamples {
            samples: 3,
            required: 100,
        }));
        assert!(na.starts_with("Na"));
    }
}
