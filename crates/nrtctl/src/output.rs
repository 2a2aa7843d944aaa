//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use nrt_cache::{FingerprintStatus, Quantity};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a list of rows as a table or JSON
pub fn print_rows<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return Ok(());
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color an available quantity, red when overcommitted
pub fn color_available(available: &Quantity) -> String {
    let formatted = available.to_string();
    if available.is_negative() {
        formatted.red().bold().to_string()
    } else if available.is_zero() {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color a fingerprint verdict
pub fn color_fingerprint_status(status: FingerprintStatus) -> String {
    match status {
        FingerprintStatus::Consistent => status.as_str().green().to_string(),
        FingerprintStatus::Stale => status.as_str().red().to_string(),
        FingerprintStatus::Unverified => status.as_str().yellow().to_string(),
    }
}

/// Shorten a fingerprint token for table display
pub fn short_token(token: &str) -> String {
    const SHOWN: usize = 20;
    if token.is_empty() {
        "-".to_string()
    } else if token.chars().count() > SHOWN {
        format!("{}…", token.chars().take(SHOWN).collect::<String>())
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_token() {
        assert_eq!(short_token(""), "-");
        assert_eq!(short_token("pfp0v001"), "pfp0v001");
        assert_eq!(
            short_token("pfp0v001aaaaaaaaaaaaaaaaaaaaaaaa"),
            "pfp0v001aaaaaaaaaaaa…"
        );
    }
}
