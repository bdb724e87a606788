//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use fleet_core::convergence::PollState;
use fleet_core::models::FleetStatus;
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

/// Print rows as a table, or `data` as JSON
pub fn print_rows<T: Tabled, D: Serialize + ?Sized>(rows: Vec<T>, data: &D, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(data),
    }
}

pub fn print_json<D: Serialize + ?Sized>(data: &D) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a reconciled status
pub fn color_status(status: FleetStatus) -> String {
    let label = status.label();
    match status {
        FleetStatus::OnlineRegisteredReady => label.green().to_string(),
        FleetStatus::OnlineRegisteredNotReady | FleetStatus::OnlineUnregistered => {
            label.yellow().to_string()
        }
        FleetStatus::Offline | FleetStatus::UnregisteredOffline => label.red().to_string(),
        FleetStatus::OnlineRegisteredUnknown => label.dimmed().to_string(),
        FleetStatus::NotAMember => label.magenta().to_string(),
    }
}

/// Color a poll session state
pub fn color_poll_state(state: PollState) -> String {
    let name = state.as_str();
    match state {
        PollState::Ready => name.green().to_string(),
        PollState::Pending | PollState::Running => name.blue().to_string(),
        PollState::Exhausted | PollState::Superseded => name.yellow().to_string(),
        PollState::EntityGone => name.red().to_string(),
    }
}

/// Dash for missing values
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
