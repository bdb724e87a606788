//! Mutating commands and convergence waits

use anyhow::{bail, Result};
use colored::Colorize;
use fleet_core::command::Command;
use fleet_core::convergence::PollState;
use fleet_core::models::EntityIdentity;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::{ApiClient, CommandRequest, CommandResponse, SessionReport};
use crate::commands::sessions::fetch_sessions;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// How long `--wait` follows a session before giving up locally
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub enabled: bool,
    pub timeout: Duration,
    pub interval: Duration,
}

/// Send a command and, if requested, wait for its convergence session
pub async fn run_command(
    client: &ApiClient,
    command: Command,
    identity: EntityIdentity,
    wait: WaitOptions,
    format: OutputFormat,
) -> Result<()> {
    let description = command.to_string();
    let request = CommandRequest {
        identity: identity.clone(),
        command,
    };

    let response: CommandResponse = client.post("api/v1/commands", &request).await?;

    match format {
        OutputFormat::Json if !wait.enabled => {
            print_json(&response);
            return Ok(());
        }
        OutputFormat::Json => {}
        OutputFormat::Table => {
            print_success(&format!("{}: {} accepted", identity, description));
            if let Some(message) = &response.message {
                print_info(message);
            }
        }
    }

    if !wait.enabled {
        return Ok(());
    }
    if !response.converging {
        if let OutputFormat::Table = format {
            print_info("Nothing to wait for; the stream is being reloaded");
        }
        return Ok(());
    }

    let report = wait_for_session(client, &identity, response.session_id, wait, format).await?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => report_outcome(&report),
    }

    if report.success == Some(true) {
        Ok(())
    } else {
        bail!(
            "{} did not converge: {}",
            identity,
            report.detail.as_deref().unwrap_or(report.state.as_str())
        )
    }
}

/// The report belonging to our session. A console that does not return
/// session ids is matched on identity alone.
fn find_report(
    reports: Vec<SessionReport>,
    identity: &EntityIdentity,
    session_id: Option<u64>,
) -> Option<SessionReport> {
    reports.into_iter().find(|report| {
        &report.identity == identity
            && match session_id {
                Some(id) => report.session_id == Some(id),
                None => true,
            }
    })
}

async fn wait_for_session(
    client: &ApiClient,
    identity: &EntityIdentity,
    session_id: Option<u64>,
    wait: WaitOptions,
    format: OutputFormat,
) -> Result<SessionReport> {
    let deadline = Instant::now() + wait.timeout;
    let mut last_status: Option<String> = None;

    loop {
        let reports = fetch_sessions(client).await?;
        match find_report(reports, identity, session_id) {
            Some(report) if report.state.is_terminal() => return Ok(report),
            Some(report) => {
                if let (OutputFormat::Table, Some(status)) = (format, &report.status) {
                    if last_status.as_ref() != Some(status) {
                        println!("  {} {}", format!("[{}]", report.attempt).dimmed(), status);
                        last_status = Some(status.clone());
                    }
                }
            }
            // a newer command for the identity replaced our report
            None if session_id.is_some() => {
                bail!("{}: wait was superseded by a newer command", identity)
            }
            None => {}
        }

        if Instant::now() >= deadline {
            bail!("Timed out waiting for {} after {:?}", identity, wait.timeout);
        }
        tokio::time::sleep(wait.interval).await;
    }
}

fn report_outcome(report: &SessionReport) {
    let status = report.status.as_deref().unwrap_or("-");
    match report.state {
        PollState::Ready => print_success(&format!("{} converged: {}", report.identity, status)),
        PollState::EntityGone => print_warning(&format!("{} no longer exists", report.identity)),
        PollState::Exhausted => print_warning(&format!(
            "{} did not converge after {} attempts, last status: {}",
            report.identity, report.attempt, status
        )),
        PollState::Superseded => print_warning(&format!(
            "{}: wait was superseded by a newer command",
            report.identity
        )),
        PollState::Pending | PollState::Running => {}
    }
}
