//! Convergence board commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, SessionReport};
use crate::output::{color_poll_state, or_dash, print_rows, OutputFormat};

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Entity")]
    identity: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Attempt")]
    attempt: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub async fn fetch_sessions(client: &ApiClient) -> Result<Vec<SessionReport>> {
    client.get("api/v1/sessions").await
}

pub async fn list_sessions(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let sessions = fetch_sessions(client).await?;

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|s| SessionRow {
            identity: s.identity.to_string(),
            command: s.command.clone(),
            state: color_poll_state(s.state),
            attempt: s.attempt,
            status: or_dash(s.detail.as_deref().or(s.status.as_deref())),
            updated: s.updated_at.format("%H:%M:%S").to_string(),
        })
        .collect();

    print_rows(rows, &sessions, format);
    Ok(())
}
