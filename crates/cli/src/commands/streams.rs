//! Reconciled stream commands

use anyhow::{Context, Result};
use colored::Colorize;
use fleet_core::models::{EntityKind, FleetStatus, ReconciledView};
use tabled::Tabled;

use crate::client::{ApiClient, ReloadResponse, StreamResponse};
use crate::output::{color_status, or_dash, print_rows, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct ViewRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Live")]
    live: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Address")]
    address: String,
}

impl From<&ReconciledView> for ViewRow {
    fn from(view: &ReconciledView) -> Self {
        let address = view
            .inventory
            .as_ref()
            .and_then(|inv| inv.address.as_deref())
            .or_else(|| view.live.as_ref().and_then(|live| live.internal_address.as_deref()));

        Self {
            namespace: or_dash(view.identity.namespace.as_deref()),
            name: view.identity.name.clone(),
            status: color_status(view.status),
            live: or_dash(view.live_status()),
            replicas: view
                .replicas()
                .map(|r| format!("{}/{}", r.ready, r.desired))
                .unwrap_or_else(|| "-".to_string()),
            address: or_dash(address),
        }
    }
}

/// Show the reconciled view of one kind
pub async fn get_stream(
    client: &ApiClient,
    kind: &str,
    namespace: Option<String>,
    status: Option<String>,
    refresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let kind: EntityKind = kind.parse().context("Unsupported kind")?;
    let status: Option<FleetStatus> = status
        .as_deref()
        .map(str::parse::<FleetStatus>)
        .transpose()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let path = if refresh {
        format!("api/v1/streams/{}?refresh=true", kind.plural())
    } else {
        format!("api/v1/streams/{}", kind.plural())
    };
    let mut stream: StreamResponse = client.get(&path).await?;

    stream.views.retain(|view| {
        namespace
            .as_deref()
            .map_or(true, |ns| view.identity.namespace.as_deref() == Some(ns))
            && status.map_or(true, |s| view.status == s)
    });

    if let OutputFormat::Table = format {
        if let Some(error) = &stream.error {
            print_warning(&format!("Last refresh failed, showing previous data: {}", error));
        }
        if !stream.live_available {
            print_warning("Live cluster state is unavailable");
        }
    }

    let rows: Vec<ViewRow> = stream.views.iter().map(ViewRow::from).collect();
    print_rows(rows, &stream, format);

    if let (OutputFormat::Table, Some(fetched_at)) = (format, stream.fetched_at) {
        println!(
            "{}",
            format!("epoch {} fetched {}", stream.epoch, fetched_at.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
        );
    }

    Ok(())
}

/// Force a load of one kind
pub async fn reload_stream(client: &ApiClient, kind: &str, format: OutputFormat) -> Result<()> {
    let kind: EntityKind = kind.parse().context("Unsupported kind")?;
    let path = format!("api/v1/streams/{}/reload", kind.plural());
    let result: ReloadResponse = client.post(&path, &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => crate::output::print_json(&result),
        OutputFormat::Table => match result.epoch {
            Some(epoch) => print_success(&format!("{} reloaded (epoch {})", kind.plural(), epoch)),
            None => print_warning(&format!("{} reload {}", kind.plural(), result.outcome)),
        },
    }

    Ok(())
}
