//! HTTP client for the fleet backend
//!
//! One client serves all three collaborators. List endpoints may answer with
//! a bare JSON array or with `{ "items": [...] }`.

use super::{CommandAck, CommandBackend, InventorySource, LiveSource};
use crate::command::Command;
use crate::error::SourceError;
use crate::models::{EntityIdentity, EntityKind, InventoryRecord, LiveRecord};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path prefixes and client settings for the backend
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Prefix for inventory reads, followed by the plural kind
    pub inventory_prefix: String,
    /// Prefix for live reads, followed by the plural kind
    pub live_prefix: String,
    /// Prefix for commands, followed by kind, namespace, name, command
    pub commands_prefix: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            inventory_prefix: "api/v1/inventory".to_string(),
            live_prefix: "api/v1/live".to_string(),
            commands_prefix: "api/v1/commands".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped { items: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListBody::Bare(items) | ListBody::Wrapped { items } => items,
        }
    }
}

/// reqwest-backed implementation of every source trait
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    endpoints: EndpointConfig,
}

impl HttpBackend {
    /// Create a backend client with default endpoints
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        HttpBackendBuilder::new(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> HttpBackendBuilder {
        HttpBackendBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, prefix: &str, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SourceError::InvalidEndpoint(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(prefix.split('/').filter(|s| !s.is_empty()));
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, SourceError> {
        debug!(url = %url, "Fetching list");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.to_string(),
                source,
            })?;

        let body = read_success_body(&url, response).await?;
        let parsed: ListBody<T> =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(parsed.into_items())
    }
}

/// Read the body of a 2xx response, or turn the response into an error
async fn read_success_body(url: &Url, response: Response) -> Result<String, SourceError> {
    let status = response.status();
    let body = response.text().await.map_err(|source| SourceError::Transport {
        url: url.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

#[async_trait]
impl InventorySource for HttpBackend {
    async fn list_inventory(&self, kind: EntityKind) -> Result<Vec<InventoryRecord>, SourceError> {
        let url = self.url(&self.endpoints.inventory_prefix, &[kind.plural()])?;
        self.get_list(url).await
    }
}

#[async_trait]
impl LiveSource for HttpBackend {
    async fn list_live(&self, kind: EntityKind) -> Result<Vec<LiveRecord>, SourceError> {
        let url = self.url(&self.endpoints.live_prefix, &[kind.plural()])?;
        self.get_list(url).await
    }
}

#[async_trait]
impl CommandBackend for HttpBackend {
    async fn execute(
        &self,
        identity: &EntityIdentity,
        command: &Command,
    ) -> Result<CommandAck, SourceError> {
        let mut segments = vec![identity.kind.as_str()];
        if let Some(namespace) = &identity.namespace {
            segments.push(namespace);
        }
        segments.push(&identity.name);

        let request = match command {
            Command::Delete => {
                let url = self.url(&self.endpoints.commands_prefix, &segments)?;
                (url.clone(), self.client.delete(url))
            }
            other => {
                segments.push(other.path_segment());
                let url = self.url(&self.endpoints.commands_prefix, &segments)?;
                (url.clone(), self.client.post(url).json(other))
            }
        };
        let (url, builder) = request;

        debug!(url = %url, command = command.name(), "Sending command");

        let response = builder.send().await.map_err(|source| SourceError::Transport {
            url: url.to_string(),
            source,
        })?;
        let body = read_success_body(&url, response).await?;

        if body.trim().is_empty() {
            return Ok(CommandAck::default());
        }

        Ok(serde_json::from_str(&body).unwrap_or_else(|_| CommandAck {
            message: Some(body.trim().to_string()),
        }))
    }
}

/// Builder for [`HttpBackend`]
pub struct HttpBackendBuilder {
    base_url: String,
    endpoints: EndpointConfig,
}

impl HttpBackendBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoints: EndpointConfig::default(),
        }
    }

    pub fn endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.endpoints.request_timeout = timeout;
        self
    }

    pub fn inventory_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoints.inventory_prefix = prefix.into();
        self
    }

    pub fn live_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoints.live_prefix = prefix.into();
        self
    }

    pub fn commands_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoints.commands_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<HttpBackend, SourceError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::InvalidEndpoint(format!("{}: {}", self.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::InvalidEndpoint(self.base_url));
        }

        let client = Client::builder()
            .timeout(self.endpoints.request_timeout)
            .build()
            .map_err(|source| SourceError::Transport {
                url: self.base_url.clone(),
                source,
            })?;

        Ok(HttpBackend {
            client,
            base_url,
            endpoints: self.endpoints,
        })
    }
}
