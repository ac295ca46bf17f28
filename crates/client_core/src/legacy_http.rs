//! Client for the older polling HTTP surface of the DAQ webapp.
//!
//! This surface predates the push channel: commands are plain POSTs, results are
//! fetched by action id, and the server only drains its inbox when `/command/process`
//! is hit, so a poller has to run alongside.

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde_json::Value;
use shared::{domain::CommandId, protocol::ActionResultResponse};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};
use url::Url;

/// Interval the webapp page used between `/command/process` calls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Body the server sends instead of a result when the id is unknown.
const INVALID_ID_REPLY: &str = "invalid id";

#[derive(Debug, Error)]
pub enum LegacyHttpError {
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url must be http:// or https://, got {0}")]
    Scheme(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server has no result for action {0}")]
    InvalidActionId(CommandId),
    #[error("malformed action result: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct LegacyHttpClient {
    http: Client,
    base_url: String,
}

impl LegacyHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LegacyHttpError> {
        let parsed = Url::parse(base_url.trim())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LegacyHttpError::Scheme(parsed.scheme().to_string()));
        }
        Ok(Self {
            http: Client::new(),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub async fn start_run(&self) -> Result<String, LegacyHttpError> {
        self.post_command("start-run").await
    }

    pub async fn end_run(&self) -> Result<String, LegacyHttpError> {
        self.post_command("end-run").await
    }

    pub async fn process_messages(&self) -> Result<String, LegacyHttpError> {
        self.post_command("process").await
    }

    /// The result recorded for action `id`.
    pub async fn action_result(&self, id: CommandId) -> Result<Value, LegacyHttpError> {
        let text = self
            .http
            .get(format!("{}/command/actionid/{}", self.base_url, id.0))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let body: Value = serde_json::from_str(&text)?;
        if body.as_str() == Some(INVALID_ID_REPLY) {
            return Err(LegacyHttpError::InvalidActionId(id));
        }
        let response: ActionResultResponse = serde_json::from_value(body)?;
        Ok(response.result)
    }

    /// Keeps hitting `/command/process` until the returned handle is aborted.
    pub fn spawn_process_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.process_messages().await {
                    Ok(_) => debug!("processed pending daq messages"),
                    Err(err) => warn!(%err, "process poll failed"),
                }
            }
        })
    }

    async fn post_command(&self, command: &str) -> Result<String, LegacyHttpError> {
        let text = self
            .http
            .post(format!("{}/command/{command}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

#[cfg(test)]
#[path = "tests/legacy_http_tests.rs"]
mod tests;
