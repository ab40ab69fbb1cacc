//! Chat-ops channel client.
//!
//! The orchestrator owns exactly one client for the life of the process. When
//! credentials are missing the whole notification side degrades to a console
//! fallback once, at construction, rather than erroring per event.

use crate::sanitize::truncate_chars;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hard cap on outbound payload text, under the channel's message limit.
pub const CHANNEL_MAX_CHARS: usize = 3800;

/// Environment variables carrying channel credentials.
pub const TOKEN_ENV: &str = "RUNLEDGER_CHANNEL_TOKEN";
pub const CHANNEL_ENV: &str = "RUNLEDGER_CHANNEL_ID";

/// Opaque reference to a previously-sent message, used for edits and replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// The channel operations this pipeline needs. All senders are best-effort:
/// callers log and continue on error, never abort the run.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<MessageHandle, ChannelError>;
    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError>;
    /// Post under an existing message, preserving per-test attribution.
    async fn reply(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError>;
    /// Open a named thread under a message. Failures are ignored by contract.
    async fn start_thread(&self, handle: &MessageHandle, name: &str);
    /// Close the connection. Called exactly once per run, on every end path.
    async fn close(&self);
    fn is_enabled(&self) -> bool;
}

/// Credentials resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub token: Option<String>,
    pub channel_id: Option<String>,
    /// Web API root; overridable for tests.
    pub base_url: Option<String>,
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        Self {
            token: std::env::var(TOKEN_ENV).ok().filter(|s| !s.is_empty()),
            channel_id: std::env::var(CHANNEL_ENV).ok().filter(|s| !s.is_empty()),
            base_url: None,
        }
    }
}

/// Build the process-wide client: HTTP-backed when credentials are present,
/// console fallback otherwise. The decision is made once and logged once.
pub fn build_client(cfg: &ChannelConfig) -> Arc<dyn ChannelClient> {
    match (cfg.token.clone(), cfg.channel_id.clone()) {
        (Some(token), Some(channel)) => Arc::new(HttpChannelClient::new(
            token,
            channel,
            cfg.base_url.clone(),
        )),
        _ => {
            tracing::warn!(
                "channel credentials missing ({TOKEN_ENV}/{CHANNEL_ENV}); notifications disabled, console fallback active"
            );
            Arc::new(NoopChannelClient)
        }
    }
}

/// Web-API client (chat.postMessage / chat.update shape).
pub struct HttpChannelClient {
    token: String,
    channel: String,
    base_url: String,
    http: reqwest::Client,
    closed: AtomicBool,
}

impl HttpChannelClient {
    pub fn new(token: String, channel: String, base_url: Option<String>) -> Self {
        Self {
            token,
            channel,
            base_url: base_url.unwrap_or_else(|| "https://slack.com/api".to_string()),
            http: reqwest::Client::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, ChannelError> {
        let url = format!("{}/{}", self.base_url, method);
        let body: Value = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(body)
        } else {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Err(ChannelError::Api(reason))
        }
    }
}

#[async_trait]
impl ChannelClient for HttpChannelClient {
    async fn send_message(&self, text: &str) -> Result<MessageHandle, ChannelError> {
        let text = truncate_chars(text, CHANNEL_MAX_CHARS);
        let body = self
            .call(
                "chat.postMessage",
                json!({ "channel": self.channel, "text": text }),
            )
            .await?;
        let ts = body
            .get("ts")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::Api("response missing ts".to_string()))?;
        Ok(MessageHandle(ts.to_string()))
    }

    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        let text = truncate_chars(text, CHANNEL_MAX_CHARS);
        self.call(
            "chat.update",
            json!({ "channel": self.channel, "ts": handle.0, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn reply(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        let text = truncate_chars(text, CHANNEL_MAX_CHARS);
        self.call(
            "chat.postMessage",
            json!({ "channel": self.channel, "thread_ts": handle.0, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn start_thread(&self, handle: &MessageHandle, name: &str) {
        if let Err(e) = self.reply(handle, &format!("🧵 {name}")).await {
            tracing::debug!(error = %e, "start_thread ignored failure");
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(channel = %self.channel, "channel client closed");
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Console fallback used when the channel is not configured. Mirrors the same
/// information to stderr so a local run still shows progress and the summary.
pub struct NoopChannelClient;

#[async_trait]
impl ChannelClient for NoopChannelClient {
    async fn send_message(&self, text: &str) -> Result<MessageHandle, ChannelError> {
        eprintln!("{text}");
        Ok(MessageHandle("console".to_string()))
    }

    async fn edit_message(&self, _handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        eprintln!("{text}");
        Ok(())
    }

    async fn reply(&self, _handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        eprintln!("{text}");
        Ok(())
    }

    async fn start_thread(&self, _handle: &MessageHandle, _name: &str) {}

    async fn close(&self) {}

    fn is_enabled(&self) -> bool {
        false
    }
}
