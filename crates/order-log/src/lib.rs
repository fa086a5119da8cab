//! Order log sinks.
//!
//! Every checkout appends one row to an external spreadsheet through a
//! web-app endpoint. The call is fire-and-forget: the response body is never
//! read, only whether the request went through.

use std::sync::Arc;
use std::time::Duration;

use app_config::AppConfig;
use async_trait::async_trait;
use model::OrderLogEntry;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum OrderLogError {
    /// The HTTP request could not be sent or the connection failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The call did not finish within the configured bound.
    #[error("Order log timed out after {0:?}")]
    Timeout(Duration),
    /// The recording task ended without reporting a result.
    #[error("Order log unavailable: {0}")]
    Unavailable(String),
}

/// Destination for the per-checkout order record.
#[async_trait]
pub trait OrderLogSink: Send + Sync {
    /// Delivers one entry. Only transport-level failure is reported.
    async fn record(&self, entry: &OrderLogEntry) -> Result<(), OrderLogError>;
}

/// Posts entries as JSON to a spreadsheet web-app endpoint.
#[derive(Clone)]
pub struct HttpOrderLog {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOrderLog {
    /// Create a new client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, OrderLogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OrderLogSink for HttpOrderLog {
    #[instrument(skip(self, entry), fields(endpoint = %self.endpoint))]
    async fn record(&self, entry: &OrderLogEntry) -> Result<(), OrderLogError> {
        let response = self.client.post(&self.endpoint).json(entry).send().await?;
        // The endpoint answers with a redirect or an opaque page; its status carries no meaning.
        debug!(status = %response.status(), "Order log endpoint responded");
        info!("Order sent to order log");
        Ok(())
    }
}

/// Sink used when no order log endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOrderLog;

#[async_trait]
impl OrderLogSink for NoopOrderLog {
    async fn record(&self, entry: &OrderLogEntry) -> Result<(), OrderLogError> {
        debug!(total = %entry.total, "Order log disabled, skipping");
        Ok(())
    }
}

/// Builds the sink described by the configuration.
///
/// # Errors
///
/// Returns error if the HTTP client fails to build.
pub fn from_config(cfg: &AppConfig) -> Result<Arc<dyn OrderLogSink>, OrderLogError> {
    match cfg.order_log_url.as_deref() {
        Some(url) => {
            info!(endpoint = %url, "Order log enabled");
            Ok(Arc::new(HttpOrderLog::new(url, cfg.order_log_timeout)?))
        }
        None => {
            info!("Order log endpoint not configured; orders will not be recorded");
            Ok(Arc::new(NoopOrderLog))
        }
    }
}
