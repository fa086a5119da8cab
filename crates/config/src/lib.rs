use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of every environment variable read by [`AppConfig::load`].
pub const ENV_PREFIX: &str = "STOREFRONT";

/// What checkout does when the order log endpoint cannot be reached.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderLogPolicy {
    /// Log the failure and hand the order off anyway.
    #[default]
    BestEffort,
    /// Fail the attempt; the cart and the form stay intact for a retry.
    Blocking,
}

/// `AppConfig` holds all configuration parameters required by the storefront.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. Fields cover the HTTP server,
/// the messaging hand-off, the order log endpoint, the catalog and the promotion.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    // --- Messaging hand-off ---
    /// Shop name greeted at the top of the order message.
    pub shop_name: String,
    /// Base of the chat deep link, e.g. "https://wa.me".
    pub messaging_base_url: String,
    /// Fixed recipient identifier appended to the base URL.
    pub messaging_recipient: String,

    // --- Order log ---
    /// Spreadsheet web-app endpoint receiving one row per checkout. Unset disables logging.
    #[serde(default)]
    pub order_log_url: Option<String>,
    /// Upper bound on the order log call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub order_log_timeout: Duration,
    /// Whether an order log failure aborts the checkout attempt.
    pub order_log_policy: OrderLogPolicy,

    // --- Catalog ---
    /// JSON catalog file. Unset uses the bundled catalog.
    #[serde(default)]
    pub catalog_path: Option<String>,

    // --- Promotion ---
    /// Category whose units count towards free gifts.
    pub promo_category: String,
    /// Units needed per free gift.
    pub promo_tier_size: u32,
    /// Gift variants the customer can pick from.
    pub bonus_options: Vec<String>,
}

/// Accepts human-readable durations like "5s", "1m", etc.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from `STOREFRONT_*` environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(None)
    }

    /// Loads configuration from an explicit variable map instead of the process environment.
    ///
    /// Keys carry the same `STOREFRONT_` prefix as real environment variables.
    pub fn load_from(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(Some(vars))
    }

    fn from_environment(source: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = config::Config::builder()
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Messaging
            .set_default("shop_name", "Cafe JSR")?
            .set_default("messaging_base_url", "https://wa.me")?
            .set_default("messaging_recipient", "6281398898131")?
            // Order log
            .set_default("order_log_timeout", "5s")?
            .set_default("order_log_policy", "best_effort")?
            // Promotion
            .set_default("promo_category", "Wedhang Cafe JSR")?
            .set_default("promo_tier_size", 3)?
            .set_default("bonus_options", vec!["Teko Rempah", "Tumbler Rempah"])?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bonus_options")
                    .source(source),
            )
            .build()?;

        let mut cfg: AppConfig = settings
            .try_deserialize()
            .context("Failed to load configuration")?;

        // An empty value in `.env` means "not configured".
        cfg.order_log_url = cfg.order_log_url.filter(|url| !url.trim().is_empty());
        cfg.catalog_path = cfg.catalog_path.filter(|path| !path.trim().is_empty());

        anyhow::ensure!(cfg.promo_tier_size > 0, "promo_tier_size must be positive");
        Ok(cfg)
    }
}
