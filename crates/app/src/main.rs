/// Storefront Application
///
/// This is the main entry point for the storefront service. It serves the
/// product catalog, the shopper's cart and delivery form, the free-gift
/// promotion, and the checkout that hands the order off to the shop's chat.
///
/// # Architecture
///
/// - Model layer for products, customer data and the catalog
/// - Cart and promotion layers for pricing rules
/// - Order log sink for recording checkouts
/// - Service layer for the checkout state machine
/// - API layer for HTTP endpoints and metrics
///
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app_config::AppConfig;
use model::Catalog;
use promotion::PromotionRule;
use server::Server;
use service::{CheckoutSettings, StorefrontServiceImpl};

/// Initialize the tracing subscriber for logging
fn init_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
}

fn load_catalog(config: &AppConfig) -> Result<Catalog> {
    match config.catalog_path.as_deref() {
        Some(path) => {
            info!("Loading catalog from {}", path);
            Catalog::load(path).with_context(|| format!("Failed to load catalog from {path}"))
        }
        None => Catalog::bundled().context("Failed to load bundled catalog"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = init_logger() {
        eprintln!("Failed to initialize logger: {}", err);
        return Err(anyhow::anyhow!("Failed to initialize logger"));
    }

    info!("Storefront starting...");

    let shutdown = Arc::new(Notify::new());

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        shutdown_signal.notify_one();
    });

    let config = AppConfig::load().context("Failed to load configuration")?;

    let catalog = load_catalog(&config)?;
    info!("Catalog loaded with {} products", catalog.len());

    let rule = PromotionRule::from_config(&config).context("Invalid promotion settings")?;
    let order_log = order_log::from_config(&config).context("Failed to initialize order log")?;

    let storefront = Arc::new(StorefrontServiceImpl::new(
        Arc::new(catalog),
        rule,
        order_log,
        CheckoutSettings::from_config(&config),
    ));

    let http_server = Server::new(config.http_port, storefront);
    let stopped = Arc::new(Notify::new());
    let server_shutdown = {
        let shutdown = shutdown.clone();
        let stopped = stopped.clone();
        async move {
            shutdown.notified().await;
            stopped.notify_one();
        }
    };

    let mut server_task = tokio::spawn(async move { http_server.start(server_shutdown).await });

    tokio::select! {
        res = &mut server_task => {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("HTTP server error: {:#}", err);
                    return Err(err);
                }
                Err(err) => error!("Task error: {}", err),
            }
        }
        _ = stopped.notified() => {
            match tokio::time::timeout(config.shutdown_timeout, &mut server_task).await {
                Ok(Ok(Err(err))) => error!("HTTP server error: {:#}", err),
                Ok(Err(err)) => error!("Task error: {}", err),
                Ok(Ok(Ok(()))) => {}
                Err(_) => {
                    warn!(
                        "Server did not stop within {:?}, aborting",
                        config.shutdown_timeout
                    );
                    server_task.abort();
                }
            }
        }
    }

    info!("Application stopped");
    Ok(())
}
