//! Storefront business logic.
//!
//! This module defines the [`StorefrontService`] trait and its implementation
//! [`StorefrontServiceImpl`], which owns the shopper's [`Session`] and drives
//! checkout: validation, the order log call, the chat deep link, and the
//! confirmation step that clears the session.
//!
//! # Features
//! - Cart mutations always re-check the free-gift promotion before returning.
//! - The order log call runs outside the session lock, so a second submit
//!   during the call sees `Submitting` and is dropped.
//! - The log call is bounded by a timeout; whether its failure aborts the
//!   attempt follows [`OrderLogPolicy`].
//! - A started submission finishes on its own task, so dropping the caller
//!   never leaves the session stuck in `Submitting`.

use std::sync::Arc;
use std::time::Duration;

use app_config::{AppConfig, OrderLogPolicy};
use async_trait::async_trait;
use model::{Catalog, CustomerField};
use order_log::{OrderLogError, OrderLogSink};
use promotion::{PromotionError, PromotionRule};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

pub mod message;
pub mod session;

pub use message::{MessageTemplate, OrderDraft, OrderLine};
pub use session::{
    CheckoutPhase, IgnoredReason, LineView, PendingOrder, Session, SessionSnapshot, SubmitStart,
};

/// Toast text shown after a product lands in the cart.
pub const ITEM_ADDED_NOTICE: &str = "Produk ditambahkan ke keranjang";

/// The main error type for all operations in [`StorefrontService`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// At least one delivery field is empty.
    #[error("Incomplete customer info: missing {}", join_fields(.missing))]
    IncompleteCustomerInfo { missing: Vec<CustomerField> },
    /// The cart earns a free gift but none was picked.
    #[error("Bonus not selected")]
    BonusNotSelected,
    #[error(transparent)]
    BonusNotAvailable(#[from] PromotionError),
    #[error("Unknown product: {0}")]
    UnknownProduct(u32),
    /// Confirm or dismiss was requested with no order awaiting confirmation.
    #[error("No order awaiting confirmation")]
    NothingToConfirm,
    /// The order log call failed under the blocking policy.
    #[error("Order log failed: {0}")]
    OrderLog(#[from] OrderLogError),
}

fn join_fields(fields: &[CustomerField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CheckoutError {
    /// Message shown to the shopper.
    pub fn user_message(&self) -> &'static str {
        match self {
            CheckoutError::IncompleteCustomerInfo { .. } => {
                "Mohon lengkapi data pemesan terlebih dahulu."
            }
            CheckoutError::BonusNotSelected => "Mohon pilih bonus Anda terlebih dahulu.",
            CheckoutError::BonusNotAvailable(_) => "Bonus belum tersedia untuk keranjang ini.",
            CheckoutError::UnknownProduct(_) => "Produk tidak ditemukan.",
            CheckoutError::NothingToConfirm => "Tidak ada pesanan yang menunggu konfirmasi.",
            CheckoutError::OrderLog(_) => {
                "Terjadi kesalahan saat memproses pesanan. Silakan coba lagi."
            }
        }
    }
}

/// Result of a submit call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Dropped without a state change.
    Ignored(IgnoredReason),
    /// The order awaits confirmation.
    Submitted(PendingOrder),
}

/// Result of adding a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAdded {
    pub product_id: u32,
    pub quantity: u32,
    pub notice: &'static str,
}

/// Checkout tuning taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub template: MessageTemplate,
    pub order_log_timeout: Duration,
    pub order_log_policy: OrderLogPolicy,
}

impl CheckoutSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            template: MessageTemplate::from_config(cfg),
            order_log_timeout: cfg.order_log_timeout,
            order_log_policy: cfg.order_log_policy,
        }
    }
}

/// Operations available to the storefront UI.
#[async_trait]
pub trait StorefrontService: Send + Sync {
    fn catalog(&self) -> &Catalog;

    async fn snapshot(&self) -> SessionSnapshot;

    /// Adds one unit of a catalog product.
    ///
    /// # Errors
    /// Returns [`CheckoutError::UnknownProduct`] if the id is not in the catalog.
    async fn add_to_cart(&self, product_id: u32) -> Result<ItemAdded, CheckoutError>;

    /// Sets a line's quantity; zero or less removes the line.
    async fn update_quantity(&self, product_id: u32, quantity: i64);

    async fn remove_from_cart(&self, product_id: u32);

    async fn set_customer_field(&self, field: CustomerField, value: String);

    /// Picks the gift variant; an empty token clears the choice.
    ///
    /// # Errors
    /// Returns [`CheckoutError::BonusNotAvailable`] if the cart earns no gift.
    async fn select_bonus(&self, token: &str) -> Result<(), CheckoutError>;

    /// Validates the session, records the order, and prepares the chat link.
    ///
    /// # Errors
    /// Returns [`CheckoutError::IncompleteCustomerInfo`] or
    /// [`CheckoutError::BonusNotSelected`] when a precondition fails, and
    /// [`CheckoutError::OrderLog`] when logging fails under the blocking policy.
    async fn submit(&self) -> Result<SubmitOutcome, CheckoutError>;

    /// Returns the chat link to open and clears the session.
    async fn confirm_and_continue(&self) -> Result<String, CheckoutError>;

    /// Dismisses the confirmation step, keeping cart and form.
    async fn close_without_confirming(&self) -> Result<(), CheckoutError>;
}

/// [`StorefrontService`] over one in-memory session.
pub struct StorefrontServiceImpl {
    catalog: Arc<Catalog>,
    session: Arc<Mutex<Session>>,
    order_log: Arc<dyn OrderLogSink>,
    settings: Arc<CheckoutSettings>,
}

impl StorefrontServiceImpl {
    /// Constructs a new [`StorefrontServiceImpl`] from the provided dependencies.
    ///
    /// # Arguments
    /// * `catalog` - The products on sale.
    /// * `rule` - The free-gift promotion.
    /// * `order_log` - Where each checkout is recorded.
    /// * `settings` - Message template and order log behaviour.
    pub fn new(
        catalog: Arc<Catalog>,
        rule: PromotionRule,
        order_log: Arc<dyn OrderLogSink>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            session: Arc::new(Mutex::new(Session::new(rule))),
            order_log,
            settings: Arc::new(settings),
        }
    }
}

/// Records the order and moves the session out of `Submitting`.
///
/// Runs on its own task so the session always leaves `Submitting`, even when
/// the caller stops waiting.
async fn finish_submit(
    session: Arc<Mutex<Session>>,
    order_log: Arc<dyn OrderLogSink>,
    settings: Arc<CheckoutSettings>,
    draft: OrderDraft,
) -> Result<SubmitOutcome, CheckoutError> {
    let timeout = settings.order_log_timeout;
    let log_result = match tokio::time::timeout(timeout, order_log.record(&draft.log_entry())).await
    {
        Ok(result) => result,
        Err(_) => Err(OrderLogError::Timeout(timeout)),
    };

    let mut session = session.lock().await;
    let warning = match log_result {
        Ok(()) => None,
        Err(e) => match settings.order_log_policy {
            OrderLogPolicy::BestEffort => {
                warn!(error = %e, "Order log failed; continuing checkout");
                Some(e.to_string())
            }
            OrderLogPolicy::Blocking => {
                warn!(error = %e, "Order log failed; checkout aborted");
                session.fail_submit(e.to_string());
                return Err(CheckoutError::OrderLog(e));
            }
        },
    };

    let order = PendingOrder {
        total_formatted: draft.formatted_total(),
        messaging_uri: settings.template.deep_link(&draft),
        warning,
        draft,
    };
    session.complete_submit(order.clone());
    info!(total = %order.total_formatted, "Order awaiting confirmation");
    Ok(SubmitOutcome::Submitted(order))
}

#[async_trait]
impl StorefrontService for StorefrontServiceImpl {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    #[instrument(skip(self))]
    async fn add_to_cart(&self, product_id: u32) -> Result<ItemAdded, CheckoutError> {
        let product = self
            .catalog
            .find(product_id)
            .ok_or(CheckoutError::UnknownProduct(product_id))?;
        let quantity = self.session.lock().await.add_to_cart(product);
        info!(product_id, quantity, "Product added to cart");
        Ok(ItemAdded {
            product_id,
            quantity,
            notice: ITEM_ADDED_NOTICE,
        })
    }

    #[instrument(skip(self))]
    async fn update_quantity(&self, product_id: u32, quantity: i64) {
        self.session.lock().await.update_quantity(product_id, quantity);
    }

    #[instrument(skip(self))]
    async fn remove_from_cart(&self, product_id: u32) {
        self.session.lock().await.remove_from_cart(product_id);
    }

    #[instrument(skip(self, value))]
    async fn set_customer_field(&self, field: CustomerField, value: String) {
        self.session.lock().await.set_customer_field(field, value);
    }

    #[instrument(skip(self))]
    async fn select_bonus(&self, token: &str) -> Result<(), CheckoutError> {
        self.session.lock().await.select_bonus(token)
    }

    /// Validates and enters `Submitting` under the lock, then records the
    /// order and finishes on a spawned task with the lock released.
    #[instrument(skip(self))]
    async fn submit(&self) -> Result<SubmitOutcome, CheckoutError> {
        let draft = match self.session.lock().await.begin_submit()? {
            SubmitStart::Started(draft) => draft,
            SubmitStart::Ignored(reason) => {
                info!(?reason, "Submission ignored");
                return Ok(SubmitOutcome::Ignored(reason));
            }
        };
        info!(total = draft.total, lines = draft.lines.len(), "Submitting order");

        let task = tokio::spawn(finish_submit(
            self.session.clone(),
            self.order_log.clone(),
            self.settings.clone(),
            draft,
        ));
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Checkout task failed");
                let err = OrderLogError::Unavailable(e.to_string());
                self.session.lock().await.fail_submit(err.to_string());
                Err(CheckoutError::OrderLog(err))
            }
        }
    }

    #[instrument(skip(self))]
    async fn confirm_and_continue(&self) -> Result<String, CheckoutError> {
        let uri = self.session.lock().await.confirm_and_continue()?;
        info!("Order confirmed; session cleared");
        Ok(uri)
    }

    #[instrument(skip(self))]
    async fn close_without_confirming(&self) -> Result<(), CheckoutError> {
        self.session.lock().await.close_without_confirming()?;
        info!("Order confirmation dismissed");
        Ok(())
    }
}
