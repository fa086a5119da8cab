//! Single-shopper session state: the cart, the delivery form, the gift choice
//! and the checkout phase, kept together so every mutation can re-check the
//! promotion before anything else observes the state.

use cart::CartStore;
use model::{CartItem, CustomerField, CustomerInfo, Product, format_rupiah};
use promotion::{PromotionRule, PromotionStatus};
use serde::Serialize;
use tracing::{debug, info};

use crate::CheckoutError;
use crate::message::{OrderDraft, OrderLine};

/// An order that passed validation and waits for the shopper to open the chat link.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    #[serde(flatten)]
    pub draft: OrderDraft,
    pub total_formatted: String,
    pub messaging_uri: String,
    /// Set when the order log call failed but checkout went ahead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Where the checkout flow currently stands.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation { order: PendingOrder },
    Completed,
    Failed { message: String },
}

impl CheckoutPhase {
    /// Idle, Failed and Completed all accept a new submission.
    pub fn accepts_submission(&self) -> bool {
        matches!(
            self,
            CheckoutPhase::Idle | CheckoutPhase::Failed { .. } | CheckoutPhase::Completed
        )
    }
}

/// Why a submission was dropped without an error.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IgnoredReason {
    EmptyCart,
    InFlight,
    AwaitingConfirmation,
}

/// What `begin_submit` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStart {
    Started(OrderDraft),
    Ignored(IgnoredReason),
}

/// Cart line as displayed, with prices already formatted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    #[serde(flatten)]
    pub item: CartItem,
    pub price_formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price_formatted: Option<String>,
    pub line_total: u64,
}

impl From<&CartItem> for LineView {
    fn from(item: &CartItem) -> Self {
        Self {
            price_formatted: format_rupiah(item.product.price),
            original_price_formatted: item.product.original_price.map(format_rupiah),
            line_total: item.line_total(),
            item: item.clone(),
        }
    }
}

/// Read model handed to the UI after every action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub lines: Vec<LineView>,
    pub total_items: u64,
    pub total_price: u64,
    pub total_formatted: String,
    pub promotion: PromotionStatus,
    pub promo_details: String,
    pub customer: CustomerInfo,
    pub customer_complete: bool,
    pub missing_fields: Vec<CustomerField>,
    pub checkout: CheckoutPhase,
    pub can_submit: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    rule: PromotionRule,
    cart: CartStore,
    customer: CustomerInfo,
    selected_bonus: Option<String>,
    phase: CheckoutPhase,
}

impl Session {
    pub fn new(rule: PromotionRule) -> Self {
        Self {
            rule,
            cart: CartStore::new(),
            customer: CustomerInfo::default(),
            selected_bonus: None,
            phase: CheckoutPhase::Idle,
        }
    }

    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub fn customer(&self) -> &CustomerInfo {
        &self.customer
    }

    pub fn selected_bonus(&self) -> Option<&str> {
        self.selected_bonus.as_deref()
    }

    pub fn phase(&self) -> &CheckoutPhase {
        &self.phase
    }

    pub fn add_to_cart(&mut self, product: &Product) -> u32 {
        let quantity = self.cart.add_to_cart(product);
        self.after_cart_change();
        quantity
    }

    pub fn update_quantity(&mut self, product_id: u32, new_quantity: i64) {
        self.cart.update_quantity(product_id, new_quantity);
        self.after_cart_change();
    }

    pub fn remove_from_cart(&mut self, product_id: u32) {
        self.cart.remove_from_cart(product_id);
        self.after_cart_change();
    }

    fn after_cart_change(&mut self) {
        if self.rule.reconcile(&self.cart, &mut self.selected_bonus) {
            info!("Cart no longer earns a free gift; bonus selection cleared");
        }
    }

    pub fn set_customer_field(&mut self, field: CustomerField, value: impl Into<String>) {
        self.customer.set_field(field, value);
    }

    /// Records the gift choice; an empty token clears it.
    pub fn select_bonus(&mut self, token: &str) -> Result<(), CheckoutError> {
        self.selected_bonus = self.rule.choose_bonus(&self.cart, token)?;
        debug!(bonus = ?self.selected_bonus, "Bonus selection changed");
        Ok(())
    }

    pub fn promotion(&self) -> PromotionStatus {
        self.rule.evaluate(&self.cart, self.selected_bonus.as_deref())
    }

    pub fn can_submit(&self) -> bool {
        !self.cart.is_empty()
            && self.customer.is_complete()
            && !self.promotion().bonus_selection_required
            && self.phase.accepts_submission()
    }

    /// Checks submission preconditions in order and enters `Submitting`.
    ///
    /// An empty cart and a submission already under way are ignored; an
    /// incomplete form or a missing gift choice are reported as errors and
    /// leave the phase untouched.
    pub fn begin_submit(&mut self) -> Result<SubmitStart, CheckoutError> {
        if self.cart.is_empty() {
            return Ok(SubmitStart::Ignored(IgnoredReason::EmptyCart));
        }
        if !self.customer.is_complete() {
            return Err(CheckoutError::IncompleteCustomerInfo {
                missing: self.customer.missing_fields(),
            });
        }
        let promotion = self.promotion();
        if promotion.bonus_selection_required {
            return Err(CheckoutError::BonusNotSelected);
        }
        match self.phase {
            CheckoutPhase::Submitting => return Ok(SubmitStart::Ignored(IgnoredReason::InFlight)),
            CheckoutPhase::AwaitingConfirmation { .. } => {
                return Ok(SubmitStart::Ignored(IgnoredReason::AwaitingConfirmation));
            }
            _ => {}
        }

        self.phase = CheckoutPhase::Submitting;
        Ok(SubmitStart::Started(OrderDraft {
            lines: self.cart.items().iter().map(OrderLine::from).collect(),
            total: self.cart.total_price(),
            promo_details: promotion.promo_details(),
            customer: self.customer.clone(),
        }))
    }

    /// Moves a started submission to `AwaitingConfirmation`.
    pub fn complete_submit(&mut self, order: PendingOrder) {
        self.phase = CheckoutPhase::AwaitingConfirmation { order };
    }

    /// Moves a started submission to `Failed`; nothing else changes.
    pub fn fail_submit(&mut self, message: impl Into<String>) {
        self.phase = CheckoutPhase::Failed {
            message: message.into(),
        };
    }

    /// Hands back the chat link and resets cart, form and gift choice in one step.
    pub fn confirm_and_continue(&mut self) -> Result<String, CheckoutError> {
        let CheckoutPhase::AwaitingConfirmation { order } = &self.phase else {
            return Err(CheckoutError::NothingToConfirm);
        };
        let uri = order.messaging_uri.clone();
        self.phase = CheckoutPhase::Completed;
        self.cart.clear();
        self.customer.clear();
        self.selected_bonus = None;
        Ok(uri)
    }

    /// Dismisses the confirmation step; cart and form are kept.
    pub fn close_without_confirming(&mut self) -> Result<(), CheckoutError> {
        if !matches!(self.phase, CheckoutPhase::AwaitingConfirmation { .. }) {
            return Err(CheckoutError::NothingToConfirm);
        }
        self.phase = CheckoutPhase::Idle;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let promotion = self.promotion();
        let total_price = self.cart.total_price();
        SessionSnapshot {
            lines: self.cart.items().iter().map(LineView::from).collect(),
            total_items: self.cart.total_items(),
            total_price,
            total_formatted: format_rupiah(total_price),
            promo_details: promotion.promo_details(),
            customer: self.customer.clone(),
            customer_complete: self.customer.is_complete(),
            missing_fields: self.customer.missing_fields(),
            checkout: self.phase.clone(),
            can_submit: self.can_submit(),
            promotion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEDHANG: &str = "Wedhang Cafe JSR";

    fn product(id: u32, price: u64, category: &str) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            description: String::new(),
            price,
            original_price: None,
            image: String::new(),
            category: category.to_string(),
            tag: String::new(),
            is_best_seller: false,
            is_highlight: false,
            is_special_offer: false,
        }
    }

    fn session() -> Session {
        Session::new(PromotionRule::new(
            WEDHANG,
            3,
            vec!["Teko Rempah".to_string(), "Tumbler Rempah".to_string()],
        )
        .unwrap())
    }

    fn fill_form(session: &mut Session) {
        session.set_customer_field(CustomerField::Name, "Sari");
        session.set_customer_field(CustomerField::Phone, "081234567890");
        session.set_customer_field(CustomerField::Address, "Jl. Kaliurang 12");
        session.set_customer_field(CustomerField::PostalCode, "55281");
    }

    fn pending(draft: OrderDraft) -> PendingOrder {
        PendingOrder {
            total_formatted: draft.formatted_total(),
            draft,
            messaging_uri: "https://wa.me/1?text=x".to_string(),
            warning: None,
        }
    }

    #[test]
    fn test_dropping_below_first_tier_clears_bonus() {
        let mut session = session();
        session.add_to_cart(&product(2, 20000, WEDHANG));
        session.update_quantity(2, 3);
        session.select_bonus("Teko Rempah").unwrap();
        assert_eq!(session.selected_bonus(), Some("Teko Rempah"));

        session.update_quantity(2, 2);
        assert_eq!(session.selected_bonus(), None);
    }

    #[test]
    fn test_removing_category_line_clears_bonus() {
        let mut session = session();
        let wedhang = product(2, 20000, WEDHANG);
        for _ in 0..3 {
            session.add_to_cart(&wedhang);
        }
        session.select_bonus("Tumbler Rempah").unwrap();
        session.remove_from_cart(2);
        assert_eq!(session.selected_bonus(), None);
    }

    #[test]
    fn test_bonus_rejected_without_gift() {
        let mut session = session();
        session.add_to_cart(&product(2, 20000, WEDHANG));
        assert!(matches!(
            session.select_bonus("Teko Rempah"),
            Err(CheckoutError::BonusNotAvailable(_))
        ));
    }

    #[test]
    fn test_empty_cart_submit_is_ignored() {
        let mut session = session();
        fill_form(&mut session);
        assert_eq!(
            session.begin_submit().unwrap(),
            SubmitStart::Ignored(IgnoredReason::EmptyCart)
        );
        assert_eq!(session.phase(), &CheckoutPhase::Idle);
    }

    #[test]
    fn test_incomplete_form_blocks_submit() {
        let mut session = session();
        session.add_to_cart(&product(1, 15000, "Other"));
        session.set_customer_field(CustomerField::Name, "Sari");
        let err = session.begin_submit().unwrap_err();
        assert!(matches!(err, CheckoutError::IncompleteCustomerInfo { ref missing } if missing.len() == 3));
        assert_eq!(session.phase(), &CheckoutPhase::Idle);
    }

    #[test]
    fn test_missing_bonus_blocks_submit() {
        let mut session = session();
        session.add_to_cart(&product(2, 20000, WEDHANG));
        session.update_quantity(2, 3);
        fill_form(&mut session);
        assert!(matches!(session.begin_submit(), Err(CheckoutError::BonusNotSelected)));
        assert_eq!(session.phase(), &CheckoutPhase::Idle);
    }

    #[test]
    fn test_submit_builds_draft_and_guards_double_submit() {
        let mut session = session();
        session.add_to_cart(&product(1, 15000, "Other"));
        session.update_quantity(1, 2);
        fill_form(&mut session);

        let SubmitStart::Started(draft) = session.begin_submit().unwrap() else {
            panic!("submission should start");
        };
        assert_eq!(draft.total, 30000);
        assert_eq!(draft.promo_details, "Tidak ada");
        assert_eq!(draft.order_details(), "- Product 1 (x2)");
        assert_eq!(session.phase(), &CheckoutPhase::Submitting);
        assert!(!session.can_submit());

        assert_eq!(
            session.begin_submit().unwrap(),
            SubmitStart::Ignored(IgnoredReason::InFlight)
        );

        session.complete_submit(pending(draft));
        assert_eq!(
            session.begin_submit().unwrap(),
            SubmitStart::Ignored(IgnoredReason::AwaitingConfirmation)
        );
    }

    #[test]
    fn test_confirm_resets_everything() {
        let mut session = session();
        let wedhang = product(2, 20000, WEDHANG);
        session.add_to_cart(&wedhang);
        session.update_quantity(2, 3);
        session.select_bonus("Teko Rempah").unwrap();
        fill_form(&mut session);
        let SubmitStart::Started(draft) = session.begin_submit().unwrap() else {
            panic!("submission should start");
        };
        assert_eq!(draft.promo_details, "1x Teko Rempah");
        session.complete_submit(pending(draft));

        let uri = session.confirm_and_continue().unwrap();
        assert_eq!(uri, "https://wa.me/1?text=x");
        assert!(session.cart().is_empty());
        assert_eq!(session.customer(), &CustomerInfo::default());
        assert_eq!(session.selected_bonus(), None);
        assert_eq!(session.phase(), &CheckoutPhase::Completed);
        assert!(matches!(
            session.confirm_and_continue(),
            Err(CheckoutError::NothingToConfirm)
        ));
    }

    #[test]
    fn test_close_without_confirming_keeps_state() {
        let mut session = session();
        session.add_to_cart(&product(1, 15000, "Other"));
        fill_form(&mut session);
        let before_cart = session.cart().clone();
        let before_customer = session.customer().clone();
        let SubmitStart::Started(draft) = session.begin_submit().unwrap() else {
            panic!("submission should start");
        };
        session.complete_submit(pending(draft));

        session.close_without_confirming().unwrap();
        assert_eq!(session.phase(), &CheckoutPhase::Idle);
        assert_eq!(session.cart(), &before_cart);
        assert_eq!(session.customer(), &before_customer);
        assert!(session.can_submit());
    }

    #[test]
    fn test_failed_phase_accepts_resubmission() {
        let mut session = session();
        session.add_to_cart(&product(1, 15000, "Other"));
        fill_form(&mut session);
        assert!(matches!(session.begin_submit(), Ok(SubmitStart::Started(_))));
        session.fail_submit("order log unreachable");
        assert_eq!(session.cart().total_items(), 1);
        assert!(session.customer().is_complete());
        assert!(matches!(session.begin_submit(), Ok(SubmitStart::Started(_))));
    }

    #[test]
    fn test_snapshot_reports_formatted_values() {
        let mut session = session();
        let mut discounted = product(5, 22000, WEDHANG);
        discounted.original_price = Some(25000);
        session.add_to_cart(&discounted);
        session.update_quantity(5, 4);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.total_items, 4);
        assert_eq!(snapshot.total_formatted, "Rp88.000");
        assert_eq!(snapshot.lines[0].price_formatted, "Rp22.000");
        assert_eq!(
            snapshot.lines[0].original_price_formatted.as_deref(),
            Some("Rp25.000")
        );
        assert_eq!(snapshot.promotion.free_gifts, 1);
        assert!(snapshot.promotion.bonus_selection_required);
        assert!(!snapshot.can_submit);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["checkout"]["state"], "idle");
        assert_eq!(value["lines"][0]["quantity"], 4);
    }
}
