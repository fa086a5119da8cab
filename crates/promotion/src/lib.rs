//! Tiered free-gift promotion: every `tier_size` units bought in one category
//! earn one free gift, and the customer picks which gift variant they want.
//!
//! Everything here is a pure function of the cart and the current bonus
//! selection. The selection itself is owned by the caller; [`PromotionRule::reconcile`]
//! must run after every cart mutation so that a choice never outlives its
//! eligibility.

use app_config::AppConfig;
use cart::CartStore;
use serde::Serialize;
use thiserror::Error;

/// Promo description recorded when the order earns no gift.
pub const NO_BONUS: &str = "Tidak ada";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromotionError {
    /// A gift was picked while the cart earns none.
    #[error("No free gift available for the current cart")]
    BonusNotAvailable,
    #[error("Promotion tier size must be positive, got {0}")]
    InvalidTierSize(u32),
}

/// The promotion's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionRule {
    category: String,
    tier_size: u32,
    bonus_options: Vec<String>,
}

/// Evaluated promotion state for one cart.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromotionStatus {
    pub category: String,
    pub category_quantity: u64,
    pub free_gifts: u64,
    /// Units still needed for the next gift, in `1..=tier_size`. Sitting
    /// exactly on a tier boundary (including an empty category) reports the
    /// full tier size.
    pub remainder_to_next_gift: u64,
    /// False on a tier boundary, where the remainder is a full tier.
    pub show_next_tier_hint: bool,
    /// Whether any unit of the category is in the cart.
    pub applies: bool,
    pub bonus_options: Vec<String>,
    pub selected_bonus: Option<String>,
    pub bonus_selection_required: bool,
}

impl PromotionRule {
    /// # Errors
    /// Returns [`PromotionError::InvalidTierSize`] if `tier_size` is zero.
    pub fn new(
        category: impl Into<String>,
        tier_size: u32,
        bonus_options: Vec<String>,
    ) -> Result<Self, PromotionError> {
        if tier_size == 0 {
            return Err(PromotionError::InvalidTierSize(tier_size));
        }
        Ok(Self {
            category: category.into(),
            tier_size,
            bonus_options,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, PromotionError> {
        Self::new(
            cfg.promo_category.clone(),
            cfg.promo_tier_size,
            cfg.bonus_options.clone(),
        )
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn tier_size(&self) -> u32 {
        self.tier_size
    }

    pub fn bonus_options(&self) -> &[String] {
        &self.bonus_options
    }

    pub fn category_quantity(&self, cart: &CartStore) -> u64 {
        cart.quantity_in_category(&self.category)
    }

    pub fn free_gifts(&self, cart: &CartStore) -> u64 {
        self.category_quantity(cart) / u64::from(self.tier_size)
    }

    pub fn evaluate(&self, cart: &CartStore, selected_bonus: Option<&str>) -> PromotionStatus {
        let tier = u64::from(self.tier_size);
        let category_quantity = self.category_quantity(cart);
        let free_gifts = category_quantity / tier;
        let remainder_to_next_gift = tier - category_quantity % tier;
        let selected_bonus = selected_bonus
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);

        PromotionStatus {
            category: self.category.clone(),
            category_quantity,
            free_gifts,
            remainder_to_next_gift,
            show_next_tier_hint: remainder_to_next_gift != tier,
            applies: category_quantity > 0,
            bonus_options: self.bonus_options.clone(),
            bonus_selection_required: free_gifts > 0 && selected_bonus.is_none(),
            selected_bonus,
        }
    }

    /// Clears `selection` when the cart no longer earns a gift.
    ///
    /// Returns true if a selection was dropped.
    pub fn reconcile(&self, cart: &CartStore, selection: &mut Option<String>) -> bool {
        if self.free_gifts(cart) == 0 && selection.is_some() {
            *selection = None;
            return true;
        }
        false
    }

    /// Checks a gift choice against the cart. A blank token clears the choice.
    pub fn choose_bonus(
        &self,
        cart: &CartStore,
        token: &str,
    ) -> Result<Option<String>, PromotionError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        if self.free_gifts(cart) == 0 {
            return Err(PromotionError::BonusNotAvailable);
        }
        Ok(Some(token.to_string()))
    }
}

impl PromotionStatus {
    /// `"{free_gifts}x {selected_bonus}"`, or [`NO_BONUS`] when no gift is earned.
    pub fn promo_details(&self) -> String {
        match (self.free_gifts, self.selected_bonus.as_deref()) {
            (0, _) => NO_BONUS.to_string(),
            (gifts, Some(bonus)) => format!("{gifts}x {bonus}"),
            (gifts, None) => format!("{gifts}x"),
        }
    }
}
