//! In-memory shopping cart.
//!
//! Lines are merged by product id and kept in first-add order. A line whose
//! quantity would drop to zero is removed instead of stored.

use model::{CartItem, Product};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CartStore {
    items: Vec<CartItem>,
}

impl CartStore {
    /// Create a new, empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one unit of `product`, merging with an existing line of the same id.
    ///
    /// Returns the line's quantity after the add.
    pub fn add_to_cart(&mut self, product: &Product) -> u32 {
        match self.items.iter_mut().find(|item| item.id() == product.id) {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(1);
                debug!(product_id = product.id, quantity = item.quantity, "Incremented cart line");
                item.quantity
            }
            None => {
                self.items.push(CartItem::new(product.clone()));
                debug!(product_id = product.id, "Added cart line");
                1
            }
        }
    }

    /// Sets the absolute quantity of a line; zero or less removes it.
    ///
    /// Unknown ids are ignored.
    pub fn update_quantity(&mut self, product_id: u32, new_quantity: i64) {
        if new_quantity <= 0 {
            self.remove_from_cart(product_id);
            return;
        }
        let quantity = u32::try_from(new_quantity).unwrap_or(u32::MAX);
        if let Some(item) = self.items.iter_mut().find(|item| item.id() == product_id) {
            item.quantity = quantity;
            debug!(product_id, quantity, "Updated cart line");
        }
    }

    /// Deletes the line for `product_id` if present.
    pub fn remove_from_cart(&mut self, product_id: u32) {
        let before = self.items.len();
        self.items.retain(|item| item.id() != product_id);
        if self.items.len() != before {
            debug!(product_id, "Removed cart line");
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn get(&self, product_id: u32) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id() == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sum of quantities over all lines.
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of `price × quantity` over all lines.
    pub fn total_price(&self) -> u64 {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Units in the cart whose product carries `category`.
    pub fn quantity_in_category(&self, category: &str) -> u64 {
        self.items
            .iter()
            .filter(|item| item.product.category == category)
            .map(|item| u64::from(item.quantity))
            .sum()
    }
}
