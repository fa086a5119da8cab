//! Shared domain types for the storefront: catalog products, cart lines,
//! delivery details and the payload recorded for every checkout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;
pub mod currency;

pub use catalog::{Catalog, CatalogError, CategoryGroup};
pub use currency::format_rupiah;

/// Product is an immutable catalog entry.
///
/// Prices are whole rupiah. The merchandising flags only drive presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<u64>,
    pub image: String,
    pub category: String,
    pub tag: String,
    #[serde(default)]
    pub is_best_seller: bool,
    #[serde(default)]
    pub is_highlight: bool,
    #[serde(default)]
    pub is_special_offer: bool,
}

/// CartItem is a product together with the quantity ordered.
///
/// The quantity is always at least one; the cart drops a line instead of
/// storing zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            quantity: 1,
        }
    }

    pub fn id(&self) -> u32 {
        self.product.id
    }

    /// `price × quantity`; the original price never takes part.
    pub fn line_total(&self) -> u64 {
        self.product.price * u64::from(self.quantity)
    }
}

/// Names of the delivery form fields, as the form submits them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CustomerField {
    Name,
    Phone,
    Address,
    PostalCode,
}

impl CustomerField {
    pub const ALL: [CustomerField; 4] = [
        CustomerField::Name,
        CustomerField::Phone,
        CustomerField::Address,
        CustomerField::PostalCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CustomerField::Name => "name",
            CustomerField::Phone => "phone",
            CustomerField::Address => "address",
            CustomerField::PostalCode => "postalCode",
        }
    }
}

impl fmt::Display for CustomerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown customer field: {0}")]
pub struct CustomerFieldError(pub String);

impl FromStr for CustomerField {
    type Err = CustomerFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CustomerField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CustomerFieldError(s.to_string()))
    }
}

/// CustomerInfo holds the delivery details typed into the order form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub postal_code: String,
}

impl CustomerInfo {
    /// Overwrites one field unconditionally.
    pub fn set_field(&mut self, field: CustomerField, value: impl Into<String>) {
        *self.field_mut(field) = value.into();
    }

    pub fn field(&self, field: CustomerField) -> &str {
        match field {
            CustomerField::Name => &self.name,
            CustomerField::Phone => &self.phone,
            CustomerField::Address => &self.address,
            CustomerField::PostalCode => &self.postal_code,
        }
    }

    fn field_mut(&mut self, field: CustomerField) -> &mut String {
        match field {
            CustomerField::Name => &mut self.name,
            CustomerField::Phone => &mut self.phone,
            CustomerField::Address => &mut self.address,
            CustomerField::PostalCode => &mut self.postal_code,
        }
    }

    /// Fields that are still empty. Whitespace-only input counts as empty.
    pub fn missing_fields(&self) -> Vec<CustomerField> {
        CustomerField::ALL
            .into_iter()
            .filter(|field| self.field(*field).trim().is_empty())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// OrderLogEntry is the row appended to the order spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLogEntry {
    #[serde(flatten)]
    pub customer: CustomerInfo,
    pub order_details: String,
    pub total: String,
    pub promo_details: String,
}
