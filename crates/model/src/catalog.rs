//! Static product catalog, loaded once at startup and never mutated.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::Product;

/// Catalog bundled with the binary, used when no catalog file is configured.
const BUNDLED_CATALOG: &str = include_str!("../catalog/products.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    /// The catalog is not a valid JSON array of products.
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate product id {0} in catalog")]
    DuplicateId(u32),
    #[error("Product {id} has original price {original_price} below its price {price}")]
    InvalidOriginalPrice {
        id: u32,
        price: u64,
        original_price: u64,
    },
}

/// Ordered, immutable list of products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    products: Vec<Product>,
}

/// Products sharing one category label, in catalog order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryGroup<'a> {
    pub category: &'a str,
    pub products: Vec<&'a Product>,
}

impl Catalog {
    /// Builds a catalog after checking id uniqueness and price consistency.
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(products.len());
        for product in &products {
            if !seen.insert(product.id) {
                return Err(CatalogError::DuplicateId(product.id));
            }
            if let Some(original_price) = product.original_price {
                if original_price < product.price {
                    return Err(CatalogError::InvalidOriginalPrice {
                        id: product.id,
                        price: product.price,
                        original_price,
                    });
                }
            }
        }
        Ok(Self { products })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        Self::new(products)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json_str(BUNDLED_CATALOG)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn find(&self, id: u32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Groups products by category; categories appear in first-seen order.
    pub fn by_category(&self) -> Vec<CategoryGroup<'_>> {
        let mut groups: Vec<CategoryGroup<'_>> = Vec::new();
        for product in &self.products {
            match groups.iter_mut().find(|g| g.category == product.category) {
                Some(group) => group.products.push(product),
                None => groups.push(CategoryGroup {
                    category: &product.category,
                    products: vec![product],
                }),
            }
        }
        groups
    }
}
