//! Product catalog configuration.
//!
//! The purchasable product line is small and fixed; define it with the
//! builder and hand it to the store adapter, orchestrator, and validator.
//!
//! ```rust
//! use tollgate::catalog::Catalog;
//!
//! let catalog = Catalog::builder()
//!     .product("founders_yearly")
//!         .name("Founders (Yearly)")
//!         .price_cents(7999)
//!         .yearly()
//!         .trial_days(7)
//!         .done()
//!     .product("founders_monthly")
//!         .name("Founders (Monthly)")
//!         .price_cents(999)
//!         .monthly()
//!         .done()
//!     .build();
//!
//! assert!(catalog.contains("founders_yearly"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Billing interval for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    /// Renews monthly.
    Monthly,
    /// Renews yearly.
    Yearly,
    /// One-time purchase, never expires.
    Lifetime,
}

impl BillingInterval {
    /// Length of one billing period in days. `None` means no expiry.
    #[must_use]
    pub fn period_days(&self) -> Option<u64> {
        match self {
            Self::Monthly => Some(30),
            Self::Yearly => Some(365),
            Self::Lifetime => None,
        }
    }

    /// Convert from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "yearly" | "year" | "annual" => Self::Yearly,
            "lifetime" | "one_time" => Self::Lifetime,
            _ => Self::Monthly,
        }
    }

    /// Convert to string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Lifetime => "lifetime",
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier known to the platform store.
    pub id: String,
    /// Display name shown to users.
    pub name: String,
    /// Price in cents (for display purposes; the store is authoritative).
    pub price_cents: i64,
    /// Currency code (e.g., "usd").
    pub currency: String,
    /// Billing interval.
    pub interval: BillingInterval,
    /// Trial period in days (None = no trial).
    pub trial_days: Option<u32>,
}

impl Product {
    /// Get the price formatted for display (e.g., "$9.99").
    #[must_use]
    pub fn formatted_price(&self) -> String {
        let symbol = match self.currency.as_str() {
            "usd" => "$",
            "gbp" => "£",
            "eur" => "€",
            _ => &self.currency,
        };
        let dollars = self.price_cents as f64 / 100.0;
        format!("{}{:.2}", symbol, dollars)
    }
}

/// The configured product line.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<String, Product>,
}

impl Catalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing a catalog.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Get a product by ID.
    #[must_use]
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    /// Check if a product exists.
    #[must_use]
    pub fn contains(&self, product_id: &str) -> bool {
        self.products.contains_key(product_id)
    }

    /// Get all product IDs.
    #[must_use]
    pub fn product_ids(&self) -> Vec<String> {
        self.products.keys().cloned().collect()
    }

    /// Get the number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Check if there are no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Iterate over all products.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Product)> {
        self.products.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check that every product id is well-formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.is_empty() && self.products.keys().all(|id| !id.trim().is_empty())
    }
}

/// Static catalog used when the store cannot be reached and in mock mode.
///
/// Keeps the UI populated with purchasable items rather than leaving it
/// empty on a catalog-fetch failure.
#[must_use]
pub fn mock_catalog() -> Catalog {
    Catalog::builder()
        .product("founders_monthly")
            .name("Founders (Monthly)")
            .price_cents(999)
            .monthly()
            .trial_days(7)
            .done()
        .product("founders_yearly")
            .name("Founders (Yearly)")
            .price_cents(7999)
            .yearly()
            .trial_days(7)
            .done()
        .build()
}

/// Builder for [`Catalog`].
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct CatalogBuilder {
    products: Vec<Product>,
}

impl CatalogBuilder {
    /// Create a new catalog builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a product.
    pub fn product(self, id: impl Into<String>) -> ProductBuilder {
        ProductBuilder {
            catalog: self,
            product: Product {
                id: id.into(),
                name: String::new(),
                price_cents: 0,
                currency: "usd".to_string(),
                interval: BillingInterval::Monthly,
                trial_days: None,
            },
        }
    }

    /// Build the catalog.
    pub fn build(self) -> Catalog {
        let products = self
            .products
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Catalog { products }
    }
}

/// Builder for a single product within a [`CatalogBuilder`].
#[must_use = "call done() to add the product to the catalog"]
pub struct ProductBuilder {
    catalog: CatalogBuilder,
    product: Product,
}

impl ProductBuilder {
    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.product.name = name.into();
        self
    }

    /// Set the display price in cents.
    pub fn price_cents(mut self, cents: i64) -> Self {
        self.product.price_cents = cents;
        self
    }

    /// Set the currency code.
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.product.currency = currency.into();
        self
    }

    /// Bill monthly.
    pub fn monthly(mut self) -> Self {
        self.product.interval = BillingInterval::Monthly;
        self
    }

    /// Bill yearly.
    pub fn yearly(mut self) -> Self {
        self.product.interval = BillingInterval::Yearly;
        self
    }

    /// One-time lifetime purchase.
    pub fn lifetime(mut self) -> Self {
        self.product.interval = BillingInterval::Lifetime;
        self
    }

    /// Set the trial period in days.
    pub fn trial_days(mut self, days: u32) -> Self {
        self.product.trial_days = Some(days);
        self
    }

    /// Finish this product and return to the catalog builder.
    pub fn done(mut self) -> CatalogBuilder {
        self.catalog.products.push(self.product);
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let catalog = Catalog::builder()
            .product("basic_monthly")
                .name("Basic")
                .price_cents(499)
                .monthly()
                .done()
            .product("forever")
                .name("Forever")
                .price_cents(19999)
                .lifetime()
                .done()
            .build();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("basic_monthly"));
        assert!(!catalog.contains("unknown"));

        let product = catalog.get("forever").unwrap();
        assert_eq!(product.interval, BillingInterval::Lifetime);
        assert_eq!(product.interval.period_days(), None);
        assert_eq!(product.trial_days, None);
    }

    #[test]
    fn test_mock_catalog_shape() {
        let catalog = mock_catalog();
        assert!(catalog.is_well_formed());
        assert!(catalog.contains("founders_yearly"));
        assert!(catalog.contains("founders_monthly"));

        let yearly = catalog.get("founders_yearly").unwrap();
        assert_eq!(yearly.interval.period_days(), Some(365));
        assert_eq!(yearly.trial_days, Some(7));
    }

    #[test]
    fn test_formatted_price() {
        let catalog = mock_catalog();
        assert_eq!(
            catalog.get("founders_monthly").unwrap().formatted_price(),
            "$9.99"
        );
    }

    #[test]
    fn test_interval_round_trip() {
        assert_eq!(BillingInterval::from_str("yearly"), BillingInterval::Yearly);
        assert_eq!(BillingInterval::from_str("annual"), BillingInterval::Yearly);
        assert_eq!(
            BillingInterval::from_str("lifetime"),
            BillingInterval::Lifetime
        );
        assert_eq!(
            BillingInterval::from_str("unknown"),
            BillingInterval::Monthly
        );
        assert_eq!(BillingInterval::Yearly.as_str(), "yearly");
    }

    #[test]
    fn test_empty_catalog_not_well_formed() {
        assert!(!Catalog::new().is_well_formed());

        let blank_id = Catalog::builder().product("  ").name("Blank").done().build();
        assert!(!blank_id.is_well_formed());
    }
}
