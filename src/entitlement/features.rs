//! Feature gating registry.
//!
//! Declares which features are subscription-gated and which are free but
//! usage-limited, independent of the product catalog.
//!
//! ```rust
//! use tollgate::entitlement::FeatureSet;
//!
//! let features = FeatureSet::builder()
//!     .premium("advanced_insights")
//!     .usage_limited("unlimited_reviews", 15)
//!     .build();
//!
//! assert!(features.is_premium("advanced_insights"));
//! ```

use std::collections::HashMap;

/// How access to a feature is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureGate {
    /// Access is exactly `has_active_subscription`.
    Premium,
    /// Free up to `limit` uses per day; unlimited with a subscription.
    UsageLimited { limit: u32 },
}

/// Registry of gated features.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    gates: HashMap<String, FeatureGate>,
}

impl FeatureSet {
    /// Create an empty feature set (everything ungated).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> FeatureSetBuilder {
        FeatureSetBuilder::default()
    }

    /// Get the gate for a feature, if it is registered.
    #[must_use]
    pub fn gate(&self, feature: &str) -> Option<FeatureGate> {
        self.gates.get(feature).copied()
    }

    /// Whether a feature is subscription-gated.
    #[must_use]
    pub fn is_premium(&self, feature: &str) -> bool {
        matches!(self.gate(feature), Some(FeatureGate::Premium))
    }

    /// Number of registered features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    /// Whether no features are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Iterate over registered gates.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureGate)> {
        self.gates.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Builder for [`FeatureSet`].
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct FeatureSetBuilder {
    gates: HashMap<String, FeatureGate>,
}

impl FeatureSetBuilder {
    /// Register a subscription-gated feature.
    pub fn premium(mut self, feature: impl Into<String>) -> Self {
        self.gates.insert(feature.into(), FeatureGate::Premium);
        self
    }

    /// Register a free feature capped at `limit` uses per day.
    pub fn usage_limited(mut self, feature: impl Into<String>, limit: u32) -> Self {
        self.gates
            .insert(feature.into(), FeatureGate::UsageLimited { limit });
        self
    }

    /// Build the feature set.
    pub fn build(self) -> FeatureSet {
        FeatureSet { gates: self.gates }
    }
}
