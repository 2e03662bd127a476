//! Durable entitlement data model.
//!
//! One subscription record per (user, product), an append-only event log,
//! and per-day feature usage rows. The entitlement view handed to the rest
//! of the application is derived, never stored.

use serde::{Deserialize, Serialize};

use crate::store::StoreEnvironment;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No entitlement.
    Inactive,
    /// Paid and current.
    Active,
    /// In the trial window.
    Trial,
    /// Past its expiration date.
    Expired,
    /// A renewal payment failed; access temporarily retained pending retry.
    GracePeriod,
    /// Paused by the user or the store.
    Paused,
    /// Cancelled; access ends at the recorded expiration.
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether this status grants access on its own (expiry checked
    /// separately).
    #[must_use]
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trial | Self::GracePeriod)
    }

    /// Parse from a stored status string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "trial" => Self::Trial,
            "expired" => Self::Expired,
            "grace_period" => Self::GracePeriod,
            "paused" => Self::Paused,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Inactive,
        }
    }

    /// Convert to a stored status string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Trial => "trial",
            Self::Expired => "expired",
            Self::GracePeriod => "grace_period",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One logical subscription row per (user, product).
///
/// Never hard-deleted; expiry is represented by a status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub product_id: String,
    pub status: SubscriptionStatus,
    /// When the entitlement first began (Unix timestamp).
    pub start_date: u64,
    /// When access lapses; `None` for lifetime purchases.
    pub expiration_date: Option<u64>,
    /// Whether the current period is a trial.
    pub is_trial_period: bool,
    /// Which store environment issued the backing receipt.
    pub environment: StoreEnvironment,
    /// Most recently applied transaction id.
    pub latest_transaction_id: String,
    /// Links renewals to the first purchase.
    pub original_transaction_id: Option<String>,
    /// Opaque proof-of-purchase payload.
    pub receipt_data: String,
    pub auto_renew_enabled: bool,
    /// When the receipt last passed validation (Unix timestamp).
    pub last_receipt_validation: u64,
    pub updated_at: u64,
}

impl SubscriptionRecord {
    /// Whether this record grants access at `now`.
    #[must_use]
    pub fn is_entitled_at(&self, now: u64) -> bool {
        self.status.is_entitled()
            && self.expiration_date.map(|exp| exp > now).unwrap_or(true)
    }

    /// Remaining whole trial days at `now`, if in a trial period.
    #[must_use]
    pub fn trial_days_remaining(&self, now: u64) -> Option<u32> {
        if !self.is_trial_period {
            return None;
        }
        self.expiration_date.and_then(|end| {
            if end > now {
                Some(((end - now) / 86_400) as u32)
            } else {
                None
            }
        })
    }

    /// Derive the client-facing entitlement view at `now`.
    #[must_use]
    pub fn entitlement_at(&self, now: u64) -> EntitlementStatus {
        EntitlementStatus {
            has_active_subscription: self.is_entitled_at(now),
            status: self.status,
            expiration_date: self.expiration_date,
            is_trial_period: self.is_trial_period,
            product_id: Some(self.product_id.clone()),
        }
    }
}

/// Derived entitlement view. Computed from the subscription record, not
/// persisted as its own row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementStatus {
    pub has_active_subscription: bool,
    pub status: SubscriptionStatus,
    pub expiration_date: Option<u64>,
    pub is_trial_period: bool,
    pub product_id: Option<String>,
}

impl EntitlementStatus {
    /// Safe default: no entitlement. Returned whenever the durable layer
    /// cannot answer, so status checks never crash the caller.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            has_active_subscription: false,
            status: SubscriptionStatus::Inactive,
            expiration_date: None,
            is_trial_period: false,
            product_id: None,
        }
    }
}

impl Default for EntitlementStatus {
    fn default() -> Self {
        Self::inactive()
    }
}

/// Subscription event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PurchaseInitiated,
    PurchaseCompleted,
    PurchaseFailed,
    ValidationFailed,
    RestoreCompleted,
    StatusChanged,
}

impl EventType {
    /// Convert to the stored event-type string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseInitiated => "purchase_initiated",
            Self::PurchaseCompleted => "purchase_completed",
            Self::PurchaseFailed => "purchase_failed",
            Self::ValidationFailed => "validation_failed",
            Self::RestoreCompleted => "restore_completed",
            Self::StatusChanged => "status_changed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit log entry. Never updated or deleted; doubles as the
/// idempotency aid for duplicate purchase notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub transaction_id: Option<String>,
    pub timestamp: u64,
}

/// Per (user, feature, day) usage row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub user_id: String,
    pub feature: String,
    /// Epoch day the usage belongs to.
    pub day: u64,
    pub count: u32,
    /// Whether the user had access at time of use.
    pub had_access: bool,
}

/// Answer to a feature-access query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureAccess {
    pub has_access: bool,
    pub is_premium_feature: bool,
    pub usage_count: u32,
    pub limit_reached: bool,
}

impl FeatureAccess {
    /// Safe default: denied, no usage information.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            has_access: false,
            is_premium_feature: false,
            usage_count: 0,
            limit_reached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: SubscriptionStatus, expiration: Option<u64>) -> SubscriptionRecord {
        SubscriptionRecord {
            user_id: "user_1".to_string(),
            product_id: "founders_yearly".to_string(),
            status,
            start_date: 1_700_000_000,
            expiration_date: expiration,
            is_trial_period: status == SubscriptionStatus::Trial,
            environment: StoreEnvironment::Production,
            latest_transaction_id: "t1".to_string(),
            original_transaction_id: Some("t1".to_string()),
            receipt_data: "r".to_string(),
            auto_renew_enabled: true,
            last_receipt_validation: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_entitled_statuses() {
        let now = 1_700_000_100;
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trial,
            SubscriptionStatus::GracePeriod,
        ] {
            assert!(record(status, Some(now + 1000)).is_entitled_at(now));
        }
        for status in [
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Paused,
            SubscriptionStatus::Cancelled,
        ] {
            assert!(!record(status, Some(now + 1000)).is_entitled_at(now));
        }
    }

    #[test]
    fn test_expiration_gates_entitlement() {
        let now = 1_700_000_100;
        // Lapsed expiration defeats an otherwise-entitled status.
        assert!(!record(SubscriptionStatus::Active, Some(now - 1)).is_entitled_at(now));
        // Exactly-at-expiry is no longer entitled.
        assert!(!record(SubscriptionStatus::Active, Some(now)).is_entitled_at(now));
        // No expiration means lifetime access.
        assert!(record(SubscriptionStatus::Active, None).is_entitled_at(now));
    }

    #[test]
    fn test_trial_days_remaining() {
        let now = 1_700_000_000;
        let rec = record(SubscriptionStatus::Trial, Some(now + 7 * 86_400 + 60));
        assert_eq!(rec.trial_days_remaining(now), Some(7));

        let lapsed = record(SubscriptionStatus::Trial, Some(now - 1));
        assert_eq!(lapsed.trial_days_remaining(now), None);

        let not_trial = record(SubscriptionStatus::Active, Some(now + 86_400));
        assert_eq!(not_trial.trial_days_remaining(now), None);
    }

    #[test]
    fn test_derived_view() {
        let now = 1_700_000_100;
        let view = record(SubscriptionStatus::Active, Some(now + 1000)).entitlement_at(now);
        assert!(view.has_active_subscription);
        assert_eq!(view.product_id.as_deref(), Some("founders_yearly"));

        let inactive = EntitlementStatus::inactive();
        assert!(!inactive.has_active_subscription);
        assert_eq!(inactive.status, SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Active,
            SubscriptionStatus::Trial,
            SubscriptionStatus::Expired,
            SubscriptionStatus::GracePeriod,
            SubscriptionStatus::Paused,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), status);
        }
        assert_eq!(
            SubscriptionStatus::from_str("garbage"),
            SubscriptionStatus::Inactive
        );
    }
}
