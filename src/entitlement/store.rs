//! Durable entitlement storage.
//!
//! [`EntitlementStore`] is the narrow RPC-style contract this crate consumes;
//! every operation is treated as an atomic, single-round-trip call. Implement
//! it against your backend. [`InMemoryEntitlementStore`] is the in-process
//! implementation used in mock mode and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::utils::{epoch_day, epoch_secs};

use super::features::{FeatureGate, FeatureSet};
use super::records::{
    EntitlementStatus, EventType, FeatureAccess, FeatureUsage, SubscriptionEvent,
    SubscriptionRecord,
};

/// Contract for the durable entitlement store.
///
/// Upserts must honor the conflict key (user, product): a write carrying a
/// transaction id that was already applied must neither create a second row
/// nor regress an entitled status.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Insert or update the subscription row for (user, product).
    /// Returns the record id.
    async fn upsert_subscription(&self, record: &SubscriptionRecord) -> Result<String>;

    /// Get the subscription row for a user, if any.
    async fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>>;

    /// Get the derived entitlement view for a user.
    async fn get_entitlement_status(&self, user_id: &str) -> Result<EntitlementStatus>;

    /// Answer a feature-access query.
    async fn check_feature_access(&self, user_id: &str, feature: &str) -> Result<FeatureAccess>;

    /// Record one use of a feature today. Returns whether the write landed.
    async fn track_feature_usage(&self, user_id: &str, feature: &str) -> Result<bool>;

    /// Append an event to the audit log. Returns the event id.
    async fn log_event(&self, event: &SubscriptionEvent) -> Result<String>;

    /// Whether a purchase with this transaction id was already applied for
    /// the user (idempotency aid, answered from the event log).
    async fn is_transaction_processed(&self, user_id: &str, transaction_id: &str)
        -> Result<bool>;
}

/// In-memory entitlement store.
///
/// Wraps data in `Arc` for cheap cloning; used in mock mode and tests.
#[derive(Clone, Default)]
pub struct InMemoryEntitlementStore {
    inner: Arc<InMemoryInner>,
}

#[derive(Default)]
struct InMemoryInner {
    /// Keyed by (user_id, product_id).
    subscriptions: RwLock<HashMap<(String, String), SubscriptionRecord>>,
    events: RwLock<Vec<SubscriptionEvent>>,
    /// Keyed by (user_id, feature, epoch day).
    usage: RwLock<HashMap<(String, String, u64), FeatureUsage>>,
    features: FeatureSet,
}

impl InMemoryEntitlementStore {
    /// Create an empty store with no gated features.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given feature registry.
    #[must_use]
    pub fn with_features(features: FeatureSet) -> Self {
        Self {
            inner: Arc::new(InMemoryInner {
                features,
                ..Default::default()
            }),
        }
    }

    /// All logged events, in append order (for testing).
    #[must_use]
    pub fn events(&self) -> Vec<SubscriptionEvent> {
        self.inner.events.read().unwrap().clone()
    }

    /// Events of one type (for testing).
    #[must_use]
    pub fn events_of_type(&self, event_type: EventType) -> Vec<SubscriptionEvent> {
        self.inner
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Number of subscription rows (for testing).
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().unwrap().len()
    }

    /// Today's usage count for (user, feature) (for testing).
    #[must_use]
    pub fn usage_today(&self, user_id: &str, feature: &str) -> u32 {
        let key = (
            user_id.to_string(),
            feature.to_string(),
            epoch_day(epoch_secs()),
        );
        self.inner
            .usage
            .read()
            .unwrap()
            .get(&key)
            .map(|u| u.count)
            .unwrap_or(0)
    }

    /// Seed a subscription row directly (for testing).
    pub fn seed_subscription(&self, record: SubscriptionRecord) {
        self.inner.subscriptions.write().unwrap().insert(
            (record.user_id.clone(), record.product_id.clone()),
            record,
        );
    }

    fn entitled_now(&self, user_id: &str) -> bool {
        let now = epoch_secs();
        self.inner
            .subscriptions
            .read()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .any(|r| r.is_entitled_at(now))
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn upsert_subscription(&self, record: &SubscriptionRecord) -> Result<String> {
        let key = (record.user_id.clone(), record.product_id.clone());
        let mut subscriptions = self.inner.subscriptions.write().unwrap();

        if let Some(existing) = subscriptions.get(&key) {
            // A duplicate of an already-applied transaction must not drop an
            // entitled status back to inactive (transaction ids are opaque,
            // so only equality is decidable; last-write-wins otherwise).
            let duplicate = existing.latest_transaction_id == record.latest_transaction_id;
            if duplicate && existing.status.is_entitled() && !record.status.is_entitled() {
                return Ok(record_key(&key));
            }
        }

        subscriptions.insert(key.clone(), record.clone());
        Ok(record_key(&key))
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        let subscriptions = self.inner.subscriptions.read().unwrap();
        Ok(subscriptions
            .values()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn get_entitlement_status(&self, user_id: &str) -> Result<EntitlementStatus> {
        let record = self.get_subscription(user_id).await?;
        Ok(record
            .map(|r| r.entitlement_at(epoch_secs()))
            .unwrap_or_else(EntitlementStatus::inactive))
    }

    async fn check_feature_access(&self, user_id: &str, feature: &str) -> Result<FeatureAccess> {
        let gate = self.inner.features.gate(feature);
        let entitled = self.entitled_now(user_id);
        let usage_count = self.usage_today(user_id, feature);

        Ok(match gate {
            Some(FeatureGate::Premium) => FeatureAccess {
                has_access: entitled,
                is_premium_feature: true,
                usage_count,
                limit_reached: false,
            },
            Some(FeatureGate::UsageLimited { limit }) => {
                let limit_reached = usage_count >= limit;
                FeatureAccess {
                    has_access: entitled || !limit_reached,
                    is_premium_feature: false,
                    usage_count,
                    limit_reached,
                }
            }
            // Unregistered features are ungated.
            None => FeatureAccess {
                has_access: true,
                is_premium_feature: false,
                usage_count,
                limit_reached: false,
            },
        })
    }

    async fn track_feature_usage(&self, user_id: &str, feature: &str) -> Result<bool> {
        let had_access = self.check_feature_access(user_id, feature).await?.has_access;

        let now = epoch_secs();
        let key = (user_id.to_string(), feature.to_string(), epoch_day(now));
        let mut usage = self.inner.usage.write().unwrap();
        usage
            .entry(key)
            .and_modify(|row| {
                row.count += 1;
                row.had_access = had_access;
            })
            .or_insert_with(|| FeatureUsage {
                user_id: user_id.to_string(),
                feature: feature.to_string(),
                day: epoch_day(now),
                count: 1,
                had_access,
            });
        Ok(true)
    }

    async fn log_event(&self, event: &SubscriptionEvent) -> Result<String> {
        self.inner.events.write().unwrap().push(event.clone());
        Ok(event.id.clone())
    }

    async fn is_transaction_processed(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<bool> {
        let events = self.inner.events.read().unwrap();
        Ok(events.iter().any(|e| {
            e.user_id == user_id
                && e.event_type == EventType::PurchaseCompleted
                && e.transaction_id.as_deref() == Some(transaction_id)
        }))
    }
}

fn record_key(key: &(String, String)) -> String {
    format!("{}:{}", key.0, key.1)
}
