//! Entitlement store gateway.
//!
//! The only component allowed to mutate the durable subscription record.
//! Reads never fail upward: status checks return a safe inactive default on
//! any lower-layer failure. Event and usage writes are best-effort so they
//! can never block a user-facing purchase flow.

use futures::future::join_all;

use crate::catalog::Catalog;
use crate::config::ExecutionEnvironment;
use crate::error::{Result, TollgateError};
use crate::store::PurchaseNotification;
use crate::utils::epoch_secs;

use super::records::{
    EntitlementStatus, EventType, FeatureAccess, SubscriptionEvent, SubscriptionRecord,
    SubscriptionStatus,
};
use super::store::EntitlementStore;

/// Gateway over the durable entitlement store.
#[derive(Clone)]
pub struct EntitlementGateway<S: EntitlementStore> {
    store: S,
    catalog: Catalog,
    environment: ExecutionEnvironment,
}

impl<S: EntitlementStore> EntitlementGateway<S> {
    /// Create a new gateway.
    #[must_use]
    pub fn new(store: S, catalog: Catalog, environment: ExecutionEnvironment) -> Self {
        Self {
            store,
            catalog,
            environment,
        }
    }

    /// Apply a validated purchase notification to the durable record.
    ///
    /// Idempotent on transaction id: a duplicate delivery neither creates a
    /// second row nor double-extends the expiration, and logs no second
    /// completion event.
    pub async fn apply_purchase(
        &self,
        user_id: &str,
        notification: &PurchaseNotification,
    ) -> Result<EntitlementStatus> {
        let already_processed = self
            .store
            .is_transaction_processed(user_id, &notification.transaction_id)
            .await
            .unwrap_or(false);
        if already_processed {
            tracing::debug!(
                target: "tollgate::entitlement",
                transaction_id = %notification.transaction_id,
                "Duplicate purchase notification; entitlement unchanged"
            );
            return Ok(self.entitlement_status(user_id).await);
        }

        let product = self.catalog.get(&notification.product_id).ok_or_else(|| {
            TollgateError::ConfigurationInvalid(format!(
                "Unknown product: {}",
                notification.product_id
            ))
        })?;

        let existing = self.store.get_subscription(user_id).await.unwrap_or(None);
        let now = epoch_secs();

        // The trial window applies to the first purchase only; renewals and
        // repurchases convert straight to a paid period.
        let is_first_purchase = existing.is_none() && !notification.is_renewal();
        let (status, is_trial_period, expiration_date) = match product.trial_days {
            Some(days) if is_first_purchase => (
                SubscriptionStatus::Trial,
                true,
                Some(notification.purchase_date + u64::from(days) * 86_400),
            ),
            _ => (
                SubscriptionStatus::Active,
                false,
                product
                    .interval
                    .period_days()
                    .map(|days| notification.purchase_date + days * 86_400),
            ),
        };

        let record = SubscriptionRecord {
            user_id: user_id.to_string(),
            product_id: notification.product_id.clone(),
            status,
            start_date: existing
                .as_ref()
                .map(|e| e.start_date)
                .unwrap_or(notification.purchase_date),
            expiration_date,
            is_trial_period,
            environment: notification.environment,
            latest_transaction_id: notification.transaction_id.clone(),
            original_transaction_id: notification
                .original_transaction_id
                .clone()
                .or_else(|| existing.as_ref().and_then(|e| e.original_transaction_id.clone())),
            receipt_data: notification.receipt_data.clone(),
            auto_renew_enabled: expiration_date.is_some(),
            last_receipt_validation: now,
            updated_at: now,
        };

        let record_id = match self.store.upsert_subscription(&record).await {
            Ok(id) => id,
            Err(err) => {
                // A paying user without access is the priority failure mode.
                tracing::error!(
                    target: "tollgate::entitlement",
                    user_id = %user_id,
                    transaction_id = %notification.transaction_id,
                    error = %err,
                    "Entitlement write failed after confirmed payment"
                );
                return Err(TollgateError::DurableWriteFailed(err.to_string()));
            }
        };

        self.log_event(
            user_id,
            EventType::PurchaseCompleted,
            serde_json::json!({
                "product_id": notification.product_id,
                "record_id": record_id,
                "status": record.status.as_str(),
            }),
            Some(notification.transaction_id.clone()),
        )
        .await;

        Ok(record.entitlement_at(now))
    }

    /// Derived entitlement view; propagates lower-layer failures.
    pub async fn try_entitlement_status(&self, user_id: &str) -> Result<EntitlementStatus> {
        self.store.get_entitlement_status(user_id).await
    }

    /// Derived entitlement view; never fails. On any lower-layer failure the
    /// safe inactive default is returned so callers never crash on a status
    /// check.
    pub async fn entitlement_status(&self, user_id: &str) -> EntitlementStatus {
        match self.store.get_entitlement_status(user_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(
                    target: "tollgate::entitlement",
                    user_id = %user_id,
                    error = %err,
                    "Entitlement read failed; reporting inactive"
                );
                EntitlementStatus::inactive()
            }
        }
    }

    /// Feature-access query; never fails. Defaults to denied on error.
    pub async fn check_feature_access(&self, user_id: &str, feature: &str) -> FeatureAccess {
        match self.store.check_feature_access(user_id, feature).await {
            Ok(access) => access,
            Err(err) => {
                tracing::warn!(
                    target: "tollgate::entitlement",
                    user_id = %user_id,
                    feature = %feature,
                    error = %err,
                    "Feature access check failed; denying"
                );
                FeatureAccess::denied()
            }
        }
    }

    /// Best-effort usage increment. Never blocks or fails the caller's
    /// primary action.
    pub async fn track_feature_usage(&self, user_id: &str, feature: &str) -> bool {
        match self.store.track_feature_usage(user_id, feature).await {
            Ok(written) => written,
            Err(err) => {
                tracing::debug!(
                    target: "tollgate::entitlement",
                    feature = %feature,
                    error = %err,
                    "Usage tracking failed"
                );
                false
            }
        }
    }

    /// Best-effort batch of usage increments, issued concurrently.
    pub async fn track_usage_batch(&self, user_id: &str, features: &[&str]) {
        let writes = features
            .iter()
            .map(|feature| self.track_feature_usage(user_id, feature));
        join_all(writes).await;
    }

    /// Append an audit event. Failures are logged locally and swallowed.
    pub async fn log_event(
        &self,
        user_id: &str,
        event_type: EventType,
        payload: serde_json::Value,
        transaction_id: Option<String>,
    ) {
        let event = SubscriptionEvent {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_string(),
            event_type,
            payload,
            transaction_id,
            timestamp: epoch_secs(),
        };

        if let Err(err) = self.store.log_event(&event).await {
            tracing::warn!(
                target: "tollgate::entitlement",
                event_type = %event_type,
                error = %err,
                "Event write failed"
            );
        }
    }

    /// Administrative status change, for test tooling. Refused in
    /// production; logged as a `status_changed` event.
    pub async fn override_status(
        &self,
        user_id: &str,
        product_id: &str,
        status: SubscriptionStatus,
    ) -> Result<EntitlementStatus> {
        if self.environment == ExecutionEnvironment::Production {
            return Err(TollgateError::ConfigurationInvalid(
                "Manual status changes are not available in production".to_string(),
            ));
        }

        let now = epoch_secs();
        let existing = self.store.get_subscription(user_id).await.unwrap_or(None);
        let mut record = existing.unwrap_or_else(|| SubscriptionRecord {
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            status: SubscriptionStatus::Inactive,
            start_date: now,
            expiration_date: None,
            is_trial_period: false,
            environment: crate::store::StoreEnvironment::Sandbox,
            latest_transaction_id: format!("manual_{}", uuid::Uuid::new_v4()),
            original_transaction_id: None,
            receipt_data: String::new(),
            auto_renew_enabled: false,
            last_receipt_validation: now,
            updated_at: now,
        });
        record.status = status;
        record.updated_at = now;

        self.store
            .upsert_subscription(&record)
            .await
            .map_err(|err| TollgateError::DurableWriteFailed(err.to_string()))?;

        self.log_event(
            user_id,
            EventType::StatusChanged,
            serde_json::json!({ "status": status.as_str(), "manual": true }),
            None,
        )
        .await;

        Ok(record.entitlement_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock_catalog;
    use crate::entitlement::store::InMemoryEntitlementStore;
    use crate::store::StoreEnvironment;

    fn notification(txn: &str, product: &str) -> PurchaseNotification {
        PurchaseNotification {
            transaction_id: txn.to_string(),
            original_transaction_id: Some(txn.to_string()),
            product_id: product.to_string(),
            purchase_date: epoch_secs(),
            receipt_data: "opaque".to_string(),
            environment: StoreEnvironment::Sandbox,
        }
    }

    fn gateway(store: &InMemoryEntitlementStore) -> EntitlementGateway<InMemoryEntitlementStore> {
        EntitlementGateway::new(
            store.clone(),
            mock_catalog(),
            ExecutionEnvironment::Development,
        )
    }

    #[tokio::test]
    async fn test_first_purchase_enters_trial_window() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        let status = gw
            .apply_purchase("user_1", &notification("t1", "founders_yearly"))
            .await
            .unwrap();

        assert!(status.has_active_subscription);
        assert_eq!(status.status, SubscriptionStatus::Trial);
        assert!(status.is_trial_period);

        let events = store.events_of_type(EventType::PurchaseCompleted);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transaction_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_renewal_is_active_not_trial() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        gw.apply_purchase("user_1", &notification("t1", "founders_yearly"))
            .await
            .unwrap();

        let mut renewal = notification("t2", "founders_yearly");
        renewal.original_transaction_id = Some("t1".to_string());
        let status = gw.apply_purchase("user_1", &renewal).await.unwrap();

        assert_eq!(status.status, SubscriptionStatus::Active);
        assert!(!status.is_trial_period);

        let record = store.get_subscription("user_1").await.unwrap().unwrap();
        assert_eq!(record.latest_transaction_id, "t2");
        assert_eq!(record.original_transaction_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_changes_nothing() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);
        let n = notification("t1", "founders_yearly");

        gw.apply_purchase("user_1", &n).await.unwrap();
        let before = store.get_subscription("user_1").await.unwrap().unwrap();

        let status = gw.apply_purchase("user_1", &n).await.unwrap();
        assert!(status.has_active_subscription);

        let after = store.get_subscription("user_1").await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(store.events_of_type(EventType::PurchaseCompleted).len(), 1);
        assert_eq!(store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product_is_configuration_error() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        let err = gw
            .apply_purchase("user_1", &notification("t1", "not_in_catalog"))
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::ConfigurationInvalid(_)));
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_entitlement_status_safe_default() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        let status = gw.entitlement_status("nobody").await;
        assert!(!status.has_active_subscription);
    }

    #[tokio::test]
    async fn test_override_status_refused_in_production() {
        let store = InMemoryEntitlementStore::new();
        let gw = EntitlementGateway::new(
            store.clone(),
            mock_catalog(),
            ExecutionEnvironment::Production,
        );

        let err = gw
            .override_status("user_1", "founders_yearly", SubscriptionStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::ConfigurationInvalid(_)));
    }

    #[tokio::test]
    async fn test_override_status_logged_outside_production() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        let status = gw
            .override_status("user_1", "founders_yearly", SubscriptionStatus::GracePeriod)
            .await
            .unwrap();
        assert_eq!(status.status, SubscriptionStatus::GracePeriod);
        assert!(status.has_active_subscription);
        assert_eq!(store.events_of_type(EventType::StatusChanged).len(), 1);
    }

    #[tokio::test]
    async fn test_track_usage_batch_best_effort() {
        let store = InMemoryEntitlementStore::new();
        let gw = gateway(&store);

        gw.track_usage_batch("user_1", &["a", "b", "a"]).await;
        assert_eq!(store.usage_today("user_1", "a"), 2);
        assert_eq!(store.usage_today("user_1", "b"), 1);
    }
}
