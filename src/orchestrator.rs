//! Purchase orchestration.
//!
//! Turns a "buy this product" intent into exactly one outcome (completed,
//! cancelled, or a classified failure) and never runs two purchase flows
//! concurrently for the same actor. "Request accepted" and "purchase
//! completed" are distinct milestones: the store acknowledges the request
//! quickly, while the real outcome arrives later through the adapter's
//! listener (possibly on a different app launch entirely).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{FallbackPolicy, PurchaseConfig};
use crate::entitlement::{EntitlementGateway, EntitlementStatus, EntitlementStore, EventType};
use crate::error::{Result, TollgateError};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{PurchaseNotification, StoreAdapter, StoreErrorKind, StoreEvent};
use crate::validate::{ReceiptValidator, ValidationRequest};

/// Outcome of a purchase attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// The purchase completed and the entitlement record reflects it.
    Completed { status: EntitlementStatus },
    /// The user dismissed the purchase sheet. Neutral, not an error.
    Cancelled,
    /// Another purchase is already in flight; nothing was dispatched.
    NotStarted,
}

/// Drives the purchase flow end to end.
pub struct PurchaseOrchestrator<S: EntitlementStore, V: ReceiptValidator> {
    adapter: Arc<StoreAdapter>,
    gateway: EntitlementGateway<S>,
    validator: V,
    config: PurchaseConfig,
    // The single mutable shared resource here. Held as a drop guard for the
    // whole attempt so no failure path can leave it locked.
    in_flight: Mutex<()>,
}

impl<S: EntitlementStore, V: ReceiptValidator> PurchaseOrchestrator<S, V> {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(
        adapter: Arc<StoreAdapter>,
        gateway: EntitlementGateway<S>,
        validator: V,
        config: PurchaseConfig,
    ) -> Self {
        Self {
            adapter,
            gateway,
            validator,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Execute a purchase for `product_id`.
    ///
    /// If a purchase is already in flight for this actor the call returns
    /// [`PurchaseOutcome::NotStarted`] immediately rather than queueing, so
    /// rapid double-taps cannot double-charge.
    pub async fn purchase(&self, user_id: &str, product_id: &str) -> Result<PurchaseOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(
                target: "tollgate::purchase",
                product_id = %product_id,
                "Purchase already in flight; not starting another"
            );
            return Ok(PurchaseOutcome::NotStarted);
        };

        if product_id.trim().is_empty() || !self.adapter.catalog().contains(product_id) {
            return Err(TollgateError::ConfigurationInvalid(format!(
                "Unknown product: {}",
                product_id
            )));
        }

        self.ensure_ready().await?;

        self.gateway
            .log_event(
                user_id,
                EventType::PurchaseInitiated,
                serde_json::json!({ "product_id": product_id }),
                None,
            )
            .await;

        // Dispatch. The store acknowledges quickly; the outcome arrives via
        // the listener, so no timeout is applied from here on.
        if let Err(err) = self.adapter.request_purchase(product_id).await {
            self.log_failure(user_id, product_id, &err).await;
            return Err(err);
        }

        loop {
            match self.adapter.next_event().await {
                Some(StoreEvent::Updated(notification)) => {
                    let matches_attempt = notification.product_id == product_id;
                    let result = self.process_notification(user_id, &notification).await;
                    if !matches_attempt {
                        // Out-of-band delivery for some other purchase (e.g.
                        // a late renewal); reconcile it and keep waiting.
                        continue;
                    }
                    return match result {
                        Ok(status) => Ok(PurchaseOutcome::Completed { status }),
                        Err(err) => {
                            self.log_failure(user_id, product_id, &err).await;
                            Err(err)
                        }
                    };
                }
                Some(StoreEvent::Error(store_err)) => {
                    if store_err.kind == StoreErrorKind::UserCancelled {
                        self.gateway
                            .log_event(
                                user_id,
                                EventType::PurchaseFailed,
                                serde_json::json!({
                                    "product_id": product_id,
                                    "reason": "user_cancelled",
                                }),
                                None,
                            )
                            .await;
                        return Ok(PurchaseOutcome::Cancelled);
                    }
                    let err = TollgateError::from(store_err);
                    self.log_failure(user_id, product_id, &err).await;
                    return Err(err);
                }
                None => return Err(TollgateError::PaymentSystemUnavailable),
            }
        }
    }

    /// Process a purchase notification: validate, apply to the durable
    /// record, and finalize the pending store transaction. The finalize
    /// happens exactly once per notification no matter how validation or the
    /// durable write turned out.
    pub async fn process_notification(
        &self,
        user_id: &str,
        notification: &PurchaseNotification,
    ) -> Result<EntitlementStatus> {
        let outcome = self.validate_and_apply(user_id, notification).await;

        if let Err(err) = self
            .adapter
            .finish_transaction(&notification.transaction_id)
            .await
        {
            // A stuck native transaction would resurface on next launch;
            // nothing more to do here than record it.
            tracing::warn!(
                target: "tollgate::purchase",
                transaction_id = %notification.transaction_id,
                error = %err,
                "Transaction finalize failed"
            );
        }

        outcome
    }

    /// Entry point for notifications that arrive independently of any
    /// purchase call (app relaunch, late store delivery).
    pub async fn handle_notification(
        &self,
        user_id: &str,
        notification: &PurchaseNotification,
    ) -> Result<EntitlementStatus> {
        self.process_notification(user_id, notification).await
    }

    /// Reconcile entitlement with the store's record of existing purchases.
    ///
    /// Runs every purchase through the same validate/apply/finalize pipeline;
    /// also the repair path after a durable-write failure.
    pub async fn restore(&self, user_id: &str) -> Result<usize> {
        let _guard = self.in_flight.lock().await;

        self.ensure_ready().await?;

        let policy = RetryPolicy::from_config(&self.config);
        let purchases = with_retry(&policy, "purchase list", || {
            self.adapter.list_purchases()
        })
        .await?;

        let total = purchases.len();
        let mut restored = 0usize;
        for notification in &purchases {
            match self.process_notification(user_id, notification).await {
                Ok(_) => restored += 1,
                Err(err) => {
                    tracing::warn!(
                        target: "tollgate::purchase",
                        transaction_id = %notification.transaction_id,
                        error = %err,
                        "Restore skipped a purchase"
                    );
                }
            }
        }

        self.gateway
            .log_event(
                user_id,
                EventType::RestoreCompleted,
                serde_json::json!({ "restored": restored, "listed": total }),
                None,
            )
            .await;

        Ok(restored)
    }

    /// The gateway this orchestrator writes through.
    #[must_use]
    pub fn gateway(&self) -> &EntitlementGateway<S> {
        &self.gateway
    }

    async fn validate_and_apply(
        &self,
        user_id: &str,
        notification: &PurchaseNotification,
    ) -> Result<EntitlementStatus> {
        let request = ValidationRequest {
            user_id: user_id.to_string(),
            product_id: notification.product_id.clone(),
            transaction_id: notification.transaction_id.clone(),
            receipt_data: notification.receipt_data.clone(),
            environment: notification.environment,
        };

        let accepted = match self.validator.validate(request).await {
            Ok(verdict) => verdict.valid,
            Err(err) => match self.config.validation_fallback {
                FallbackPolicy::Allow => {
                    // Explicit interim policy: a broken validator grants the
                    // benefit of the doubt. Refused in production by config.
                    tracing::warn!(
                        target: "tollgate::purchase",
                        transaction_id = %notification.transaction_id,
                        error = %err,
                        "Validator errored; accepting under allow fallback"
                    );
                    true
                }
                FallbackPolicy::Deny => {
                    tracing::warn!(
                        target: "tollgate::purchase",
                        transaction_id = %notification.transaction_id,
                        error = %err,
                        "Validator errored; rejecting under deny fallback"
                    );
                    false
                }
            },
        };

        if !accepted {
            self.gateway
                .log_event(
                    user_id,
                    EventType::ValidationFailed,
                    serde_json::json!({
                        "product_id": notification.product_id,
                        "environment": notification.environment.as_str(),
                    }),
                    Some(notification.transaction_id.clone()),
                )
                .await;
            return Err(TollgateError::ValidationFailed {
                transaction_id: Some(notification.transaction_id.clone()),
            });
        }

        self.gateway.apply_purchase(user_id, notification).await
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.adapter.status().can_purchase {
            return Ok(());
        }

        // One on-demand initialization retry before giving up.
        tokio::time::sleep(self.config.retry_delay()).await;
        self.adapter.initialize().await?;

        if self.adapter.status().can_purchase {
            Ok(())
        } else {
            Err(TollgateError::PaymentSystemUnavailable)
        }
    }

    async fn log_failure(&self, user_id: &str, product_id: &str, err: &TollgateError) {
        self.gateway
            .log_event(
                user_id,
                EventType::PurchaseFailed,
                serde_json::json!({
                    "product_id": product_id,
                    "error": err.to_string(),
                }),
                None,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock_catalog;
    use crate::config::{ConfigBuilder, ExecutionEnvironment};
    use crate::entitlement::{InMemoryEntitlementStore, SubscriptionStatus};
    use crate::store::{MockStoreClient, StoreEnvironment};
    use crate::validate::{ReceiptVerdict, StructuralValidator};
    use async_trait::async_trait;
    use std::time::Duration;

    type TestOrchestrator = PurchaseOrchestrator<InMemoryEntitlementStore, StructuralValidator>;

    fn test_config() -> PurchaseConfig {
        ConfigBuilder::new()
            .with_environment(ExecutionEnvironment::Development)
            .with_retry_delay_ms(1)
            .with_connection_timeout_ms(100)
            .build()
            .unwrap()
    }

    async fn setup() -> (Arc<TestOrchestrator>, MockStoreClient, InMemoryEntitlementStore) {
        let config = test_config();
        let client = MockStoreClient::new();
        client.set_purchase_delay(Duration::from_millis(5));

        let adapter = Arc::new(StoreAdapter::new(
            Arc::new(client.clone()),
            config.clone(),
            mock_catalog(),
        ));
        adapter.initialize().await.unwrap();

        let store = InMemoryEntitlementStore::new();
        let gateway = EntitlementGateway::new(
            store.clone(),
            mock_catalog(),
            config.execution_environment,
        );
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            adapter,
            gateway,
            StructuralValidator::new(mock_catalog()),
            config,
        ));
        (orchestrator, client, store)
    }

    #[tokio::test]
    async fn test_purchase_happy_path() {
        let (orchestrator, client, store) = setup().await;

        let outcome = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap();

        match outcome {
            PurchaseOutcome::Completed { status } => {
                assert!(status.has_active_subscription);
                assert_eq!(status.status, SubscriptionStatus::Trial);
            }
            other => panic!("expected completion, got {:?}", other),
        }

        // Exactly one completion event and one finalized transaction.
        assert_eq!(store.events_of_type(EventType::PurchaseCompleted).len(), 1);
        assert_eq!(client.finished_transactions().len(), 1);
        assert_eq!(store.events_of_type(EventType::PurchaseInitiated).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product_rejected_before_dispatch() {
        let (orchestrator, client, _store) = setup().await;

        let err = orchestrator
            .purchase("user_1", "not_in_catalog")
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::ConfigurationInvalid(_)));
        assert!(client.requested_purchases().is_empty());

        let err = orchestrator.purchase("user_1", "  ").await.unwrap_err();
        assert!(matches!(err, TollgateError::ConfigurationInvalid(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_flight_rejects_concurrent_purchase() {
        let (orchestrator, _client, _store) = setup().await;

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.purchase("user_1", "founders_yearly").await })
        };
        // Give the first call time to take the lock and dispatch.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = orchestrator.purchase("user_1", "founders_yearly").await.unwrap();

        assert_eq!(second, PurchaseOutcome::NotStarted);
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, PurchaseOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_releases_lock_for_next_attempt() {
        let (orchestrator, client, store) = setup().await;

        client.fail_next_purchase(StoreErrorKind::UserCancelled);
        let outcome = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap();
        assert_eq!(outcome, PurchaseOutcome::Cancelled);
        assert!(store.events_of_type(EventType::PurchaseCompleted).is_empty());

        // The single-flight lock was released; the next attempt succeeds.
        let outcome = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_classified_and_logged() {
        let (orchestrator, client, store) = setup().await;
        client.fail_next_purchase(StoreErrorKind::ProductUnavailable);

        let err = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::ProductUnavailable(_)));
        assert_eq!(store.events_of_type(EventType::PurchaseFailed).len(), 1);

        // Unrecognized kinds fold into the retryable catch-all.
        let (orchestrator, client, _store) = setup().await;
        client.fail_next_purchase(StoreErrorKind::Unknown);
        let err = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Unknown(_)));
        assert!(err.is_retryable());
    }

    /// Validator that always errors, for fallback-policy tests.
    struct ErroringValidator;

    #[async_trait]
    impl ReceiptValidator for ErroringValidator {
        async fn validate(&self, _request: ValidationRequest) -> crate::error::Result<ReceiptVerdict> {
            Err(TollgateError::Unknown("verifier offline".to_string()))
        }
    }

    async fn setup_with_validator(
        fallback: FallbackPolicy,
    ) -> (
        Arc<PurchaseOrchestrator<InMemoryEntitlementStore, ErroringValidator>>,
        MockStoreClient,
        InMemoryEntitlementStore,
    ) {
        let config = ConfigBuilder::new()
            .with_environment(ExecutionEnvironment::Development)
            .with_retry_delay_ms(1)
            .with_validation_fallback(fallback)
            .build()
            .unwrap();
        let client = MockStoreClient::new();
        client.set_purchase_delay(Duration::from_millis(5));

        let adapter = Arc::new(StoreAdapter::new(
            Arc::new(client.clone()),
            config.clone(),
            mock_catalog(),
        ));
        adapter.initialize().await.unwrap();

        let store = InMemoryEntitlementStore::new();
        let gateway = EntitlementGateway::new(
            store.clone(),
            mock_catalog(),
            config.execution_environment,
        );
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            adapter,
            gateway,
            ErroringValidator,
            config,
        ));
        (orchestrator, client, store)
    }

    #[tokio::test]
    async fn test_validator_error_denied_by_default_policy() {
        let (orchestrator, client, store) = setup_with_validator(FallbackPolicy::Deny).await;

        let err = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::ValidationFailed { .. }));
        assert_eq!(store.events_of_type(EventType::ValidationFailed).len(), 1);
        assert_eq!(store.subscription_count(), 0);
        // The pending transaction is still finalized.
        assert_eq!(client.finished_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_validator_error_accepted_under_allow_policy() {
        let (orchestrator, client, store) = setup_with_validator(FallbackPolicy::Allow).await;

        let outcome = orchestrator
            .purchase("user_1", "founders_yearly")
            .await
            .unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Completed { .. }));
        assert_eq!(store.subscription_count(), 1);
        assert_eq!(client.finished_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_reprocesses_listed_purchases() {
        let (orchestrator, client, store) = setup().await;

        client.seed_restorable(vec![
            PurchaseNotification {
                transaction_id: "t_restore_1".to_string(),
                original_transaction_id: Some("t_restore_1".to_string()),
                product_id: "founders_monthly".to_string(),
                purchase_date: crate::utils::epoch_secs(),
                receipt_data: "r".to_string(),
                environment: StoreEnvironment::Sandbox,
            },
        ]);

        let restored = orchestrator.restore("user_1").await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(store.events_of_type(EventType::RestoreCompleted).len(), 1);
        assert!(store
            .get_entitlement_status("user_1")
            .await
            .unwrap()
            .has_active_subscription);

        // Restoring again is harmless: the duplicate transaction is absorbed.
        let restored = orchestrator.restore("user_1").await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(store.events_of_type(EventType::PurchaseCompleted).len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_band_notification_applies() {
        let (orchestrator, _client, store) = setup().await;

        let notification = MockStoreClient::synthesize_notification("founders_yearly");
        let status = orchestrator
            .handle_notification("user_1", &notification)
            .await
            .unwrap();
        assert!(status.has_active_subscription);
        assert_eq!(store.events_of_type(EventType::PurchaseCompleted).len(), 1);
    }
}
