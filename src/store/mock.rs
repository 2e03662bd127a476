//! Simulated store client.
//!
//! Used wherever the real platform store is unreachable: sandboxed execution
//! hosts, `mock_mode` configuration, and tests. Purchases are synthesized
//! after a short artificial delay so UI behavior (spinners, transitions)
//! stays representative of the real flow.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::catalog::{mock_catalog, Product};
use crate::utils::epoch_secs;

use super::client::{
    PurchaseNotification, StoreClient, StoreClientError, StoreEnvironment, StoreErrorKind,
    StoreListener, StoreResult,
};

/// Delay before a synthesized purchase notification is delivered.
const MOCK_PURCHASE_DELAY: Duration = Duration::from_millis(150);

/// Simulated store client.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// scripting failures and inspecting recorded calls while the adapter owns
/// another.
#[derive(Clone, Default)]
pub struct MockStoreClient {
    inner: Arc<RwLock<MockState>>,
}

#[derive(Default)]
struct MockState {
    listener: Option<StoreListener>,
    connected: bool,
    connect_delay: Option<Duration>,
    fail_connect: Option<StoreErrorKind>,
    fail_next_load: bool,
    next_purchase_error: Option<StoreErrorKind>,
    purchase_delay: Option<Duration>,
    restorable: Vec<PurchaseNotification>,
    requested: Vec<String>,
    finished: Vec<String>,
}

impl MockStoreClient {
    /// Create a new mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` call sleep for `delay` before completing.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner.write().unwrap().connect_delay = Some(delay);
    }

    /// Make `connect` fail with the given kind.
    pub fn fail_connect(&self, kind: StoreErrorKind) {
        self.inner.write().unwrap().fail_connect = Some(kind);
    }

    /// Make the next `load_products` call fail.
    pub fn fail_next_load(&self) {
        self.inner.write().unwrap().fail_next_load = true;
    }

    /// Make the next purchase emit an error event instead of a notification.
    pub fn fail_next_purchase(&self, kind: StoreErrorKind) {
        self.inner.write().unwrap().next_purchase_error = Some(kind);
    }

    /// Override the artificial purchase delay (tests use zero).
    pub fn set_purchase_delay(&self, delay: Duration) {
        self.inner.write().unwrap().purchase_delay = Some(delay);
    }

    /// Seed purchases returned by `list_purchases` (restore).
    pub fn seed_restorable(&self, purchases: Vec<PurchaseNotification>) {
        self.inner.write().unwrap().restorable = purchases;
    }

    /// Deliver a notification through the registered listener, as if it
    /// arrived out of band.
    pub fn emit_notification(&self, notification: PurchaseNotification) {
        let state = self.inner.read().unwrap();
        if let Some(listener) = &state.listener {
            let _ = listener.purchase_updates.send(notification);
        }
    }

    /// Product ids passed to `request_purchase`, in order.
    #[must_use]
    pub fn requested_purchases(&self) -> Vec<String> {
        self.inner.read().unwrap().requested.clone()
    }

    /// Transaction ids passed to `finish_transaction`, in order.
    #[must_use]
    pub fn finished_transactions(&self) -> Vec<String> {
        self.inner.read().unwrap().finished.clone()
    }

    /// Whether a listener is currently registered.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.inner.read().unwrap().listener.is_some()
    }

    /// Build the notification a purchase of `product_id` would synthesize.
    #[must_use]
    pub fn synthesize_notification(product_id: &str) -> PurchaseNotification {
        let transaction_id = format!("mock_txn_{}", uuid::Uuid::new_v4());
        PurchaseNotification {
            original_transaction_id: Some(transaction_id.clone()),
            transaction_id,
            product_id: product_id.to_string(),
            purchase_date: epoch_secs(),
            receipt_data: format!("mock_receipt_{}", uuid::Uuid::new_v4()),
            environment: StoreEnvironment::Sandbox,
        }
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn connect(&self, listener: StoreListener) -> StoreResult<()> {
        let (delay, failure) = {
            let state = self.inner.read().unwrap();
            (state.connect_delay, state.fail_connect)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(kind) = failure {
            return Err(StoreClientError::new(kind, "simulated connect failure"));
        }

        let mut state = self.inner.write().unwrap();
        state.listener = Some(listener);
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        let mut state = self.inner.write().unwrap();
        state.listener = None;
        state.connected = false;
        Ok(())
    }

    async fn load_products(&self, ids: &[String]) -> StoreResult<Vec<Product>> {
        {
            let mut state = self.inner.write().unwrap();
            if state.fail_next_load {
                state.fail_next_load = false;
                return Err(StoreClientError::new(
                    StoreErrorKind::NetworkTimeout,
                    "simulated catalog failure",
                ));
            }
        }

        let catalog = mock_catalog();
        Ok(ids
            .iter()
            .filter_map(|id| catalog.get(id).cloned())
            .collect())
    }

    async fn request_purchase(&self, product_id: &str) -> StoreResult<()> {
        let (listener, scripted_error, delay) = {
            let mut state = self.inner.write().unwrap();
            if !state.connected {
                return Err(StoreClientError::not_connected());
            }
            state.requested.push(product_id.to_string());
            (
                state.listener.clone(),
                state.next_purchase_error.take(),
                state.purchase_delay.unwrap_or(MOCK_PURCHASE_DELAY),
            )
        };

        let listener = listener.ok_or_else(StoreClientError::not_connected)?;
        let notification = Self::synthesize_notification(product_id);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match scripted_error {
                Some(StoreErrorKind::UserCancelled) => {
                    let _ = listener.purchase_errors.send(StoreClientError::cancelled());
                }
                Some(kind) => {
                    let _ = listener
                        .purchase_errors
                        .send(StoreClientError::new(kind, "simulated purchase failure"));
                }
                None => {
                    let _ = listener.purchase_updates.send(notification);
                }
            }
        });

        Ok(())
    }

    async fn list_purchases(&self) -> StoreResult<Vec<PurchaseNotification>> {
        Ok(self.inner.read().unwrap().restorable.clone())
    }

    async fn finish_transaction(&self, transaction_id: &str) -> StoreResult<()> {
        self.inner
            .write()
            .unwrap()
            .finished
            .push(transaction_id.to_string());
        Ok(())
    }
}
