//! Store client adapter.
//!
//! Owns exactly one logical connection to the platform purchase store for
//! the process lifetime: explicit lifecycle (`create → initialize → ready →
//! cleanup`), listener registration, environment-driven mock short-circuit,
//! and the timeout/fallback behavior around connect and catalog calls.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};

use crate::catalog::{mock_catalog, Catalog, Product};
use crate::config::{ExecutionEnvironment, PurchaseConfig};
use crate::error::{Result, TollgateError};
use crate::retry::with_timeout;

use super::client::{
    PurchaseNotification, StoreClient, StoreClientError, StoreListener,
};
use super::mock::MockStoreClient;

/// Adapter lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Never initialized (or cleaned up).
    Uninitialized,
    /// An initialization is in flight.
    Initializing,
    /// Connected; purchases can be attempted.
    Ready,
    /// Initialization failed softly; purchases are unavailable.
    Unavailable,
}

/// Read-only adapter snapshot used by callers to decide whether to attempt
/// a purchase or show a "temporarily unavailable" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub is_initialized: bool,
    pub configuration_valid: bool,
    pub can_purchase: bool,
    pub environment: ExecutionEnvironment,
}

/// An event delivered through the adapter's registered listeners.
#[derive(Debug)]
pub enum StoreEvent {
    /// A purchase notification arrived.
    Updated(PurchaseNotification),
    /// A purchase error arrived (including user cancellation).
    Error(StoreClientError),
}

struct EventChannels {
    updates: mpsc::UnboundedReceiver<PurchaseNotification>,
    errors: mpsc::UnboundedReceiver<StoreClientError>,
}

struct Lifecycle {
    state: AdapterState,
    configuration_valid: bool,
}

struct CachedProducts {
    products: Vec<Product>,
    loaded_at: Instant,
}

/// Owns the connection to the platform purchase store.
pub struct StoreAdapter {
    client: Arc<dyn StoreClient>,
    config: PurchaseConfig,
    catalog: Catalog,
    lifecycle: RwLock<Lifecycle>,
    events: Mutex<Option<EventChannels>>,
    products: RwLock<Option<CachedProducts>>,
}

impl StoreAdapter {
    /// Create an adapter over the given client.
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, config: PurchaseConfig, catalog: Catalog) -> Self {
        let configuration_valid = catalog.is_well_formed();
        Self {
            client,
            config,
            catalog,
            lifecycle: RwLock::new(Lifecycle {
                state: AdapterState::Uninitialized,
                configuration_valid,
            }),
            events: Mutex::new(None),
            products: RwLock::new(None),
        }
    }

    /// Create an adapter, short-circuiting into a simulated client when the
    /// injected configuration says the real store is unreachable
    /// (`mock_mode` or a sandboxed execution host).
    #[must_use]
    pub fn from_config(
        real_client: Arc<dyn StoreClient>,
        config: PurchaseConfig,
        catalog: Catalog,
    ) -> Self {
        let client: Arc<dyn StoreClient> = if config.use_mock_store() {
            tracing::info!(
                target: "tollgate::store",
                environment = %config.execution_environment,
                "Using simulated store client"
            );
            Arc::new(MockStoreClient::new())
        } else {
            real_client
        };
        Self::new(client, config, catalog)
    }

    /// Initialize the store connection. Idempotent: a second call while
    /// already initialized, or while an initialization is in flight, is a
    /// no-op.
    ///
    /// On timeout or connection error the adapter fails softly in a
    /// production-like environment (marks itself unavailable, returns Ok)
    /// and fails hard in development.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write().unwrap();
            match lifecycle.state {
                AdapterState::Ready | AdapterState::Initializing => return Ok(()),
                AdapterState::Uninitialized | AdapterState::Unavailable => {
                    lifecycle.state = AdapterState::Initializing;
                }
            }
        }

        let result = self.try_connect().await;

        match result {
            Ok(channels) => {
                *self.events.lock().await = Some(channels);
                self.lifecycle.write().unwrap().state = AdapterState::Ready;
                tracing::info!(target: "tollgate::store", "Store connection ready");
                Ok(())
            }
            Err(err) => {
                self.lifecycle.write().unwrap().state = AdapterState::Unavailable;
                if self.config.is_development() {
                    Err(err)
                } else {
                    tracing::warn!(
                        target: "tollgate::store",
                        error = %err,
                        "Store initialization failed; continuing without purchase capability"
                    );
                    Ok(())
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<EventChannels> {
        if !self.lifecycle.read().unwrap().configuration_valid {
            return Err(TollgateError::ConfigurationInvalid(
                "Product catalog is empty or malformed".to_string(),
            ));
        }

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let listener = StoreListener {
            purchase_updates: update_tx,
            purchase_errors: error_tx,
        };

        with_timeout(
            "store connect",
            self.config.connection_timeout(),
            async {
                self.client
                    .connect(listener)
                    .await
                    .map_err(TollgateError::from)
            },
        )
        .await?;

        Ok(EventChannels {
            updates: update_rx,
            errors: error_rx,
        })
    }

    /// Fetch catalog metadata for the given product identifiers.
    ///
    /// Timeout-wrapped; on failure falls back to the static mock catalog so
    /// the UI is never left with no purchasable items. Results are cached
    /// for the configured TTL.
    pub async fn load_products(&self, ids: &[String]) -> Vec<Product> {
        if let Some(cached) = self.cached_products() {
            return cached;
        }

        let loaded = with_timeout(
            "product load",
            self.config.connection_timeout(),
            async {
                self.client
                    .load_products(ids)
                    .await
                    .map_err(TollgateError::from)
            },
        )
        .await;

        let products = match loaded {
            Ok(products) if !products.is_empty() => products,
            Ok(_) => {
                tracing::warn!(
                    target: "tollgate::store",
                    "Store returned no products; serving static catalog"
                );
                fallback_products(ids)
            }
            Err(err) => {
                tracing::warn!(
                    target: "tollgate::store",
                    error = %err,
                    "Product load failed; serving static catalog"
                );
                fallback_products(ids)
            }
        };

        *self.products.write().unwrap() = Some(CachedProducts {
            products: products.clone(),
            loaded_at: Instant::now(),
        });
        products
    }

    fn cached_products(&self) -> Option<Vec<Product>> {
        let cache = self.products.read().unwrap();
        cache.as_ref().and_then(|entry| {
            if entry.loaded_at.elapsed() < self.config.catalog_cache_ttl() {
                Some(entry.products.clone())
            } else {
                None
            }
        })
    }

    /// Ask the store to begin a purchase. The outcome arrives later through
    /// [`StoreAdapter::next_event`]. Deliberately not timeout-wrapped: the
    /// native purchase interaction has no fixed upper bound.
    pub async fn request_purchase(&self, product_id: &str) -> Result<()> {
        if !self.status().can_purchase {
            return Err(TollgateError::PaymentSystemUnavailable);
        }
        self.client
            .request_purchase(product_id)
            .await
            .map_err(TollgateError::from)
    }

    /// List existing purchases for restore, timeout-wrapped.
    pub async fn list_purchases(&self) -> Result<Vec<PurchaseNotification>> {
        if !self.status().can_purchase {
            return Err(TollgateError::PaymentSystemUnavailable);
        }
        with_timeout(
            "purchase list",
            self.config.connection_timeout(),
            async {
                self.client
                    .list_purchases()
                    .await
                    .map_err(TollgateError::from)
            },
        )
        .await
    }

    /// Finalize a pending store transaction.
    pub async fn finish_transaction(&self, transaction_id: &str) -> Result<()> {
        self.client
            .finish_transaction(transaction_id)
            .await
            .map_err(TollgateError::from)
    }

    /// Wait for the next listener event. Returns `None` when no listener is
    /// registered or the store dropped its side of the channels.
    pub async fn next_event(&self) -> Option<StoreEvent> {
        let mut guard = self.events.lock().await;
        let channels = guard.as_mut()?;
        tokio::select! {
            update = channels.updates.recv() => update.map(StoreEvent::Updated),
            error = channels.errors.recv() => error.map(StoreEvent::Error),
        }
    }

    /// Read-only status snapshot.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        let lifecycle = self.lifecycle.read().unwrap();
        StoreStatus {
            is_initialized: lifecycle.state == AdapterState::Ready,
            configuration_valid: lifecycle.configuration_valid,
            can_purchase: lifecycle.state == AdapterState::Ready && lifecycle.configuration_valid,
            environment: self.config.execution_environment,
        }
    }

    /// The configured product catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Unregister listeners and close the connection. Safe to call even if
    /// `initialize` never completed.
    pub async fn cleanup(&self) {
        *self.events.lock().await = None;
        if let Err(err) = self.client.disconnect().await {
            tracing::debug!(
                target: "tollgate::store",
                error = %err,
                "Store disconnect failed during cleanup"
            );
        }
        self.lifecycle.write().unwrap().state = AdapterState::Uninitialized;
    }
}

/// Static catalog entries for the requested ids (all of them when the ids
/// are unknown, so the storefront still has something to show).
fn fallback_products(ids: &[String]) -> Vec<Product> {
    let catalog = mock_catalog();
    let matched: Vec<Product> = ids
        .iter()
        .filter_map(|id| catalog.get(id).cloned())
        .collect();
    if matched.is_empty() {
        catalog.iter().map(|(_, p)| p.clone()).collect()
    } else {
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::store::client::StoreErrorKind;
    use std::time::Duration;

    fn dev_config() -> PurchaseConfig {
        ConfigBuilder::new()
            .with_environment(ExecutionEnvironment::Development)
            .with_connection_timeout_ms(50)
            .build()
            .unwrap()
    }

    fn prod_config() -> PurchaseConfig {
        ConfigBuilder::new()
            .with_environment(ExecutionEnvironment::Production)
            .with_connection_timeout_ms(50)
            .build()
            .unwrap()
    }

    fn adapter_with(client: &MockStoreClient, config: PurchaseConfig) -> StoreAdapter {
        StoreAdapter::new(Arc::new(client.clone()), config, mock_catalog())
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());

        adapter.initialize().await.unwrap();
        assert!(adapter.status().is_initialized);

        // Second call is a no-op, not a reconnect.
        adapter.initialize().await.unwrap();
        assert!(adapter.status().can_purchase);
    }

    #[tokio::test]
    async fn test_connect_timeout_fails_softly_in_production() {
        let client = MockStoreClient::new();
        client.set_connect_delay(Duration::from_secs(10));
        let adapter = adapter_with(&client, prod_config());

        // No error escapes initialize in a production-like environment.
        adapter.initialize().await.unwrap();

        let status = adapter.status();
        assert!(!status.can_purchase);
        assert!(!status.is_initialized);
        assert!(status.configuration_valid);
    }

    #[tokio::test]
    async fn test_connect_timeout_fails_hard_in_development() {
        let client = MockStoreClient::new();
        client.set_connect_delay(Duration::from_secs(10));
        let adapter = adapter_with(&client, dev_config());

        let err = adapter.initialize().await.unwrap_err();
        assert!(matches!(err, TollgateError::ConnectionTimeout { .. }));
        assert!(!adapter.status().can_purchase);
    }

    #[tokio::test]
    async fn test_connect_error_fails_hard_in_development() {
        let client = MockStoreClient::new();
        client.fail_connect(StoreErrorKind::ConfigurationInvalid);
        let adapter = adapter_with(&client, dev_config());

        let err = adapter.initialize().await.unwrap_err();
        assert!(matches!(err, TollgateError::ConfigurationInvalid(_)));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_invalid_configuration() {
        let client = MockStoreClient::new();
        let adapter = StoreAdapter::new(
            Arc::new(client.clone()),
            prod_config(),
            Catalog::new(),
        );

        adapter.initialize().await.unwrap(); // soft in production
        let status = adapter.status();
        assert!(!status.configuration_valid);
        assert!(!status.can_purchase);
    }

    #[tokio::test]
    async fn test_load_products_falls_back_to_static_catalog() {
        let client = MockStoreClient::new();
        client.fail_next_load();
        let adapter = adapter_with(&client, prod_config());
        adapter.initialize().await.unwrap();

        let products = adapter
            .load_products(&["founders_yearly".to_string()])
            .await;
        assert!(!products.is_empty());
        assert!(products.iter().any(|p| p.id == "founders_yearly"));
    }

    #[tokio::test]
    async fn test_load_products_cached_within_ttl() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());
        adapter.initialize().await.unwrap();

        let ids = vec!["founders_monthly".to_string()];
        let first = adapter.load_products(&ids).await;

        // A scripted failure would surface if the second call hit the
        // client; the TTL cache absorbs it instead.
        client.fail_next_load();
        let second = adapter.load_products(&ids).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_request_purchase_requires_ready() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());

        let err = adapter.request_purchase("founders_yearly").await.unwrap_err();
        assert_eq!(err, TollgateError::PaymentSystemUnavailable);
    }

    #[tokio::test]
    async fn test_cleanup_safe_without_initialize() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());
        adapter.cleanup().await;
        assert_eq!(
            adapter.status(),
            StoreStatus {
                is_initialized: false,
                configuration_valid: true,
                can_purchase: false,
                environment: ExecutionEnvironment::Development,
            }
        );
    }

    #[tokio::test]
    async fn test_cleanup_unregisters_listener() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());
        adapter.initialize().await.unwrap();
        assert!(client.has_listener());

        adapter.cleanup().await;
        assert!(!client.has_listener());
        assert!(!adapter.status().is_initialized);
    }

    #[tokio::test]
    async fn test_from_config_short_circuits_to_mock() {
        let real = MockStoreClient::new();
        real.fail_connect(StoreErrorKind::Unknown);

        let config = ConfigBuilder::new()
            .with_mock_mode(true)
            .build()
            .unwrap();
        let adapter = StoreAdapter::from_config(
            Arc::new(real.clone()),
            config,
            mock_catalog(),
        );

        // The scripted failure on the real client never fires because the
        // adapter swapped in a simulated client.
        adapter.initialize().await.unwrap();
        assert!(adapter.status().can_purchase);
        assert!(!real.has_listener());
    }

    #[tokio::test]
    async fn test_next_event_none_before_initialize() {
        let client = MockStoreClient::new();
        let adapter = adapter_with(&client, dev_config());
        assert!(adapter.next_event().await.is_none());
    }
}
