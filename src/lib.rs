//! Tollgate - purchase and entitlement reconciliation for subscription apps
//!
//! Tollgate turns asynchronous, possibly-duplicated, possibly-delayed
//! purchase notifications from a platform store into idempotent, durable
//! entitlement updates, and serves the rest of the application a cached,
//! crash-proof view of "does this user have paid access right now".
//!
//! # Features
//!
//! - **Store adapter**: one process-lifetime connection with an explicit
//!   lifecycle, listener registration, and soft/hard failure by environment
//! - **Purchase orchestration**: single-flight execution, readiness checks,
//!   a closed error taxonomy, and exactly-once transaction finalization
//! - **Receipt validation**: pluggable strategies behind a stable contract,
//!   from structural checks to HMAC-signed receipts
//! - **Entitlement gateway**: idempotent durable upserts keyed by
//!   transaction id, feature gating, usage limits, and an append-only event
//!   log
//! - **Status cache**: TTL-cached client view with read-after-write
//!   confirmation and an edge-triggered activation signal
//! - **Mock mode**: a simulated store for sandboxed hosts and tests
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tollgate::{
//!     catalog::mock_catalog,
//!     config::ConfigBuilder,
//!     entitlement::{EntitlementGateway, InMemoryEntitlementStore},
//!     orchestrator::PurchaseOrchestrator,
//!     store::{MockStoreClient, StoreAdapter},
//!     validate::StructuralValidator,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tollgate::Result<()> {
//!     tollgate::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().with_mock_mode(true).build()?;
//!     let catalog = mock_catalog();
//!
//!     let adapter = Arc::new(StoreAdapter::from_config(
//!         Arc::new(MockStoreClient::new()),
//!         config.clone(),
//!         catalog.clone(),
//!     ));
//!     adapter.initialize().await?;
//!
//!     let store = InMemoryEntitlementStore::new();
//!     let gateway =
//!         EntitlementGateway::new(store, catalog.clone(), config.execution_environment);
//!     let orchestrator = PurchaseOrchestrator::new(
//!         adapter,
//!         gateway,
//!         StructuralValidator::new(catalog),
//!         config,
//!     );
//!
//!     let outcome = orchestrator.purchase("user_1", "founders_yearly").await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod entitlement;
mod error;
pub mod orchestrator;
pub mod retry;
pub mod status;
pub mod store;
pub mod utils;
pub mod validate;

// Re-exports for public API
pub use catalog::{BillingInterval, Catalog, CatalogBuilder, Product};
pub use config::{ConfigBuilder, ExecutionEnvironment, FallbackPolicy, PurchaseConfig};
pub use entitlement::{
    EntitlementGateway, EntitlementStatus, EntitlementStore, EventType, FeatureAccess,
    FeatureGate, FeatureSet, InMemoryEntitlementStore, SubscriptionEvent, SubscriptionRecord,
    SubscriptionStatus,
};
pub use error::{Result, TollgateError};
pub use orchestrator::{PurchaseOrchestrator, PurchaseOutcome};
pub use retry::RetryPolicy;
pub use status::StatusCache;
pub use store::{
    MockStoreClient, PurchaseNotification, StoreAdapter, StoreClient, StoreClientError,
    StoreEnvironment, StoreErrorKind, StoreEvent, StoreListener, StoreStatus,
};
pub use validate::{
    ReceiptValidator, ReceiptVerdict, SignedReceiptValidator, StructuralValidator,
    ValidationRequest,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, before constructing the
/// store adapter.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "tollgate=debug")
/// - `TOLLGATE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TOLLGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &PurchaseConfig) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
