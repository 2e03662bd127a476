//! The seam to the platform purchase store.
//!
//! The crate never embeds store-specific business logic; a [`StoreClient`]
//! implementation maps the store's callback shapes into
//! [`PurchaseNotification`] and typed [`StoreClientError`] values. Purchase
//! results arrive asynchronously through the registered listener, not as
//! return values of [`StoreClient::request_purchase`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::catalog::Product;
use crate::error::TollgateError;

/// Which store environment issued a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEnvironment {
    /// Sandbox / test receipts.
    Sandbox,
    /// Production receipts.
    Production,
}

impl StoreEnvironment {
    /// Convert to string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for StoreEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An asynchronous purchase notification from the store.
///
/// May arrive in response to a purchase request, on app relaunch, or during
/// a restore pass; may be duplicated or delayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseNotification {
    /// Unique identifier for this purchase event.
    pub transaction_id: String,
    /// Links renewals back to the first purchase (equals
    /// `transaction_id` on an original purchase).
    pub original_transaction_id: Option<String>,
    /// The purchased product.
    pub product_id: String,
    /// Purchase time (Unix timestamp).
    pub purchase_date: u64,
    /// Opaque proof-of-purchase payload issued by the store.
    pub receipt_data: String,
    /// Which store environment issued the receipt.
    pub environment: StoreEnvironment,
}

impl PurchaseNotification {
    /// Whether this notification is a renewal of an earlier purchase.
    #[must_use]
    pub fn is_renewal(&self) -> bool {
        self.original_transaction_id
            .as_deref()
            .map(|original| original != self.transaction_id)
            .unwrap_or(false)
    }
}

/// Classified store failure kinds.
///
/// Classification happens at the originating call site; nothing downstream
/// inspects message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The user dismissed the purchase sheet.
    UserCancelled,
    /// The product cannot be sold right now.
    ProductUnavailable,
    /// The store did not respond in time.
    NetworkTimeout,
    /// No connection to the store.
    NotConnected,
    /// Malformed product identifier or store configuration.
    ConfigurationInvalid,
    /// Anything the client could not classify.
    Unknown,
}

/// Typed error from a store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreClientError {
    /// Classified failure kind.
    pub kind: StoreErrorKind,
    /// Human-oriented detail, for logs only.
    pub message: String,
}

impl StoreClientError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The user dismissed the purchase sheet.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(StoreErrorKind::UserCancelled, "purchase sheet dismissed")
    }

    /// No connection to the store.
    #[must_use]
    pub fn not_connected() -> Self {
        Self::new(StoreErrorKind::NotConnected, "store connection not open")
    }
}

impl std::fmt::Display for StoreClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for StoreClientError {}

impl From<StoreClientError> for TollgateError {
    fn from(err: StoreClientError) -> Self {
        match err.kind {
            StoreErrorKind::UserCancelled => TollgateError::UserCancelled,
            StoreErrorKind::ProductUnavailable => TollgateError::ProductUnavailable(err.message),
            StoreErrorKind::NetworkTimeout => TollgateError::ConnectionTimeout {
                operation: err.message,
            },
            StoreErrorKind::NotConnected => TollgateError::PaymentSystemUnavailable,
            StoreErrorKind::ConfigurationInvalid => {
                TollgateError::ConfigurationInvalid(err.message)
            }
            StoreErrorKind::Unknown => TollgateError::Unknown(err.message),
        }
    }
}

/// Result type for store client operations.
pub type StoreResult<T> = std::result::Result<T, StoreClientError>;

/// Listener channels registered with the store on connect.
///
/// One purchase-updated sender and one purchase-error sender, registered
/// exactly once per successful connection and dropped on cleanup.
#[derive(Debug, Clone)]
pub struct StoreListener {
    /// Receives asynchronous purchase notifications.
    pub purchase_updates: mpsc::UnboundedSender<PurchaseNotification>,
    /// Receives asynchronous purchase errors (including cancellation).
    pub purchase_errors: mpsc::UnboundedSender<StoreClientError>,
}

/// Connection to the platform purchase store.
///
/// Implement this trait to integrate a real store SDK. A simulating
/// implementation is provided in [`crate::store::MockStoreClient`].
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Open the connection and register the listener callbacks.
    async fn connect(&self, listener: StoreListener) -> StoreResult<()>;

    /// Close the connection and unregister callbacks.
    async fn disconnect(&self) -> StoreResult<()>;

    /// Fetch catalog metadata for the given product identifiers.
    async fn load_products(&self, ids: &[String]) -> StoreResult<Vec<Product>>;

    /// Ask the store to begin a purchase. Returns once the request is
    /// accepted; the outcome arrives later through the listener.
    async fn request_purchase(&self, product_id: &str) -> StoreResult<()>;

    /// List existing purchases for the signed-in store account (restore).
    async fn list_purchases(&self) -> StoreResult<Vec<PurchaseNotification>>;

    /// Finalize a pending store transaction.
    async fn finish_transaction(&self, transaction_id: &str) -> StoreResult<()>;
}
