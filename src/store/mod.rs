//! Platform purchase store integration.
//!
//! [`client::StoreClient`] is the seam to the real store SDK;
//! [`adapter::StoreAdapter`] owns the process-lifetime connection and
//! lifecycle; [`mock::MockStoreClient`] simulates the store wherever the
//! real one is unreachable.

pub mod adapter;
pub mod client;
pub mod mock;

pub use adapter::{AdapterState, StoreAdapter, StoreEvent, StoreStatus};
pub use client::{
    PurchaseNotification, StoreClient, StoreClientError, StoreEnvironment, StoreErrorKind,
    StoreListener, StoreResult,
};
pub use mock::MockStoreClient;
