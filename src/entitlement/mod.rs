//! Durable entitlement state: records, the store contract, feature gates,
//! and the gateway that owns all mutation.

pub mod features;
pub mod gateway;
pub mod records;
pub mod store;

pub use features::{FeatureGate, FeatureSet, FeatureSetBuilder};
pub use gateway::EntitlementGateway;
pub use records::{
    EntitlementStatus, EventType, FeatureAccess, FeatureUsage, SubscriptionEvent,
    SubscriptionRecord, SubscriptionStatus,
};
pub use store::{EntitlementStore, InMemoryEntitlementStore};
