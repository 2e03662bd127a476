//! Client-side entitlement view.
//!
//! A debounced, locally cached view of one user's entitlement. Reads inside
//! the TTL are served from cache; everything else refreshes through the
//! gateway. Consumers that navigate away from a purchase prompt subscribe to
//! the activation edge, which fires once per not-active → active transition
//! rather than on every refresh that happens to report "active".

use std::sync::RwLock;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::entitlement::{EntitlementGateway, EntitlementStatus, EntitlementStore};

/// Cached view of one user's entitlement.
pub struct StatusCache<S: EntitlementStore> {
    gateway: EntitlementGateway<S>,
    user_id: String,
    ttl: Duration,
    inner: RwLock<CacheState>,
    activation: watch::Sender<EntitlementStatus>,
}

struct CacheState {
    snapshot: Option<EntitlementStatus>,
    fetched_at: Option<Instant>,
    loading: bool,
    error: bool,
}

impl<S: EntitlementStore> StatusCache<S> {
    /// Create a cache for one user with the given TTL.
    #[must_use]
    pub fn new(gateway: EntitlementGateway<S>, user_id: impl Into<String>, ttl: Duration) -> Self {
        let (activation, _) = watch::channel(EntitlementStatus::inactive());
        Self {
            gateway,
            user_id: user_id.into(),
            ttl,
            inner: RwLock::new(CacheState {
                snapshot: None,
                fetched_at: None,
                loading: false,
                error: false,
            }),
            activation,
        }
    }

    /// Current entitlement, served from cache while it is fresh.
    pub async fn current(&self) -> EntitlementStatus {
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }
        self.refresh().await
    }

    /// Force a refresh through the gateway, updating the cache and firing
    /// the activation edge when the state transitions to active.
    pub async fn refresh(&self) -> EntitlementStatus {
        {
            let mut state = self.inner.write().unwrap();
            state.loading = true;
        }

        let (status, errored) = match self.gateway.try_entitlement_status(&self.user_id).await {
            Ok(status) => (status, false),
            Err(err) => {
                tracing::warn!(
                    target: "tollgate::status",
                    user_id = %self.user_id,
                    error = %err,
                    "Status refresh failed; keeping last known state"
                );
                let last = self
                    .inner
                    .read()
                    .unwrap()
                    .snapshot
                    .clone()
                    .unwrap_or_else(EntitlementStatus::inactive);
                (last, true)
            }
        };

        let was_active = {
            let state = self.inner.read().unwrap();
            state
                .snapshot
                .as_ref()
                .map(|s| s.has_active_subscription)
                .unwrap_or(false)
        };

        {
            let mut state = self.inner.write().unwrap();
            state.snapshot = Some(status.clone());
            state.fetched_at = Some(Instant::now());
            state.loading = false;
            state.error = errored;
        }

        // One-shot transition: only the not-active → active edge notifies.
        if !was_active && status.has_active_subscription {
            self.activation.send_replace(status.clone());
        }

        status
    }

    /// Read-after-write confirmation: poll until the durable write is
    /// visible as an active entitlement, bounded by `max_polls`.
    ///
    /// Returns the last observed status either way.
    pub async fn confirm_active(&self, max_polls: u32, interval: Duration) -> EntitlementStatus {
        let mut last = self.refresh().await;
        let mut polls = 1;
        while !last.has_active_subscription && polls < max_polls {
            tokio::time::sleep(interval).await;
            last = self.refresh().await;
            polls += 1;
        }
        if !last.has_active_subscription {
            tracing::warn!(
                target: "tollgate::status",
                user_id = %self.user_id,
                polls,
                "Entitlement not visible after bounded confirmation polls"
            );
        }
        last
    }

    /// Bounded-interval poll while the cached state is not yet active.
    /// Stops as soon as the state becomes active (returning `true`) or the
    /// poll budget runs out (`false`), so there is no unbounded background
    /// work.
    pub async fn poll_until_active(&self, max_polls: u32, interval: Duration) -> bool {
        for _ in 0..max_polls {
            if self.refresh().await.has_active_subscription {
                return true;
            }
            tokio::time::sleep(interval).await;
        }
        false
    }

    /// Subscribe to activation transitions. The receiver is only notified
    /// when the state crosses from not-active to active.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EntitlementStatus> {
        self.activation.subscribe()
    }

    /// Drop the cached value so the next read refreshes.
    pub fn invalidate(&self) {
        let mut state = self.inner.write().unwrap();
        state.snapshot = None;
        state.fetched_at = None;
    }

    /// Last cached value, if any, without refreshing.
    #[must_use]
    pub fn cached(&self) -> Option<EntitlementStatus> {
        self.inner.read().unwrap().snapshot.clone()
    }

    /// Whether a refresh is currently in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.read().unwrap().loading
    }

    /// Whether the last refresh failed.
    #[must_use]
    pub fn last_refresh_errored(&self) -> bool {
        self.inner.read().unwrap().error
    }

    fn fresh_snapshot(&self) -> Option<EntitlementStatus> {
        let state = self.inner.read().unwrap();
        match (&state.snapshot, state.fetched_at) {
            (Some(snapshot), Some(fetched_at)) if fetched_at.elapsed() < self.ttl => {
                Some(snapshot.clone())
            }
            _ => None,
        }
    }
}
