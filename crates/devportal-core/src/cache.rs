//! Short-lived read cache for backend resources.
//!
//! Each resource class (app list, per-app detail, developer details) keeps a
//! slot per key. A slot holds a shared once-cell with the outcome of one
//! fetch: the first reader inside the TTL window runs the fetch, every
//! concurrent or later reader in the same window awaits and clones the same
//! outcome, success or failure. Slots expire a fixed time after they were
//! created, are evicted once their fetch has failed, and are dropped
//! explicitly by the mutating calls that make them stale.
//!
//! Time comes from an injected [`Clock`] so expiry is testable without
//! sleeping.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::model::{DeveloperApp, DeveloperDetails};

/// Default lifetime of a cached read.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(90);

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

type Outcome<T, E> = Arc<OnceCell<Result<T, E>>>;

struct Slot<T, E> {
    cell: Outcome<T, E>,
    created_at: Instant,
}

/// One resource class of the read cache, keyed by `K`, failing with `E`.
pub struct CachedResource<K, T, E> {
    name: &'static str,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<K, Slot<T, E>>>,
}

impl<K, T, E> CachedResource<K, T, E>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone,
    E: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, running `fetch` only if no live
    /// slot exists. Readers that arrive while a fetch is in flight share its
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the fetch error to every reader that shared the fetch. The
    /// failed slot is then evicted so the next read starts a fresh fetch.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = self.live_cell(&key);
        let outcome = cell.get_or_init(fetch).await.clone();
        if outcome.is_err() {
            self.evict_cell(&key, &cell);
        }
        outcome
    }

    /// Whether a live (unexpired) slot exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        let slots = self.lock();
        slots.get(key).is_some_and(|slot| self.is_live(slot, now))
    }

    /// Drop the slot for `key`.
    pub fn invalidate(&self, key: &K) {
        if self.lock().remove(key).is_some() {
            debug!(cache = self.name, ?key, "cache entry invalidated");
        }
    }

    /// Drop every slot.
    pub fn clear(&self) {
        let mut slots = self.lock();
        if !slots.is_empty() {
            debug!(cache = self.name, entries = slots.len(), "cache cleared");
            slots.clear();
        }
    }

    fn live_cell(&self, key: &K) -> Outcome<T, E> {
        let now = self.clock.now();
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            if self.is_live(slot, now) {
                debug!(cache = self.name, ?key, "cache hit");
                return Arc::clone(&slot.cell);
            }
        }
        debug!(cache = self.name, ?key, "cache miss, starting fetch");
        let cell = Arc::new(OnceCell::new());
        slots.insert(
            key.clone(),
            Slot {
                cell: Arc::clone(&cell),
                created_at: now,
            },
        );
        cell
    }

    fn evict_cell(&self, key: &K, cell: &Outcome<T, E>) {
        let mut slots = self.lock();
        // A newer slot may have replaced ours while the fetch was running.
        if slots.get(key).is_some_and(|slot| Arc::ptr_eq(&slot.cell, cell)) {
            slots.remove(key);
            debug!(cache = self.name, ?key, "failed fetch evicted");
        }
    }

    fn is_live(&self, slot: &Slot<T, E>, now: Instant) -> bool {
        now.saturating_duration_since(slot.created_at) < self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Slot<T, E>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All cached reads of one signed-in session.
pub struct PortalCache<E> {
    pub app_names: CachedResource<(), Vec<String>, E>,
    pub app_details: CachedResource<String, DeveloperApp, E>,
    pub developer: CachedResource<(), DeveloperDetails, E>,
}

impl<E: Clone> PortalCache<E> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            app_names: CachedResource::new("app_names", ttl, Arc::clone(&clock)),
            app_details: CachedResource::new("app_details", ttl, Arc::clone(&clock)),
            developer: CachedResource::new("developer", ttl, clock),
        }
    }

    /// Cache with the default TTL and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CACHE_TTL, Arc::new(SystemClock))
    }

    /// Invalidate the app list together with every app detail.
    pub fn clear_apps(&self) {
        self.app_names.clear();
        self.app_details.clear();
    }

    pub fn clear_developer(&self) {
        self.developer.clear();
    }

    pub fn clear_all(&self) {
        self.clear_apps();
        self.clear_developer();
    }
}
