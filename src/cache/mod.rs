//! In-process permission decision cache
//!
//! Decisions are memoized per actor with a short TTL. Concurrent lookups for
//! the same `(actor, module, capability)` share a single in-flight resolution,
//! so a menu render that fans out one check per entry issues at most one
//! source query per distinct key. A failed resolution is handed to every
//! waiter and then dropped, never cached.

use crate::domain::Capability;
use crate::error::{AppError, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Default TTLs
pub mod ttl {
    pub const DECISION_SECS: u64 = 60;
}

/// Expired entries are swept on every Nth miss
const SWEEP_EVERY_MISSES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    module_slug: String,
    capability: Capability,
}

impl DecisionKey {
    fn new(module_slug: &str, capability: Capability) -> Self {
        Self {
            module_slug: module_slug.to_string(),
            capability,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Resolved {
    allowed: bool,
    at: Instant,
}

type SharedLookup = Shared<BoxFuture<'static, std::result::Result<bool, Arc<AppError>>>>;

/// One resolution shared by every concurrent waiter
struct Flight {
    lookup: SharedLookup,
    failure_claimed: AtomicBool,
}

#[derive(Clone)]
enum Slot {
    Ready(Resolved),
    Pending(Arc<Flight>),
}

/// How a lookup was served, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Hit,
    InFlight,
    Miss,
}

impl SlotState {
    fn label(self) -> &'static str {
        match self {
            SlotState::Hit => "hit",
            SlotState::InFlight => "coalesced",
            SlotState::Miss => "miss",
        }
    }
}

/// A failed resolution as seen by one waiter
#[derive(Debug, Clone)]
pub struct LookupFailure {
    pub error: Arc<AppError>,
    /// Set for exactly one waiter of the failed resolution
    pub first: bool,
}

/// Per-actor decision cache with request coalescing
pub struct PermissionCache {
    ttl: Duration,
    actors: Mutex<HashMap<Uuid, HashMap<DecisionKey, Slot>>>,
    misses: AtomicUsize,
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(ttl::DECISION_SECS))
    }
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            actors: Mutex::new(HashMap::new()),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, resolved: &Resolved) -> bool {
        resolved.at.elapsed() < self.ttl
    }

    /// Cached decision, if present and not expired.
    pub fn get(&self, actor_id: Uuid, module_slug: &str, capability: Capability) -> Option<bool> {
        let actors = self.actors.lock();
        match actors
            .get(&actor_id)?
            .get(&DecisionKey::new(module_slug, capability))?
        {
            Slot::Ready(resolved) if self.is_fresh(resolved) => Some(resolved.allowed),
            _ => None,
        }
    }

    /// Store a decision, replacing any previous or in-flight entry.
    pub fn put(&self, actor_id: Uuid, module_slug: &str, capability: Capability, allowed: bool) {
        let slot = Slot::Ready(Resolved {
            allowed,
            at: Instant::now(),
        });
        self.actors
            .lock()
            .entry(actor_id)
            .or_default()
            .insert(DecisionKey::new(module_slug, capability), slot);
    }

    /// Drop every decision for an actor. Lookups already in flight still
    /// complete for their current waiters but are not stored.
    pub fn invalidate(&self, actor_id: Uuid) {
        if self.actors.lock().remove(&actor_id).is_some() {
            tracing::debug!(actor_id = %actor_id, "Invalidated cached decisions");
        }
    }

    pub fn invalidate_all(&self) {
        self.actors.lock().clear();
    }

    /// Number of actors with at least one entry
    pub fn actor_count(&self) -> usize {
        self.actors.lock().len()
    }

    /// Remove expired entries and actors left without entries.
    pub fn purge_expired(&self) {
        let mut actors = self.actors.lock();
        self.sweep(&mut actors);
    }

    fn sweep(&self, actors: &mut HashMap<Uuid, HashMap<DecisionKey, Slot>>) {
        let before = actors.len();
        for slots in actors.values_mut() {
            slots.retain(|_, slot| match slot {
                Slot::Ready(resolved) => self.is_fresh(resolved),
                Slot::Pending(_) => true,
            });
        }
        actors.retain(|_, slots| !slots.is_empty());
        tracing::trace!(removed = before - actors.len(), "Swept expired decisions");
    }

    fn slot_for<F, Fut>(&self, actor_id: Uuid, key: &DecisionKey, resolve: F) -> (Slot, SlotState)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let mut actors = self.actors.lock();

        if let Some(slot) = actors.get(&actor_id).and_then(|slots| slots.get(key)) {
            match slot {
                Slot::Ready(resolved) if self.is_fresh(resolved) => {
                    return (slot.clone(), SlotState::Hit)
                }
                Slot::Pending(_) => return (slot.clone(), SlotState::InFlight),
                Slot::Ready(_) => {}
            }
        }

        if (self.misses.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_MISSES == 0 {
            self.sweep(&mut actors);
        }

        let slot = Slot::Pending(Arc::new(Flight {
            lookup: resolve().map_err(Arc::new).boxed().shared(),
            failure_claimed: AtomicBool::new(false),
        }));
        actors
            .entry(actor_id)
            .or_default()
            .insert(key.clone(), slot.clone());
        (slot, SlotState::Miss)
    }

    /// Replace the pending entry with its outcome, unless it was invalidated
    /// or replaced meanwhile. Failures leave no entry behind.
    fn settle(
        &self,
        actor_id: Uuid,
        key: &DecisionKey,
        flight: &Arc<Flight>,
        outcome: &std::result::Result<bool, Arc<AppError>>,
    ) {
        let mut actors = self.actors.lock();
        let Some(slots) = actors.get_mut(&actor_id) else {
            return;
        };
        let current = matches!(
            slots.get(key),
            Some(Slot::Pending(pending)) if Arc::ptr_eq(pending, flight)
        );
        if !current {
            return;
        }
        match outcome {
            Ok(allowed) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready(Resolved {
                        allowed: *allowed,
                        at: Instant::now(),
                    }),
                );
            }
            Err(_) => {
                slots.remove(key);
                if slots.is_empty() {
                    actors.remove(&actor_id);
                }
            }
        }
    }

    /// Return the cached decision or run `resolve`, sharing one in-flight
    /// resolution among concurrent callers.
    ///
    /// Every waiter of a failed resolution receives the same error; exactly
    /// one of them sees [`LookupFailure::first`] set. If every waiter is
    /// dropped, the next caller picks the pending resolution up.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        actor_id: Uuid,
        module_slug: &str,
        capability: Capability,
        resolve: F,
    ) -> std::result::Result<bool, LookupFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let key = DecisionKey::new(module_slug, capability);
        let (slot, state) = self.slot_for(actor_id, &key, resolve);
        metrics::counter!("pdv_access_cache_total", "result" => state.label()).increment(1);

        let flight = match slot {
            Slot::Ready(resolved) => return Ok(resolved.allowed),
            Slot::Pending(flight) => flight,
        };

        let outcome = flight.lookup.clone().await;
        self.settle(actor_id, &key, &flight, &outcome);
        outcome.map_err(|error| LookupFailure {
            error,
            first: !flight.failure_claimed.swap(true, Ordering::SeqCst),
        })
    }
}
