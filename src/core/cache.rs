//! Asset resolution cache for stage slots.
//!
//! Maps a logical asset name to a loaded resource, shares one load between
//! concurrent requests for the same name, and reference-counts entries by
//! the number of slots displaying them. For any slot, only the result of
//! the most recently issued request may ever be applied: every request
//! bumps the slot's version, and a load that completes after its slot has
//! moved on is discarded.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::node::{Directive, Slot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("failed to load asset '{name}': {reason}")]
    Load { name: String, reason: String },
}

/// Capability that turns asset names into resources. How names map to
/// storage is up to the implementation.
pub trait AssetLoader: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    /// Start loading `name`. The returned future must not borrow `self`.
    fn load(&self, name: &str) -> BoxFuture<'static, Result<Self::Resource, String>>;

    /// Called exactly once for every successfully loaded resource when it
    /// leaves the cache, either evicted or discarded as stale. Runs while
    /// the cache is locked and must not call back into it.
    fn release(&self, _name: &str, _resource: &Self::Resource) {}
}

/// What a `resolve` call did to its slot.
#[derive(Debug, Clone)]
pub enum ResolveOutcome<R> {
    /// Nothing changed: absent directive, or the name is already shown or
    /// already on its way.
    Unchanged,
    /// The slot was emptied.
    Cleared,
    /// The slot now displays this resource.
    Applied(Arc<R>),
    /// A newer request for the slot arrived first; this result was dropped.
    Superseded,
}

impl<R> ResolveOutcome<R> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub type ResolveFuture<R> = BoxFuture<'static, Result<ResolveOutcome<R>, CacheError>>;

type SharedLoad<R> = Shared<BoxFuture<'static, Result<Arc<R>, String>>>;

struct CacheEntry<R> {
    resource: Arc<R>,
    ref_count: usize,
}

#[derive(Debug, Default)]
struct SlotState {
    displayed: Option<String>,
    pending: Option<String>,
    version: u64,
}

struct InFlight<R> {
    id: u64,
    load: SharedLoad<R>,
}

struct CacheState<R> {
    entries: FxHashMap<String, CacheEntry<R>>,
    slots: FxHashMap<Slot, SlotState>,
    in_flight: FxHashMap<String, InFlight<R>>,
    next_flight_id: u64,
}

impl<R> Default for CacheState<R> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            slots: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            next_flight_id: 0,
        }
    }
}

impl<R> CacheState<R> {
    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        self.slots.entry(slot).or_default()
    }

    /// Point `slot` at `name`, taking a reference on the new entry before
    /// dropping the one on whatever the slot showed before.
    fn apply<L>(&mut self, slot: Slot, name: &str, resource: &Arc<R>, loader: &L)
    where
        L: AssetLoader<Resource = R>,
    {
        let previous = self.slot_mut(slot).displayed.replace(name.to_string());
        if previous.as_deref() == Some(name) {
            return;
        }
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| CacheEntry {
                resource: Arc::clone(resource),
                ref_count: 0,
            })
            .ref_count += 1;
        if let Some(previous) = previous {
            self.release_ref(&previous, loader);
        }
    }

    fn release_ref<L>(&mut self, name: &str, loader: &L)
    where
        L: AssetLoader<Resource = R>,
    {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            if let Some(entry) = self.entries.remove(name) {
                debug!(asset = %name, "asset_evicted");
                loader.release(name, &entry.resource);
            }
        }
    }

    fn clear_slot<L>(&mut self, slot: Slot, loader: &L) -> bool
    where
        L: AssetLoader<Resource = R>,
    {
        let state = self.slot_mut(slot);
        state.version += 1;
        state.pending = None;
        let previous = state.displayed.take();
        match previous {
            Some(previous) => {
                self.release_ref(&previous, loader);
                true
            }
            None => false,
        }
    }

    /// Hand a finished load to every slot still waiting on it. Runs once
    /// per load, for whichever waiter observes completion first.
    fn settle<L>(&mut self, name: &str, result: &Result<Arc<R>, String>, loader: &L)
    where
        L: AssetLoader<Resource = R>,
    {
        let takers: Vec<Slot> = self
            .slots
            .iter()
            .filter(|(_, s)| s.pending.as_deref() == Some(name))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in &takers {
            self.slot_mut(*slot).pending = None;
        }

        match result {
            Ok(resource) => {
                for slot in &takers {
                    self.apply(*slot, name, resource, loader);
                }
                if takers.is_empty() {
                    debug!(asset = %name, "stale_load_discarded");
                    loader.release(name, resource);
                }
            }
            Err(reason) => {
                warn!(asset = %name, reason = %reason, slots = takers.len(), "asset_load_failed");
            }
        }
    }
}

/// Request/response/eviction engine for named visual assets.
pub struct AssetCache<L: AssetLoader> {
    loader: Arc<L>,
    state: Arc<Mutex<CacheState<L::Resource>>>,
}

impl<L: AssetLoader> AssetCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<L::Resource>> {
        lock_state(&self.state)
    }

    /// Ask `slot` to follow `directive`.
    ///
    /// Bookkeeping (version bump, idempotence check, cache hit, clear)
    /// happens before this returns; only a fresh load is deferred to the
    /// returned future. Dropping the future does not cancel the request:
    /// the slot is still updated if another waiter drives the load.
    pub fn resolve(&self, slot: Slot, directive: Directive) -> ResolveFuture<L::Resource> {
        let name = match directive {
            Directive::Keep => return ready(Ok(ResolveOutcome::Unchanged)),
            Directive::Clear => {
                let cleared = self.lock().clear_slot(slot, &*self.loader);
                debug!(slot = ?slot, cleared, "slot_cleared");
                return ready(Ok(ResolveOutcome::Cleared));
            }
            Directive::Show(name) => name,
        };

        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        if slot_state.pending.as_deref() == Some(name.as_str())
            || (slot_state.pending.is_none() && slot_state.displayed.as_deref() == Some(name.as_str()))
        {
            return ready(Ok(ResolveOutcome::Unchanged));
        }

        slot_state.version += 1;
        let my_version = slot_state.version;

        if let Some(resource) = state
            .entries
            .get(&name)
            .filter(|e| e.ref_count > 0)
            .map(|e| Arc::clone(&e.resource))
        {
            state.slot_mut(slot).pending = None;
            state.apply(slot, &name, &resource, &*self.loader);
            debug!(slot = ?slot, asset = %name, "asset_cache_hit");
            return ready(Ok(ResolveOutcome::Applied(resource)));
        }

        state.slot_mut(slot).pending = Some(name.clone());
        let joined = state
            .in_flight
            .get(&name)
            .map(|flight| (flight.id, flight.load.clone()));
        let (flight_id, load) = match joined {
            Some(joined) => joined,
            None => {
                let id = state.next_flight_id;
                state.next_flight_id += 1;
                let load = self
                    .loader
                    .load(&name)
                    .map(|r| r.map(Arc::new))
                    .boxed()
                    .shared();
                state.in_flight.insert(
                    name.clone(),
                    InFlight {
                        id,
                        load: load.clone(),
                    },
                );
                debug!(slot = ?slot, asset = %name, "asset_load_started");
                (id, load)
            }
        };
        drop(state);

        let shared_state = Arc::clone(&self.state);
        let loader = Arc::clone(&self.loader);
        async move {
            let result = load.await;
            let mut state = lock_state(&shared_state);

            if state.in_flight.get(&name).map(|f| f.id) == Some(flight_id) {
                state.in_flight.remove(&name);
                state.settle(&name, &result, &*loader);
            }

            let slot_state = state.slot_mut(slot);
            if slot_state.version != my_version {
                return Ok(ResolveOutcome::Superseded);
            }
            match result {
                Ok(resource) if slot_state.displayed.as_deref() == Some(name.as_str()) => {
                    Ok(ResolveOutcome::Applied(resource))
                }
                Ok(_) => Ok(ResolveOutcome::Superseded),
                Err(reason) => Err(CacheError::Load { name, reason }),
            }
        }
        .boxed()
    }

    /// Name currently displayed in `slot`.
    pub fn displayed(&self, slot: Slot) -> Option<String> {
        self.lock().slots.get(&slot).and_then(|s| s.displayed.clone())
    }

    /// Name `slot` is waiting on, if a load is outstanding for it.
    pub fn pending(&self, slot: Slot) -> Option<String> {
        self.lock().slots.get(&slot).and_then(|s| s.pending.clone())
    }

    /// Every non-empty slot and the name it displays.
    pub fn display_names(&self) -> BTreeMap<Slot, String> {
        self.lock()
            .slots
            .iter()
            .filter_map(|(slot, s)| s.displayed.clone().map(|name| (*slot, name)))
            .collect()
    }

    /// Live entry for `name`. Entries whose count reached zero are gone.
    pub fn get(&self, name: &str) -> Option<Arc<L::Resource>> {
        self.lock()
            .entries
            .get(name)
            .filter(|e| e.ref_count > 0)
            .map(|e| Arc::clone(&e.resource))
    }

    pub fn ref_count(&self, name: &str) -> usize {
        self.lock().entries.get(name).map_or(0, |e| e.ref_count)
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.lock().in_flight.contains_key(name)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty every slot and invalidate outstanding requests.
    pub fn clear_all(&self) {
        let mut state = self.lock();
        for slot in Slot::ALL {
            state.clear_slot(slot, &*self.loader);
        }
    }
}

fn lock_state<R>(state: &Mutex<CacheState<R>>) -> MutexGuard<'_, CacheState<R>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ready<R: Send + Sync + 'static>(
    outcome: Result<ResolveOutcome<R>, CacheError>,
) -> ResolveFuture<R> {
    future::ready(outcome).boxed()
}
