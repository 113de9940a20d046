//! The link store: single owner of the link collection.
//!
//! Transitions go through [`reduce`], and the whole collection is written
//! back through the persistence adapter after every dispatch. Persistence
//! is advisory: a failed write is logged and the in-memory state stays
//! authoritative.

mod action;
mod reducer;

pub use action::Action;
pub use reducer::{reduce, ReducerOptions, ADD_LINK_SUFFIX_ATTEMPTS};

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::models::{LinkRecord, StoreState};
use crate::storage::{load_links, save_links, Persistence};

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// The dispatch contract shared by the store and everything composed
/// around it.
pub trait Dispatch: Send {
    /// Apply `action` synchronously; returns once the new state is in place
    fn dispatch(&mut self, action: Action);

    /// Read-only view of the current state
    fn state(&self) -> &StoreState;
}

pub struct LinkStore {
    state: StoreState,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    options: ReducerOptions,
}

impl LinkStore {
    /// Build a store from whatever the persistence adapter holds.
    /// Missing or malformed state starts the store empty.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self::with_options(persistence, Arc::new(SystemClock), ReducerOptions::default())
    }

    pub fn with_options(
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        options: ReducerOptions,
    ) -> Self {
        let links = load_links(persistence.as_ref(), options.click_history_limit);
        debug!(count = links.len(), "loaded persisted links");

        Self {
            state: StoreState::new(links),
            persistence,
            clock,
            options,
        }
    }

    fn persist(&self) {
        if let Err(e) = save_links(self.persistence.as_ref(), &self.state.links) {
            warn!(error = %e, "failed to persist links, keeping in-memory state");
        }
    }
}

impl Dispatch for LinkStore {
    fn dispatch(&mut self, action: Action) {
        let now = self.clock.now_millis();
        let kind = action.kind();
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, action, now, &self.options);
        debug!(action = kind, links = self.state.links.len(), "applied action");
        self.persist();
    }

    fn state(&self) -> &StoreState {
        &self.state
    }
}

/// Shared handle to the process's single dispatch pipeline.
///
/// Cloning the handle shares the same store. Each dispatch runs to
/// completion under the handle's lock, so two transitions never
/// interleave no matter which task issues them.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<Box<dyn Dispatch>>>,
}

impl StoreHandle {
    pub fn new(dispatcher: impl Dispatch + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(dispatcher))),
        }
    }

    pub fn dispatch(&self, action: Action) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(action);
    }

    /// Run `f` with exclusive access to the pipeline. Nothing else is
    /// dispatched until `f` returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut dyn Dispatch) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    }

    /// Dispatch `REMOVE_EXPIRED` and return how many links it removed
    pub fn remove_expired(&self) -> usize {
        self.update(|store| {
            let before = store.state().links.len();
            store.dispatch(Action::RemoveExpired);
            before - store.state().links.len()
        })
    }

    /// Run `f` against the current state without cloning it
    pub fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.state())
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> StoreState {
        self.with_state(StoreState::clone)
    }

    pub fn get(&self, id: &str) -> Option<LinkRecord> {
        self.with_state(|state| state.get(id).cloned())
    }
}
