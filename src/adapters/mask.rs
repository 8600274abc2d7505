//! Notification masking.
//!
//! The masked set is consulted when a notification is about to be presented,
//! not when it is scheduled: scheduling and delivery can be hours apart.
//!
//! Masks are counted. Several live emissions of the same predicate each hold
//! one count, and the identifier stays masked until the last one is released.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::traits::PredicateStore;
use crate::native::NativeRequest;

/// How a delivered notification is presented.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationOptions {
    pub alert: bool,
    pub sound: bool,
    pub badge: bool,
}

impl PresentationOptions {
    /// Alert, sound and badge.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            alert: true,
            sound: true,
            badge: true,
        }
    }

    /// Present nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            alert: false,
            sound: false,
            badge: false,
        }
    }

    /// Returns true when nothing is presented.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.alert || self.sound || self.badge)
    }
}

/// Shared, counted set of masked request identifiers.
///
/// Cloning shares the set, so a platform delivery callback can hold one clone
/// while the adapter mutates another.
#[derive(Debug, Clone, Default)]
pub struct MaskedIdentifiers {
    inner: Arc<RwLock<HashMap<String, usize>>>,
}

impl MaskedIdentifiers {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one mask count per identifier; returns how many were newly masked.
    pub fn insert_all<'a>(&self, identifiers: impl IntoIterator<Item = &'a String>) -> usize {
        let mut counts = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        identifiers
            .into_iter()
            .filter(|id| {
                let count = counts.entry((*id).clone()).or_insert(0);
                *count += 1;
                *count == 1
            })
            .count()
    }

    /// Gives back one mask count per identifier; returns how many became
    /// unmasked. Identifiers that are not masked are ignored.
    pub fn remove_all<'a>(&self, identifiers: impl IntoIterator<Item = &'a String>) -> usize {
        let mut counts = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        identifiers
            .into_iter()
            .filter(|id| {
                let Some(count) = counts.get_mut(id.as_str()) else {
                    return false;
                };
                *count -= 1;
                if *count > 0 {
                    return false;
                }
                counts.remove(id.as_str());
                true
            })
            .count()
    }

    /// Returns true when `identifier` is masked.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }

    /// Number of outstanding mask counts for `identifier`.
    #[must_use]
    pub fn count(&self, identifier: &str) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    /// Identifiers currently masked.
    #[must_use]
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Presentation decision for a notification about to be shown.
    ///
    /// Requests outside `category` are never touched.
    #[must_use]
    pub fn presentation_for(&self, request: &NativeRequest, category: &str) -> PresentationOptions {
        if request.category != category {
            return PresentationOptions::full();
        }
        let masked = self.contains(&request.identifier);
        tracing::debug!(request = %request.identifier, masked, "presentation decision");
        if masked {
            PresentationOptions::none()
        } else {
            PresentationOptions::full()
        }
    }
}

/// Mask counts taken by one session, so teardown returns exactly those.
///
/// Guards engaged through a ledger settle their count with it when released.
/// Once the ledger is closed the session has already returned every count it
/// held, and late guards release nothing.
#[derive(Debug, Clone, Default)]
pub(crate) struct MaskLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    held: HashMap<String, usize>,
    closed: bool,
}

impl MaskLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while the session holds a count for `identifier`.
    pub(crate) fn holds(&self, identifier: &str) -> bool {
        self.lock().held.contains_key(identifier)
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn record(&self, identifiers: &HashSet<String>) {
        let mut state = self.lock();
        for id in identifiers {
            *state.held.entry(id.clone()).or_insert(0) += 1;
        }
    }

    /// Returns one count per identifier to the ledger. False when the ledger
    /// is closed and the caller must not unmask.
    fn settle(&self, identifiers: &HashSet<String>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        for id in identifiers {
            if let Some(count) = state.held.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    state.held.remove(id);
                }
            }
        }
        true
    }

    /// Closes the ledger and unmasks every count still held. Returns how many
    /// counts were returned.
    pub(crate) fn release_all(&self, store: &dyn PredicateStore) -> usize {
        let held = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.held)
        };
        let mut returned = 0;
        for (id, count) in held {
            let identifiers = HashSet::from([id]);
            for _ in 0..count {
                store.unmask(&identifiers);
            }
            returned += count;
        }
        returned
    }
}

/// Keeps identifiers masked until dropped.
///
/// Created by the engine for `Always` predicates it hands to a live consumer,
/// or by [`crate::Reconciler::handled`]. A guard for a `WhenInUse` predicate
/// holds nothing. Each guard holds its own mask count, so overlapping guards
/// for the same predicate keep it masked until the last one is released.
#[must_use = "dropping the guard unmasks immediately"]
pub struct MaskGuard {
    store: Option<Arc<dyn PredicateStore>>,
    ledger: Option<MaskLedger>,
    identifiers: HashSet<String>,
}

impl MaskGuard {
    /// Masks `identifiers` now and unmasks them on drop.
    pub fn engage(store: Arc<dyn PredicateStore>, identifiers: HashSet<String>) -> Self {
        if identifiers.is_empty() {
            return Self::noop();
        }
        store.mask(&identifiers);
        Self {
            store: Some(store),
            ledger: None,
            identifiers,
        }
    }

    /// Like [`Self::engage`], with the count recorded in a session ledger.
    pub(crate) fn engage_in(
        store: Arc<dyn PredicateStore>,
        identifiers: HashSet<String>,
        ledger: &MaskLedger,
    ) -> Self {
        if identifiers.is_empty() {
            return Self::noop();
        }
        store.mask(&identifiers);
        ledger.record(&identifiers);
        Self {
            store: Some(store),
            ledger: Some(ledger.clone()),
            identifiers,
        }
    }

    /// A guard that masks nothing.
    pub fn noop() -> Self {
        Self {
            store: None,
            ledger: None,
            identifiers: HashSet::new(),
        }
    }

    /// Returns true when the guard holds masked identifiers.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.store.is_some() && !self.ledger.as_ref().is_some_and(MaskLedger::is_closed)
    }

    /// Masked identifiers held by this guard.
    #[must_use]
    pub const fn identifiers(&self) -> &HashSet<String> {
        &self.identifiers
    }

    /// Unmasks now.
    pub fn release(mut self) {
        self.unmask();
    }

    /// Leaves the identifiers masked; the session teardown unmasks them.
    ///
    /// A guard from [`crate::Reconciler::handled`] has no session, so its
    /// identifiers stay masked until unmasked through the store.
    pub fn keep(mut self) {
        self.store = None;
        self.ledger = None;
    }

    fn unmask(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        if let Some(ledger) = self.ledger.take() {
            if !ledger.settle(&self.identifiers) {
                return;
            }
        }
        tracing::debug!(count = self.identifiers.len(), "unmasking handled predicates");
        store.unmask(&self.identifiers);
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        self.unmask();
    }
}

impl std::fmt::Debug for MaskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskGuard")
            .field("engaged", &self.is_engaged())
            .field("identifiers", &self.identifiers)
            .finish()
    }
}
