//! In-memory adapters.
//!
//! Thread-safe reference implementations of [`RegionStore`] and
//! [`PredicateStore`]. They behave like the platform services as far as the
//! engine can tell, and expose hooks to simulate crossings, deliveries and
//! failures. Intended for tests, demos and embedded use.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::mask::{MaskedIdentifiers, PresentationOptions};
use super::traits::{
    AuthorizationStatus, Completion, MonitoringFailure, Outcome, PredicateStore, RegionCrossing,
    RegionStore,
};
use crate::config::DEFAULT_CATEGORY;
use crate::error::AdapterError;
use crate::monitor::Crossing;
use crate::native::{NativeRegion, NativeRequest};

// Sends to every live subscriber, forgetting the ones that hung up.
fn broadcast<T: Clone>(subscribers: &mut Vec<Sender<T>>, value: &T) -> usize {
    subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    subscribers.len()
}

// Outcomes are sent in reverse order when delayed, so callers cannot rely on ordering.
fn deliver_outcomes(outcomes: Vec<Outcome>, delay: Option<Duration>) -> Receiver<Outcome> {
    let (tx, rx) = unbounded();
    match delay {
        None => {
            for outcome in outcomes {
                let _ = tx.send(outcome);
            }
        }
        Some(delay) => {
            thread::spawn(move || {
                for outcome in outcomes.into_iter().rev() {
                    thread::sleep(delay);
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
    }
    rx
}

#[derive(Debug)]
struct RegionState {
    monitored: HashMap<String, NativeRegion>,
    scripted_failures: HashMap<String, AdapterError>,
    limit: Option<usize>,
    authorization: AuthorizationStatus,
    completion_delay: Option<Duration>,
    stop_calls: Vec<String>,
}

impl Default for RegionState {
    fn default() -> Self {
        Self {
            monitored: HashMap::new(),
            scripted_failures: HashMap::new(),
            limit: None,
            authorization: AuthorizationStatus::Always,
            completion_delay: None,
            stop_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RegionSubscribers {
    crossings: Vec<Sender<RegionCrossing>>,
    failures: Vec<Sender<MonitoringFailure>>,
}

/// In-memory geofencing service.
#[derive(Debug, Default)]
pub struct InMemoryRegionStore {
    state: RwLock<RegionState>,
    subscribers: Mutex<RegionSubscribers>,
}

impl InMemoryRegionStore {
    /// Creates an empty, fully authorized store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reported authorization.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.write().authorization = status;
    }

    /// Caps the number of simultaneously monitored regions.
    pub fn set_region_limit(&self, limit: Option<usize>) {
        self.write().limit = limit;
    }

    /// Delays every start outcome by `delay`, answering from another thread.
    pub fn set_completion_delay(&self, delay: Option<Duration>) {
        self.write().completion_delay = delay;
    }

    /// Makes every future start of `identifier` fail with `error`.
    pub fn script_failure(&self, identifier: impl Into<String>, error: AdapterError) {
        self.write().scripted_failures.insert(identifier.into(), error);
    }

    /// Removes a scripted failure.
    pub fn clear_failure(&self, identifier: &str) {
        self.write().scripted_failures.remove(identifier);
    }

    /// Registers a region directly, as if left over from an earlier run.
    pub fn preload(&self, region: NativeRegion) {
        self.write().monitored.insert(region.identifier.clone(), region);
    }

    /// Identifiers currently monitored, sorted.
    #[must_use]
    pub fn monitored_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().monitored.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every identifier passed to `stop_monitoring`, in call order.
    #[must_use]
    pub fn stop_calls(&self) -> Vec<String> {
        self.read().stop_calls.clone()
    }

    /// Simulates entering a monitored region. Returns false if it is not monitored.
    pub fn enter(&self, identifier: &str) -> bool {
        let Some(region) = self.read().monitored.get(identifier).cloned() else {
            return false;
        };
        self.emit_entered(&region);
        true
    }

    /// Simulates leaving a monitored region. Returns false if it is not monitored.
    pub fn exit(&self, identifier: &str) -> bool {
        let Some(region) = self.read().monitored.get(identifier).cloned() else {
            return false;
        };
        self.emit_exited(&region);
        true
    }

    /// Delivers an entry event for an arbitrary region.
    pub fn emit_entered(&self, region: &NativeRegion) -> usize {
        self.emit(Crossing::Entered, region)
    }

    /// Delivers an exit event for an arbitrary region.
    pub fn emit_exited(&self, region: &NativeRegion) -> usize {
        self.emit(Crossing::Exited, region)
    }

    // One queue per subscriber keeps entries and exits in emission order.
    fn emit(&self, crossing: Crossing, region: &NativeRegion) -> usize {
        tracing::debug!(region = %region.identifier, %crossing, "simulated crossing");
        let event = RegionCrossing {
            crossing,
            region: region.clone(),
        };
        broadcast(&mut self.subscribers().crossings, &event)
    }

    /// Reports that monitoring failed after it had started.
    ///
    /// An identifier this store does not monitor is still reported, as a region
    /// without geometry.
    pub fn fail(&self, identifier: Option<&str>, error: AdapterError) -> usize {
        let region = identifier.map(|id| {
            self.read()
                .monitored
                .get(id)
                .cloned()
                .unwrap_or_else(|| NativeRegion::identified(id))
        });
        let failure = MonitoringFailure { region, error };
        broadcast(&mut self.subscribers().failures, &failure)
    }

    /// Drops every event subscription, as if the platform service went away.
    pub fn disconnect_subscribers(&self) {
        let mut subs = self.subscribers();
        subs.crossings.clear();
        subs.failures.clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, RegionSubscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RegionStore for InMemoryRegionStore {
    fn authorization(&self) -> AuthorizationStatus {
        self.read().authorization
    }

    fn monitored_regions(&self) -> Result<HashSet<NativeRegion>, AdapterError> {
        Ok(self.read().monitored.values().cloned().collect())
    }

    fn start_monitoring(&self, regions: Vec<NativeRegion>) -> Receiver<Outcome> {
        let mut state = self.write();
        let mut outcomes = Vec::with_capacity(regions.len());

        for region in regions {
            let id = region.identifier.clone();
            if !state.authorization.permits_registration() {
                outcomes.push(Outcome::failed(
                    id,
                    AdapterError::Unauthorized {
                        capability: "region monitoring".to_string(),
                    },
                ));
                continue;
            }
            if let Some(err) = state.scripted_failures.get(&id) {
                outcomes.push(Outcome::failed(id, err.clone()));
                continue;
            }
            let already = state.monitored.contains_key(&id);
            if let Some(limit) = state.limit {
                if !already && state.monitored.len() >= limit {
                    outcomes.push(Outcome::failed(id, AdapterError::RegionLimitExceeded { limit }));
                    continue;
                }
            }
            state.monitored.insert(id.clone(), region);
            outcomes.push(Outcome::succeeded(id));
        }

        let delay = state.completion_delay;
        drop(state);
        deliver_outcomes(outcomes, delay)
    }

    fn stop_monitoring(&self, regions: &[NativeRegion]) {
        let mut state = self.write();
        for region in regions {
            state.stop_calls.push(region.identifier.clone());
            if state.monitored.remove(&region.identifier).is_none() {
                tracing::debug!(region = %region.identifier, "stop for a region that is not monitored");
            }
        }
    }

    fn crossings(&self) -> Receiver<RegionCrossing> {
        let (tx, rx) = unbounded();
        self.subscribers().crossings.push(tx);
        rx
    }

    fn failures(&self) -> Receiver<MonitoringFailure> {
        let (tx, rx) = unbounded();
        self.subscribers().failures.push(tx);
        rx
    }
}

#[derive(Debug)]
struct RequestState {
    pending: HashMap<String, NativeRequest>,
    delivered: HashSet<String>,
    scripted_failures: HashMap<String, AdapterError>,
    authorization: AuthorizationStatus,
    completion_delay: Option<Duration>,
    cancel_calls: Vec<String>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            delivered: HashSet::new(),
            scripted_failures: HashMap::new(),
            authorization: AuthorizationStatus::Always,
            completion_delay: None,
            cancel_calls: Vec::new(),
        }
    }
}

/// In-memory notification service.
#[derive(Debug)]
pub struct InMemoryPredicateStore {
    category: String,
    masks: MaskedIdentifiers,
    state: RwLock<RequestState>,
}

impl Default for InMemoryPredicateStore {
    fn default() -> Self {
        Self::with_category(DEFAULT_CATEGORY)
    }
}

impl InMemoryPredicateStore {
    /// Creates an empty, fully authorized store for the default category.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose presentation decisions apply to `category`.
    #[must_use]
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            masks: MaskedIdentifiers::new(),
            state: RwLock::new(RequestState::default()),
        }
    }

    /// Sets the reported authorization.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.write().authorization = status;
    }

    /// Delays every schedule outcome by `delay`, answering from another thread.
    pub fn set_completion_delay(&self, delay: Option<Duration>) {
        self.write().completion_delay = delay;
    }

    /// Makes every future schedule of `identifier` fail with `error`.
    pub fn script_failure(&self, identifier: impl Into<String>, error: AdapterError) {
        self.write().scripted_failures.insert(identifier.into(), error);
    }

    /// Adds a pending request directly, as if left over from an earlier run.
    pub fn preload(&self, request: NativeRequest) {
        self.write().pending.insert(request.identifier.clone(), request);
    }

    /// Identifiers currently pending, sorted.
    #[must_use]
    pub fn pending_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every identifier passed to `cancel`, in call order.
    #[must_use]
    pub fn cancel_calls(&self) -> Vec<String> {
        self.read().cancel_calls.clone()
    }

    /// Identifiers presented and not yet withdrawn.
    #[must_use]
    pub fn delivered_identifiers(&self) -> HashSet<String> {
        self.read().delivered.clone()
    }

    /// The shared masked set consulted at delivery time.
    #[must_use]
    pub const fn masks(&self) -> &MaskedIdentifiers {
        &self.masks
    }

    /// Simulates the platform firing the pending request `identifier`.
    ///
    /// The masked set is consulted now, at delivery. Returns `None` when no such
    /// request is pending.
    pub fn deliver(&self, identifier: &str) -> Option<PresentationOptions> {
        let mut state = self.write();
        let request = state.pending.get(identifier)?;
        let options = self.masks.presentation_for(request, &self.category);
        if !options.is_empty() {
            state.delivered.insert(identifier.to_string());
        }
        Some(options)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RequestState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RequestState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PredicateStore for InMemoryPredicateStore {
    fn authorization(&self) -> AuthorizationStatus {
        self.read().authorization
    }

    fn pending_requests(&self) -> Completion<Vec<NativeRequest>> {
        Completion::ready(self.read().pending.values().cloned().collect())
    }

    fn schedule(&self, requests: Vec<NativeRequest>) -> Receiver<Outcome> {
        let mut state = self.write();
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            let id = request.identifier.clone();
            if !state.authorization.permits_registration() {
                outcomes.push(Outcome::failed(
                    id,
                    AdapterError::Unauthorized {
                        capability: "notifications".to_string(),
                    },
                ));
                continue;
            }
            if let Some(err) = state.scripted_failures.get(&id) {
                outcomes.push(Outcome::failed(id, err.clone()));
                continue;
            }
            state.pending.insert(id.clone(), request);
            outcomes.push(Outcome::succeeded(id));
        }

        let delay = state.completion_delay;
        drop(state);
        deliver_outcomes(outcomes, delay)
    }

    fn cancel(&self, identifiers: &HashSet<String>) {
        let mut state = self.write();
        for id in identifiers {
            state.cancel_calls.push(id.clone());
            if state.pending.remove(id).is_none() {
                tracing::debug!(request = %id, "cancel for a request that is not pending");
            }
        }
    }

    fn mask(&self, identifiers: &HashSet<String>) {
        let added = self.masks.insert_all(identifiers);
        let mut state = self.write();
        state.delivered.retain(|id| !identifiers.contains(id));
        tracing::debug!(added, total = identifiers.len(), "masked identifiers");
    }

    fn unmask(&self, identifiers: &HashSet<String>) {
        let removed = self.masks.remove_all(identifiers);
        tracing::debug!(removed, total = identifiers.len(), "unmasked identifiers");
    }
}
