//! Session worker.
//!
//! One worker thread per active session. It owns the session's registrations,
//! turns region crossings into [`Triggered`] emissions, and releases every
//! registration on teardown, whichever way the session ends. Emission uses
//! `try_send` so a slow consumer never stalls event intake.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{never, select, Receiver, Sender, TrySendError};

use crate::adapters::{
    MaskGuard, MaskLedger, MonitoringFailure, PredicateStore, RegionCrossing, RegionStore,
};
use crate::config::MaskPolicy;
use crate::error::{SessionError, WatchError, WatchResult};
use crate::native::NativeRegion;
use crate::predicate::PositionPredicate;

use super::events::{Crossing, SessionId, SessionState, Triggered};
use super::resolver::ResolutionTable;

#[derive(Debug)]
pub(crate) enum ControlMsg {
    Teardown,
}

/// State shared between a session worker and its stream.
#[derive(Debug)]
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    changed: Condvar,
    dropped_events: AtomicU64,
    emitted_events: AtomicU64,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Active),
            changed: Condvar::new(),
            dropped_events: AtomicU64::new(0),
            emitted_events: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: SessionState) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = state;
        self.changed.notify_all();
    }

    /// Blocks until the session has left `Active`, at most `timeout`.
    /// Returns false on timeout.
    pub(crate) fn wait_inactive(&self, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| state.is_active())
            .unwrap_or_else(PoisonError::into_inner);
        !guard.is_active()
    }

    pub(crate) fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub(crate) fn emitted_events(&self) -> u64 {
        self.emitted_events.load(Ordering::Relaxed)
    }
}

/// Exclusive claim on the engine's single session slot. Released on drop.
#[derive(Debug)]
pub(crate) struct ActiveClaim(Arc<AtomicBool>);

impl ActiveClaim {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Event subscriptions opened before registration started.
#[allow(missing_docs)]
#[derive(Debug)]
pub(crate) struct Subscriptions {
    pub crossings: Receiver<RegionCrossing>,
    pub failures: Receiver<MonitoringFailure>,
}

impl Subscriptions {
    pub(crate) fn open(store: &dyn RegionStore) -> Self {
        Self {
            crossings: store.crossings(),
            failures: store.failures(),
        }
    }
}

/// Everything a worker owns for one session.
pub(crate) struct SessionWorker {
    pub(crate) session_id: SessionId,
    pub(crate) table: ResolutionTable,
    pub(crate) regions: Vec<NativeRegion>,
    pub(crate) requests: HashSet<String>,
    pub(crate) region_store: Arc<dyn RegionStore>,
    pub(crate) predicate_store: Arc<dyn PredicateStore>,
    pub(crate) mask_policy: MaskPolicy,
    pub(crate) out: Sender<Triggered>,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) claim: Option<ActiveClaim>,
    pub(crate) masks: MaskLedger,
}

impl SessionWorker {
    /// Moves the worker onto its own thread.
    ///
    /// If the thread cannot be spawned the worker is dropped, which tears the
    /// session down.
    pub(crate) fn spawn(
        self,
        subscriptions: Subscriptions,
        control_rx: Receiver<ControlMsg>,
    ) -> WatchResult<()> {
        let session_id = self.session_id;
        thread::Builder::new()
            .name(format!("regionwatch-session-{session_id}"))
            .spawn(move || self.run(subscriptions, control_rx))
            .map(drop)
            .map_err(|e| WatchError::internal(format!("failed to spawn session worker: {e}")))
    }

    fn run(mut self, subscriptions: Subscriptions, control_rx: Receiver<ControlMsg>) {
        let Subscriptions {
            crossings,
            failures,
        } = subscriptions;
        let mut failures_open = true;

        tracing::info!(
            session = %self.session_id,
            regions = self.regions.len(),
            requests = self.requests.len(),
            "session active"
        );

        loop {
            let failures_rx = if failures_open {
                failures.clone()
            } else {
                never()
            };

            select! {
                recv(control_rx) -> _msg => {
                    // Explicit teardown, or the stream was dropped.
                    self.teardown(SessionState::TornDown);
                    return;
                }
                recv(crossings) -> msg => match msg {
                    Ok(event) => self.dispatch(event.crossing, &event.region),
                    Err(_) => {
                        self.terminate(SessionError::Disconnected { path: "crossings".to_string() });
                        return;
                    }
                },
                recv(failures_rx) -> msg => match msg {
                    Ok(failure) => {
                        if self.concerns(&failure) {
                            self.terminate(SessionError::MonitoringFailed {
                                region: failure.region.map(|r| r.identifier),
                                source: failure.error,
                            });
                            return;
                        }
                        tracing::debug!(
                            session = %self.session_id,
                            error = %failure.error,
                            "ignoring monitoring failure for a foreign region"
                        );
                    }
                    Err(_) => {
                        tracing::debug!(session = %self.session_id, "failure channel closed");
                        failures_open = false;
                    }
                },
            }
        }
    }

    fn dispatch(&mut self, crossing: Crossing, region: &NativeRegion) {
        let hits: Vec<PositionPredicate> = self
            .table
            .resolve(crossing, region)
            .into_iter()
            .cloned()
            .collect();

        if hits.is_empty() {
            if region.abstracted_region().is_none() {
                tracing::warn!(
                    session = %self.session_id,
                    region = %region.identifier,
                    "undecodable native region on crossing"
                );
            } else {
                tracing::debug!(
                    session = %self.session_id,
                    region = %region.identifier,
                    %crossing,
                    "crossing satisfies no predicate"
                );
            }
            return;
        }

        for predicate in hits {
            let mask = self.mask_for(&predicate);
            tracing::debug!(
                session = %self.session_id,
                predicate = %predicate.id(),
                region = %region.identifier,
                %crossing,
                "predicate triggered"
            );
            let event = Triggered::new(predicate, crossing, region.identifier.clone(), mask);
            match self.out.try_send(event) {
                Ok(()) => {
                    self.shared.emitted_events.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(session = %self.session_id, "consumer is not keeping up; emission dropped");
                }
            }
        }
    }

    fn mask_for(&self, predicate: &PositionPredicate) -> MaskGuard {
        if !predicate.is_always() {
            return MaskGuard::noop();
        }
        let id = predicate.id().to_string();
        match self.mask_policy {
            MaskPolicy::Disabled => MaskGuard::noop(),
            MaskPolicy::WhileActive => {
                if !self.masks.holds(&id) {
                    MaskGuard::engage_in(
                        Arc::clone(&self.predicate_store),
                        HashSet::from([id]),
                        &self.masks,
                    )
                    .keep();
                }
                MaskGuard::noop()
            }
            MaskPolicy::UntilHandled => MaskGuard::engage_in(
                Arc::clone(&self.predicate_store),
                HashSet::from([id]),
                &self.masks,
            ),
        }
    }

    /// A failure without a region is taken to concern the session.
    fn concerns(&self, failure: &MonitoringFailure) -> bool {
        let Some(region) = &failure.region else {
            return true;
        };
        if self.regions.contains(region) {
            return true;
        }
        region
            .abstracted_region()
            .map(|r| r.identifier())
            .is_some_and(|canonical| self.regions.iter().any(|own| own.identifier == canonical))
    }

    fn terminate(&mut self, error: SessionError) {
        tracing::warn!(session = %self.session_id, error = %error, "session terminated");
        self.teardown(SessionState::Terminated(error));
    }

    /// Releases every registration the session made. Runs at most once.
    fn teardown(&mut self, final_state: SessionState) {
        let Some(claim) = self.claim.take() else {
            return;
        };

        if !self.regions.is_empty() {
            self.region_store.stop_monitoring(&self.regions);
        }
        if !self.requests.is_empty() {
            self.predicate_store.cancel(&self.requests);
        }
        let unmasked = self.masks.release_all(self.predicate_store.as_ref());

        tracing::info!(
            session = %self.session_id,
            regions = self.regions.len(),
            requests = self.requests.len(),
            emitted = self.shared.emitted_events(),
            dropped = self.shared.dropped_events(),
            unmasked,
            "session torn down"
        );

        // Release the slot first so a woken `cancel()` sees the engine idle.
        drop(claim);
        self.shared.set_state(final_state);
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.teardown(SessionState::TornDown);
    }
}
