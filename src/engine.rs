//! Reconciliation engine.
//!
//! [`Reconciler::monitor`] drives a session from `Idle` through `Registering`
//! to `Active`: it checks authorization, prunes owned leftovers, subscribes to
//! crossings, registers every region and `Always` request, waits for every
//! outcome, and only then hands the session to its worker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::adapters::{MaskGuard, MaskLedger, PredicateStore, RegionStore};
use crate::config::EngineConfig;
use crate::error::{SessionError, WatchError, WatchResult};
use crate::monitor::{
    join_outcomes, ActiveClaim, ControlMsg, PredicateStream, ReconciliationPlan, SessionId,
    SessionShared, SessionWorker, Subscriptions,
};
use crate::native::NativeRegion;
use crate::predicate::PositionPredicate;
use crate::region::Region;

/// Turns desired predicate sets into monitoring sessions.
///
/// One engine per pair of adapters; at most one session is active at a time.
#[derive(Clone)]
pub struct Reconciler {
    regions: Arc<dyn RegionStore>,
    predicates: Arc<dyn PredicateStore>,
    config: EngineConfig,
    active: Arc<AtomicBool>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create an engine over the given adapters with the default configuration.
    #[must_use]
    pub fn new(regions: Arc<dyn RegionStore>, predicates: Arc<dyn PredicateStore>) -> Self {
        Self {
            regions,
            predicates,
            config: EngineConfig::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an engine with an explicit configuration.
    ///
    /// # Errors
    /// Returns a validation error if the configuration is invalid.
    pub fn with_config(
        regions: Arc<dyn RegionStore>,
        predicates: Arc<dyn PredicateStore>,
        config: EngineConfig,
    ) -> WatchResult<Self> {
        config.validate()?;
        Ok(Self {
            regions,
            predicates,
            config,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a reference to the region store.
    pub fn region_store(&self) -> &Arc<dyn RegionStore> {
        &self.regions
    }

    /// Get a reference to the predicate store.
    pub fn predicate_store(&self) -> &Arc<dyn PredicateStore> {
        &self.predicates
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns true while a session is registering or active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Starts monitoring `predicates` and returns the stream of predicates that
    /// become true.
    ///
    /// Blocks until every region start and request schedule has answered.
    /// Registrations that succeeded before a failure are not rolled back.
    ///
    /// # Errors
    /// - `Session(AlreadyActive)` if another session is live.
    /// - `AdapterUnavailable` if a required capability is denied or restricted.
    /// - `Registration` carrying the first failed region or request.
    pub fn monitor<I>(&self, predicates: I) -> WatchResult<PredicateStream>
    where
        I: IntoIterator<Item = PositionPredicate>,
    {
        let desired: HashSet<PositionPredicate> = predicates.into_iter().collect();
        let claim = ActiveClaim::acquire(&self.active).ok_or(SessionError::AlreadyActive)?;
        let session_id = SessionId::new();
        let category = self.config.category_identifier.as_str();

        let plan = ReconciliationPlan::build(&desired, category);
        self.check_authorization(&plan)?;

        tracing::debug!(
            session = %session_id,
            predicates = desired.len(),
            regions = plan.region_count(),
            requests = plan.requests().len(),
            "registering"
        );

        // Crossings may race the start acknowledgments; subscribing first
        // buffers them until the worker runs.
        let subscriptions = Subscriptions::open(self.regions.as_ref());

        if self.config.prune_stale {
            self.prune_stale(&plan);
        }

        let request_ids = plan.request_identifiers();
        let (regions, requests, table) = plan.into_parts();
        let region_ids: HashSet<String> = regions.iter().map(|r| r.identifier.clone()).collect();

        let region_outcomes =
            (!regions.is_empty()).then(|| self.regions.start_monitoring(regions.clone()));
        let request_outcomes = (!requests.is_empty()).then(|| self.predicates.schedule(requests));

        let joined = join_outcomes(
            region_ids,
            region_outcomes,
            request_ids.clone(),
            request_outcomes,
        );
        if let Err(err) = joined {
            tracing::warn!(
                session = %session_id,
                identifier = %err.identifier(),
                error = %err,
                "registration failed; session not started"
            );
            return Err(err.into());
        }

        let (out_tx, out_rx) = bounded(self.config.stream_capacity);
        let (control_tx, control_rx) = bounded::<ControlMsg>(self.config.control_queue_capacity);
        let shared = Arc::new(SessionShared::new());

        let worker = SessionWorker {
            session_id,
            table,
            regions,
            requests: request_ids,
            region_store: Arc::clone(&self.regions),
            predicate_store: Arc::clone(&self.predicates),
            mask_policy: self.config.mask_policy,
            out: out_tx,
            shared: Arc::clone(&shared),
            claim: Some(claim),
            masks: MaskLedger::new(),
        };
        worker.spawn(subscriptions, control_rx)?;

        Ok(PredicateStream::new(
            session_id,
            out_rx,
            control_tx,
            shared,
            Duration::from_millis(self.config.teardown_timeout_ms),
        ))
    }

    /// Masks `predicate`'s notification until the returned guard is dropped.
    ///
    /// Use when the app handled a crossing itself and the scheduled
    /// notification for the same crossing would be redundant. `WhenInUse`
    /// predicates schedule nothing, so their guard is a no-op.
    pub fn handled(&self, predicate: &PositionPredicate) -> MaskGuard {
        if !predicate.is_always() {
            return MaskGuard::noop();
        }
        tracing::debug!(predicate = %predicate.id(), "masking handled predicate");
        MaskGuard::engage(
            Arc::clone(&self.predicates),
            HashSet::from([predicate.id().to_string()]),
        )
    }

    /// `Always` predicates currently scheduled in this engine's category,
    /// decoded from the notification service.
    ///
    /// # Errors
    /// Returns the adapter error if the pending requests cannot be read.
    pub fn scheduled_predicates(&self) -> WatchResult<Vec<PositionPredicate>> {
        let category = self.config.category_identifier.as_str();
        let pending = self.predicates.pending_requests().wait()?;
        let mut decoded: Vec<PositionPredicate> = pending
            .iter()
            .filter_map(|request| request.abstracted_predicate(category))
            .collect();
        decoded.sort_by_key(PositionPredicate::id);
        Ok(decoded)
    }

    /// Regions registered by this crate that the geofencing service is
    /// currently monitoring.
    ///
    /// # Errors
    /// Returns the adapter error if the monitored set cannot be read.
    pub fn monitored_regions(&self) -> WatchResult<Vec<Region>> {
        let monitored = self.regions.monitored_regions()?;
        let mut decoded: Vec<Region> = monitored
            .iter()
            .filter(|native| native.is_canonical())
            .filter_map(NativeRegion::abstracted_region)
            .collect();
        decoded.sort_by_key(Region::identifier);
        Ok(decoded)
    }

    fn check_authorization(&self, plan: &ReconciliationPlan) -> WatchResult<()> {
        if !plan.is_empty() {
            let status = self.regions.authorization();
            if !status.permits_registration() {
                return Err(WatchError::AdapterUnavailable {
                    capability: "region monitoring".to_string(),
                    status,
                });
            }
        }
        if !plan.requests().is_empty() {
            let status = self.predicates.authorization();
            if !status.permits_registration() {
                return Err(WatchError::AdapterUnavailable {
                    capability: "notifications".to_string(),
                    status,
                });
            }
        }
        Ok(())
    }

    /// Releases owned registrations the plan no longer needs. Best effort: a
    /// store that cannot be queried is left as is.
    fn prune_stale(&self, plan: &ReconciliationPlan) {
        match self.regions.monitored_regions() {
            Ok(monitored) => {
                let stale = plan.stale_regions(&monitored);
                if !stale.is_empty() {
                    tracing::debug!(count = stale.len(), "stopping stale regions");
                    self.regions.stop_monitoring(&stale);
                }
            }
            Err(e) => tracing::warn!(error = %e, "cannot list monitored regions; skipping prune"),
        }

        let category = self.config.category_identifier.as_str();
        match self.predicates.pending_requests().wait() {
            Ok(pending) => {
                let stale = plan.stale_requests(&pending, category);
                if !stale.is_empty() {
                    tracing::debug!(count = stale.len(), "cancelling stale requests");
                    self.predicates.cancel(&stale);
                }
            }
            Err(e) => tracing::warn!(error = %e, "cannot list pending requests; skipping prune"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AuthorizationStatus, InMemoryPredicateStore, InMemoryRegionStore};
    use crate::location::Location;
    use crate::native::NativeRequest;
    use crate::predicate::{Activation, NotificationSound, Presentation};

    fn circle(lat: f64) -> Region {
        Region::circle(Location::new(lat, 2.30).unwrap(), 50.0).unwrap()
    }

    fn always(title: &str) -> Activation {
        Activation::Always(Presentation::new(title, "", NotificationSound::Default).unwrap())
    }

    fn engine() -> (Reconciler, Arc<InMemoryRegionStore>, Arc<InMemoryPredicateStore>) {
        let regions = Arc::new(InMemoryRegionStore::new());
        let predicates = Arc::new(InMemoryPredicateStore::new());
        let engine = Reconciler::new(regions.clone(), predicates.clone());
        (engine, regions, predicates)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            stream_capacity: 0,
            ..EngineConfig::default()
        };
        let err = Reconciler::with_config(
            Arc::new(InMemoryRegionStore::new()),
            Arc::new(InMemoryPredicateStore::new()),
            config,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn session_flag_follows_stream_lifetime() {
        let (engine, _, _) = engine();
        let stream = engine.monitor(Vec::new()).unwrap();
        assert!(engine.is_active());
        stream.cancel().unwrap();
        assert!(!engine.is_active());
    }

    #[test]
    fn denied_notifications_only_matter_for_always() {
        let (engine, _, predicates) = engine();
        predicates.set_authorization(AuthorizationStatus::Denied);

        let quiet = PositionPredicate::inside(circle(1.0), Activation::WhenInUse);
        let stream = engine.monitor([quiet]).unwrap();
        stream.cancel().unwrap();

        let loud = PositionPredicate::inside(circle(1.0), always("A"));
        let err = engine.monitor([loud]).unwrap_err();
        assert!(err.is_unavailable());
        assert!(!engine.is_active());
    }

    #[test]
    fn handled_masks_only_always_predicates() {
        let (engine, _, predicates) = engine();
        let loud = PositionPredicate::inside(circle(1.0), always("A"));
        let quiet = PositionPredicate::inside(circle(1.0), Activation::WhenInUse);

        let guard = engine.handled(&loud);
        assert!(guard.is_engaged());
        assert!(predicates.masks().contains(&loud.id().to_string()));
        drop(guard);
        assert!(!predicates.masks().contains(&loud.id().to_string()));

        assert!(!engine.handled(&quiet).is_engaged());
    }

    #[test]
    fn scheduled_predicates_decode_owned_requests() {
        let (engine, _, predicates) = engine();
        let loud = PositionPredicate::outside(circle(3.0), always("Leave"));
        predicates.preload(NativeRequest::for_predicate(&loud, "regionwatch").unwrap());
        let other = PositionPredicate::inside(circle(4.0), always("Elsewhere"));
        predicates.preload(NativeRequest::for_predicate(&other, "foreign").unwrap());

        let decoded = engine.scheduled_predicates().unwrap();
        assert_eq!(decoded, vec![loud]);
    }

    #[test]
    fn monitored_regions_skip_foreign_identifiers() {
        let (engine, regions, _) = engine();
        regions.preload(NativeRegion::monitoring(&circle(5.0)));
        let mut foreign = NativeRegion::monitoring(&circle(6.0));
        foreign.identifier = "someone-else".to_string();
        regions.preload(foreign);

        assert_eq!(engine.monitored_regions().unwrap(), vec![circle(5.0)]);
    }
}
