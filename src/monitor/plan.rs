//! Reconciliation plan: desired predicates to concrete registrations.
//!
//! Distinct predicates may share a region; the region is registered once and
//! the routing table keeps every predicate that references it.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::native::{NativeRegion, NativeRequest};
use crate::predicate::PositionPredicate;

use super::resolver::ResolutionTable;

/// Registrations required by a desired predicate set.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    regions: BTreeMap<String, NativeRegion>,
    routes: HashMap<String, Vec<PositionPredicate>>,
    requests: Vec<NativeRequest>,
}

impl ReconciliationPlan {
    /// Partitions `predicates` into region registrations and, for `Always`
    /// predicates, notification requests in `category`.
    #[must_use]
    pub fn build<'a>(
        predicates: impl IntoIterator<Item = &'a PositionPredicate>,
        category: &str,
    ) -> Self {
        let mut plan = Self::default();

        for predicate in predicates {
            let native = NativeRegion::monitoring(predicate.region());
            let id = native.identifier.clone();
            plan.regions.entry(id.clone()).or_insert(native);

            let route = plan.routes.entry(id).or_default();
            if !route.contains(predicate) {
                route.push(predicate.clone());
            }

            if let Some(request) = NativeRequest::for_predicate(predicate, category) {
                plan.requests.push(request);
            }
        }

        // Deterministic order for logs and tests.
        for route in plan.routes.values_mut() {
            route.sort_by_key(PositionPredicate::id);
        }
        plan.requests
            .sort_by(|a, b| a.identifier.cmp(&b.identifier));
        plan.requests.dedup_by(|a, b| a.identifier == b.identifier);

        plan
    }

    /// Returns true when nothing needs registering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region registrations, ordered by identifier.
    pub fn regions(&self) -> impl Iterator<Item = &NativeRegion> {
        self.regions.values()
    }

    /// Number of distinct regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Notification requests, ordered by identifier.
    #[must_use]
    pub fn requests(&self) -> &[NativeRequest] {
        &self.requests
    }

    /// Identifiers of the notification requests.
    #[must_use]
    pub fn request_identifiers(&self) -> HashSet<String> {
        self.requests.iter().map(|r| r.identifier.clone()).collect()
    }

    /// Predicates referencing the region `identifier`.
    #[must_use]
    pub fn predicates_for(&self, identifier: &str) -> &[PositionPredicate] {
        self.routes.get(identifier).map_or(&[], Vec::as_slice)
    }

    /// Owned regions (canonical identifiers) that this plan does not need.
    #[must_use]
    pub fn stale_regions<'a>(
        &self,
        monitored: impl IntoIterator<Item = &'a NativeRegion>,
    ) -> Vec<NativeRegion> {
        let mut stale: Vec<NativeRegion> = monitored
            .into_iter()
            .filter(|r| r.is_canonical() && !self.regions.contains_key(&r.identifier))
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        stale
    }

    /// Owned requests (matching `category`) that this plan does not need.
    #[must_use]
    pub fn stale_requests<'a>(
        &self,
        pending: impl IntoIterator<Item = &'a NativeRequest>,
        category: &str,
    ) -> HashSet<String> {
        let wanted = self.request_identifiers();
        pending
            .into_iter()
            .filter(|r| r.category == category && !wanted.contains(&r.identifier))
            .map(|r| r.identifier.clone())
            .collect()
    }

    /// Splits the plan into the registrations to issue and the routing table.
    #[must_use]
    pub fn into_parts(self) -> (Vec<NativeRegion>, Vec<NativeRequest>, ResolutionTable) {
        let regions = self.regions.into_values().collect();
        (regions, self.requests, ResolutionTable::new(self.routes))
    }
}
