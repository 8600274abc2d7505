//! Crossing resolution: native region events back to predicates.

use std::collections::HashMap;

use crate::native::NativeRegion;
use crate::predicate::PositionPredicate;

use super::events::Crossing;

/// Routing table from native region identifier to the session's predicates.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTable {
    routes: HashMap<String, Vec<PositionPredicate>>,
}

impl ResolutionTable {
    /// Wraps a routing table built by the plan.
    #[must_use]
    pub const fn new(routes: HashMap<String, Vec<PositionPredicate>>) -> Self {
        Self { routes }
    }

    /// Number of routed regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true when no region is routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Predicates that became true because of `crossing` over `region`.
    ///
    /// An entry satisfies `Inside` predicates and an exit satisfies `Outside`
    /// ones. Events for unknown identifiers fall back to the canonical
    /// identifier of the decoded geometry; anything else resolves to nothing.
    #[must_use]
    pub fn resolve(&self, crossing: Crossing, region: &NativeRegion) -> Vec<&PositionPredicate> {
        let Some(route) = self.route_for(region) else {
            return Vec::new();
        };
        let wanted = crossing.satisfies();
        route.iter().filter(|p| p.position() == wanted).collect()
    }

    fn route_for(&self, region: &NativeRegion) -> Option<&Vec<PositionPredicate>> {
        if let Some(route) = self.routes.get(&region.identifier) {
            return Some(route);
        }
        let canonical = region.abstracted_region()?.identifier();
        let route = self.routes.get(&canonical);
        if route.is_some() {
            tracing::debug!(
                reported = %region.identifier,
                canonical = %canonical,
                "resolved region by geometry"
            );
        }
        route
    }
}
