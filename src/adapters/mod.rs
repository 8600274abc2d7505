//! Adapter contracts for the external geofencing and notification services.
//!
//! `traits` defines the capability shape the engine consumes, `mask` the
//! delivery-time masking helpers, and `memory` reference implementations.

mod mask;
mod memory;
mod traits;

pub(crate) use mask::MaskLedger;
pub use mask::{MaskGuard, MaskedIdentifiers, PresentationOptions};
pub use memory::{InMemoryPredicateStore, InMemoryRegionStore};
pub use traits::{
    AuthorizationStatus, Completion, MonitoringFailure, Outcome, PredicateStore, RegionCrossing,
    RegionStore,
};
