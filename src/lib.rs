//! # regionwatch - declarative geofence monitoring
//!
//! An application declares the position predicates it cares about ("tell me
//! when the device enters this circle, and show an alert even if the app is
//! not running") and receives a stream of the predicates that become true.
//! The engine reconciles the declared set against an external geofencing
//! service and an external notification service, merges their events back
//! into predicates, and masks system alerts the app already handled itself.
//!
//! ## Core Concepts
//!
//! - **Region**: a circular geofence or a beacon-proximity area
//! - **PositionPredicate**: inside/outside a region, silent or alerted
//! - **Reconciler**: registers a predicate set and runs the session
//! - **PredicateStream**: the consumer's end of a session
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use regionwatch::{
//!     Activation, InMemoryPredicateStore, InMemoryRegionStore, Location, NotificationSound,
//!     PositionPredicate, Presentation, Reconciler, Region,
//! };
//!
//! # fn main() -> regionwatch::WatchResult<()> {
//! let regions = Arc::new(InMemoryRegionStore::new());
//! let notifications = Arc::new(InMemoryPredicateStore::new());
//! let engine = Reconciler::new(regions.clone(), notifications.clone());
//!
//! let office = Region::circle(Location::new(48.81, 2.30)?, 50.0)?;
//! let arrive = PositionPredicate::inside(
//!     office.clone(),
//!     Activation::Always(Presentation::new("Start X", "", NotificationSound::Default)?),
//! );
//!
//! let stream = engine.monitor([arrive.clone()])?;
//! regions.enter(&office.identifier());
//!
//! let triggered = stream.recv_timeout(Duration::from_secs(1))?;
//! assert_eq!(triggered.predicate(), &arrive);
//! stream.cancel()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Model
pub mod location;
pub mod native;
pub mod predicate;
pub mod region;

// Engine
pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;

/// Subscriber installation for binaries and tests.
#[cfg(feature = "subscriber")]
pub mod logging;

// Re-export primary types at crate root for convenience
pub use adapters::{
    AuthorizationStatus, Completion, InMemoryPredicateStore, InMemoryRegionStore, MaskGuard,
    MaskedIdentifiers, MonitoringFailure, Outcome, PredicateStore, PresentationOptions,
    RegionCrossing, RegionStore,
};
pub use config::{EngineConfig, MaskPolicy, DEFAULT_CATEGORY};
pub use engine::Reconciler;
pub use error::{
    AdapterError, RegistrationError, SessionError, ValidationError, WatchError, WatchResult,
};
pub use location::{Designation, Location};
pub use monitor::{Crossing, PredicateStream, SessionId, SessionState, Triggered};
pub use native::{NativeRegion, NativeRequest};
pub use predicate::{
    Activation, NotificationSound, Position, PositionPredicate, PredicateId, Presentation,
};
pub use region::{BeaconIdentifier, BeaconMajor, BeaconMinor, CircularArea, Region};
