//! Capability contracts for the geofencing and notification services.
//!
//! The engine only ever talks to these traits. Implementations own the
//! platform registrations (and their persistence across restarts); the
//! in-memory versions in `memory` are reference implementations for tests and
//! embedded use.
//!
//! Asynchronous results are delivered over `crossbeam-channel` receivers, so
//! an adapter is free to answer from whatever thread the platform calls it on.

use std::collections::HashSet;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::monitor::Crossing;
use crate::native::{NativeRegion, NativeRequest};

/// Authorization reported by a platform capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// The user refused.
    Denied,
    /// A policy forbids use.
    Restricted,
    /// Allowed while the app is in use.
    WhenInUse,
    /// Allowed at any time.
    Always,
}

impl AuthorizationStatus {
    /// Returns false when registrations cannot possibly succeed.
    #[must_use]
    pub const fn permits_registration(&self) -> bool {
        !matches!(self, Self::Denied | Self::Restricted)
    }
}

/// Outcome of one region start or one request schedule.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub identifier: String,
    pub result: Result<(), AdapterError>,
}

impl Outcome {
    /// Successful registration of `identifier`.
    #[must_use]
    pub fn succeeded(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            result: Ok(()),
        }
    }

    /// Failed registration of `identifier`.
    #[must_use]
    pub fn failed(identifier: impl Into<String>, error: AdapterError) -> Self {
        Self {
            identifier: identifier.into(),
            result: Err(error),
        }
    }
}

/// A boundary crossing reported by the geofencing service.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCrossing {
    pub crossing: Crossing,
    pub region: NativeRegion,
}

/// The platform stopped monitoring after it had started.
///
/// `region` is `None` when the platform could not say which region failed.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringFailure {
    pub region: Option<NativeRegion>,
    pub error: AdapterError,
}

/// A single value delivered later.
#[derive(Debug)]
pub struct Completion<T> {
    rx: Receiver<T>,
}

impl<T> Completion<T> {
    /// Creates a completion and the sender that resolves it.
    #[must_use]
    pub fn channel() -> (Sender<T>, Self) {
        let (tx, rx) = bounded(1);
        (tx, Self { rx })
    }

    /// A completion that is already resolved.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(value);
        completion
    }

    /// Waits for the value.
    ///
    /// # Errors
    /// Returns `Disconnected` if the sender was dropped without resolving.
    pub fn wait(self) -> Result<T, AdapterError> {
        self.rx.recv().map_err(|_| AdapterError::Disconnected {
            path: "completion".to_string(),
        })
    }

    /// Waits for the value, at most `timeout`.
    ///
    /// # Errors
    /// Returns `Disconnected` on a dropped sender and `Platform` on timeout.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, AdapterError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => AdapterError::platform(
                -1,
                format!("completion timed out after {}ms", timeout.as_millis()),
            ),
            RecvTimeoutError::Disconnected => AdapterError::Disconnected {
                path: "completion".to_string(),
            },
        })
    }
}

/// Contract of the external geofencing service.
pub trait RegionStore: Send + Sync {
    /// Current authorization for region monitoring.
    fn authorization(&self) -> AuthorizationStatus;

    /// Regions the platform is monitoring right now (for any owner).
    fn monitored_regions(&self) -> Result<HashSet<NativeRegion>, AdapterError>;

    /// Starts monitoring `regions`.
    ///
    /// Exactly one [`Outcome`] per region is sent on the returned receiver,
    /// in any order, possibly from another thread.
    fn start_monitoring(&self, regions: Vec<NativeRegion>) -> Receiver<Outcome>;

    /// Stops monitoring `regions`. Unknown regions are ignored.
    fn stop_monitoring(&self, regions: &[NativeRegion]);

    /// New subscription to entries and exits, in the order the platform
    /// reported them. Fires once per physical crossing.
    fn crossings(&self) -> Receiver<RegionCrossing>;

    /// New subscription to monitoring failures reported after start.
    fn failures(&self) -> Receiver<MonitoringFailure>;
}

/// Contract of the external notification service.
pub trait PredicateStore: Send + Sync {
    /// Current authorization for notifications.
    fn authorization(&self) -> AuthorizationStatus;

    /// Requests currently scheduled (for any owner).
    fn pending_requests(&self) -> Completion<Vec<NativeRequest>>;

    /// Schedules `requests`; one [`Outcome`] per request, in any order.
    fn schedule(&self, requests: Vec<NativeRequest>) -> Receiver<Outcome>;

    /// Cancels pending requests. Unknown identifiers are ignored.
    fn cancel(&self, identifiers: &HashSet<String>);

    /// Suppresses presentation for `identifiers` and withdraws any delivered
    /// but unseen notification for them.
    fn mask(&self, identifiers: &HashSet<String>);

    /// Restores normal presentation for `identifiers`.
    fn unmask(&self, identifiers: &HashSet<String>);
}
