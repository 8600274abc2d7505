//! Session and emission types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::MaskGuard;
use crate::error::SessionError;
use crate::predicate::{Position, PositionPredicate};

/// Unique identifier for a monitoring session.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a physical boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    /// The device entered the region.
    Entered,
    /// The device left the region.
    Exited,
}

impl Crossing {
    /// Position a predicate must have to be satisfied by this crossing.
    #[must_use]
    pub const fn satisfies(self) -> Position {
        match self {
            Self::Entered => Position::Inside,
            Self::Exited => Position::Outside,
        }
    }
}

impl fmt::Display for Crossing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entered => write!(f, "entered"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Lifecycle of a session after it became active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Registrations are live and events are flowing.
    Active,
    /// The consumer cancelled; every registration was released.
    TornDown,
    /// The platform stopped monitoring mid-session; registrations were released.
    Terminated(SessionError),
}

impl SessionState {
    /// Returns true while events can still arrive.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A predicate that became true.
///
/// For `Always` predicates the engine may hold the predicate's notification
/// masked while this value is alive (see `MaskPolicy::UntilHandled`); drop it
/// once the transition has been handled.
#[derive(Debug)]
pub struct Triggered {
    predicate: PositionPredicate,
    crossing: Crossing,
    region: String,
    observed_at: DateTime<Utc>,
    mask: MaskGuard,
}

impl Triggered {
    pub(crate) fn new(
        predicate: PositionPredicate,
        crossing: Crossing,
        region: String,
        mask: MaskGuard,
    ) -> Self {
        Self {
            predicate,
            crossing,
            region,
            observed_at: Utc::now(),
            mask,
        }
    }

    /// The satisfied predicate.
    #[must_use]
    pub const fn predicate(&self) -> &PositionPredicate {
        &self.predicate
    }

    /// The crossing that satisfied it.
    #[must_use]
    pub const fn crossing(&self) -> Crossing {
        self.crossing
    }

    /// Native identifier of the crossed region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// When the engine observed the crossing.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Returns true while this emission holds the notification masked.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_engaged()
    }

    /// Marks the transition handled: unmasks and returns the predicate.
    #[must_use]
    pub fn into_predicate(self) -> PositionPredicate {
        self.mask.release();
        self.predicate
    }

    /// Returns the predicate but leaves its notification masked until teardown.
    #[must_use]
    pub fn keep_masked(self) -> PositionPredicate {
        self.mask.keep();
        self.predicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_direction_maps_to_position() {
        assert_eq!(Crossing::Entered.satisfies(), Position::Inside);
        assert_eq!(Crossing::Exited.satisfies(), Position::Outside);
    }

    #[test]
    fn only_active_state_is_active() {
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::TornDown.is_active());
        assert!(!SessionState::Terminated(SessionError::AlreadyActive).is_active());
    }
}
