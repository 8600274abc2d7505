//! Regions: circular geofences and beacon proximity areas.
//!
//! Regions compare by their geometric parameters. Each region also has a
//! canonical textual identifier, which is what native registrations are keyed by.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::location::Location;

/// Minor component of a beacon identity constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BeaconMinor {
    /// Any minor value matches.
    Any,
    /// Only this minor value matches.
    Value(u16),
}

/// Major component of a beacon identity constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BeaconMajor {
    /// Any major (and therefore any minor) value matches.
    Any,
    /// A specific major value, further narrowed by a minor constraint.
    Value {
        /// Major value.
        major: u16,
        /// Minor constraint.
        minor: BeaconMinor,
    },
}

/// Identifies a proximity (beacon) region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconIdentifier {
    /// Namespace UUID advertised by the beacons.
    pub uuid: Uuid,
    /// Major/minor narrowing.
    pub major: BeaconMajor,
}

impl BeaconIdentifier {
    /// Matches every beacon advertising `uuid`.
    #[must_use]
    pub const fn any(uuid: Uuid) -> Self {
        Self {
            uuid,
            major: BeaconMajor::Any,
        }
    }

    /// Matches beacons advertising `uuid` with the given major value.
    #[must_use]
    pub const fn with_major(uuid: Uuid, major: u16) -> Self {
        Self {
            uuid,
            major: BeaconMajor::Value {
                major,
                minor: BeaconMinor::Any,
            },
        }
    }

    /// Matches the single beacon `uuid`/`major`/`minor`.
    #[must_use]
    pub const fn exact(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self {
            uuid,
            major: BeaconMajor::Value {
                major,
                minor: BeaconMinor::Value(minor),
            },
        }
    }

    /// Major value, if constrained.
    #[must_use]
    pub const fn major_value(&self) -> Option<u16> {
        match self.major {
            BeaconMajor::Any => None,
            BeaconMajor::Value { major, .. } => Some(major),
        }
    }

    /// Minor value, if constrained.
    #[must_use]
    pub const fn minor_value(&self) -> Option<u16> {
        match self.major {
            BeaconMajor::Value {
                minor: BeaconMinor::Value(minor),
                ..
            } => Some(minor),
            _ => None,
        }
    }
}

/// A circle on the ground: center plus radius in meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CircularAreaRepr", into = "CircularAreaRepr")]
pub struct CircularArea {
    center: Location,
    radius: f64,
}

#[derive(Serialize, Deserialize)]
struct CircularAreaRepr {
    center: Location,
    radius: f64,
}

impl TryFrom<CircularAreaRepr> for CircularArea {
    type Error = ValidationError;

    fn try_from(value: CircularAreaRepr) -> Result<Self, Self::Error> {
        Self::new(value.center, value.radius)
    }
}

impl From<CircularArea> for CircularAreaRepr {
    fn from(value: CircularArea) -> Self {
        Self {
            center: value.center,
            radius: value.radius,
        }
    }
}

impl CircularArea {
    /// Creates a circular area.
    ///
    /// # Errors
    /// Returns `NonPositiveRadius` unless `radius` is finite and greater than zero.
    pub fn new(center: Location, radius: f64) -> Result<Self, ValidationError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(ValidationError::NonPositiveRadius { radius });
        }
        Ok(Self { center, radius })
    }

    /// Center of the circle.
    #[must_use]
    pub const fn center(&self) -> &Location {
        &self.center
    }

    /// Radius in meters.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }
}

impl PartialEq for CircularArea {
    fn eq(&self, other: &Self) -> bool {
        self.center == other.center && self.radius.to_bits() == other.radius.to_bits()
    }
}

impl Eq for CircularArea {}

impl Hash for CircularArea {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.center.hash(state);
        self.radius.to_bits().hash(state);
    }
}

/// A monitored area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    /// Circular geofence.
    Circle(CircularArea),
    /// Beacon proximity area.
    BeaconArea(BeaconIdentifier),
}

impl Region {
    /// Creates a circular region.
    ///
    /// # Errors
    /// Returns `NonPositiveRadius` unless `radius` is finite and greater than zero.
    pub fn circle(center: Location, radius: f64) -> Result<Self, ValidationError> {
        CircularArea::new(center, radius).map(Self::Circle)
    }

    /// Creates a beacon region.
    #[must_use]
    pub const fn beacon(identifier: BeaconIdentifier) -> Self {
        Self::BeaconArea(identifier)
    }

    /// Canonical identifier derived from the geometry.
    ///
    /// Equal regions always produce the same identifier; it never depends on
    /// the center's designation.
    #[must_use]
    pub fn identifier(&self) -> String {
        match self {
            Self::Circle(area) => format!(
                "circle:{},{}:{}",
                canonical_f64(area.center.latitude()),
                canonical_f64(area.center.longitude()),
                canonical_f64(area.radius),
            ),
            Self::BeaconArea(beacon) => {
                let major = beacon
                    .major_value()
                    .map_or_else(|| "*".to_string(), |v| v.to_string());
                let minor = beacon
                    .minor_value()
                    .map_or_else(|| "*".to_string(), |v| v.to_string());
                format!("beacon:{}:{major}:{minor}", beacon.uuid.hyphenated())
            }
        }
    }
}

fn canonical_f64(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else {
        v.to_string()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Circle(area) => write!(f, "{}m around {}", area.radius, area.center),
            Self::BeaconArea(beacon) => write!(f, "beacon area {}", beacon.uuid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn chatillon() -> Location {
        Location::named(48.809995, 2.300354, "Châtillon").unwrap()
    }

    #[test]
    fn circle_rejects_non_positive_radius() {
        assert!(Region::circle(chatillon(), 0.0).is_err());
        assert!(Region::circle(chatillon(), -1.0).is_err());
        assert!(Region::circle(chatillon(), f64::INFINITY).is_err());
    }

    #[test]
    fn circles_compare_by_geometry() {
        let a = Region::circle(chatillon(), 50.0).unwrap();
        let b = Region::circle(Location::new(48.809995, 2.300354).unwrap(), 50.0).unwrap();
        let c = Region::circle(chatillon(), 51.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.identifier(), b.identifier());

        let set: HashSet<Region> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn circle_identifier_is_canonical() {
        let region = Region::circle(chatillon(), 50.0).unwrap();
        assert_eq!(region.identifier(), "circle:48.809995,2.300354:50");
    }

    #[test]
    fn beacon_identifier_formats_wildcards() {
        let uuid = Uuid::from_u128(0x1234);
        let any = Region::beacon(BeaconIdentifier::any(uuid));
        let major = Region::beacon(BeaconIdentifier::with_major(uuid, 7));
        let exact = Region::beacon(BeaconIdentifier::exact(uuid, 7, 9));

        assert!(any.identifier().ends_with(":*:*"));
        assert!(major.identifier().ends_with(":7:*"));
        assert!(exact.identifier().ends_with(":7:9"));
        assert_ne!(any, major);
        assert_ne!(major, exact);
    }

    #[test]
    fn region_serde_validates_radius() {
        let json = r#"{"type":"circle","center":{"latitude":1.0,"longitude":2.0},"radius":-5.0}"#;
        assert!(serde_json::from_str::<Region>(json).is_err());

        let region = Region::circle(chatillon(), 50.0).unwrap();
        let back: Region = serde_json::from_value(serde_json::to_value(&region).unwrap()).unwrap();
        assert_eq!(region, back);
    }
}
