//! Geographic locations.
//!
//! A [`Location`] is a coordinate pair plus an optional human designation.
//! Equality and hashing only look at the coordinates: two locations naming the
//! same point are the same location, whatever they are called.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Human-facing designation of a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Designation {
    /// No designation is known.
    #[default]
    Unknown,
    /// A named place.
    Name(String),
}

impl fmt::Display for Designation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A point on the globe in degrees.
///
/// # Examples
///
/// ```
/// use regionwatch::Location;
///
/// let a = Location::named(48.809995, 2.300354, "Châtillon").unwrap();
/// let b = Location::new(48.809995, 2.300354).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LocationRepr", into = "LocationRepr")]
pub struct Location {
    latitude: f64,
    longitude: f64,
    designation: Designation,
}

#[derive(Serialize, Deserialize)]
struct LocationRepr {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    designation: Designation,
}

impl TryFrom<LocationRepr> for Location {
    type Error = ValidationError;

    fn try_from(value: LocationRepr) -> Result<Self, Self::Error> {
        Self::with_designation(value.latitude, value.longitude, value.designation)
    }
}

impl From<Location> for LocationRepr {
    fn from(value: Location) -> Self {
        Self {
            latitude: value.latitude,
            longitude: value.longitude,
            designation: value.designation,
        }
    }
}

impl Location {
    /// Creates an undesignated location.
    ///
    /// # Errors
    /// Returns `InvalidCoordinate` when a component is not finite or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        Self::with_designation(latitude, longitude, Designation::Unknown)
    }

    /// Creates a named location.
    ///
    /// # Errors
    /// Returns `InvalidCoordinate` when a component is not finite or out of range.
    pub fn named(
        latitude: f64,
        longitude: f64,
        name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::with_designation(latitude, longitude, Designation::Name(name.into()))
    }

    /// Creates a location with an explicit designation.
    ///
    /// # Errors
    /// Returns `InvalidCoordinate` when a component is not finite or out of range.
    pub fn with_designation(
        latitude: f64,
        longitude: f64,
        designation: Designation,
    ) -> Result<Self, ValidationError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(ValidationError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
            designation,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// The location's designation.
    #[must_use]
    pub const fn designation(&self) -> &Designation {
        &self.designation
    }

    // -0.0 and 0.0 are the same coordinate.
    fn coordinate_bits(&self) -> (u64, u64) {
        let norm = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        (norm(self.latitude), norm(self.longitude))
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.coordinate_bits() == other.coordinate_bits()
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coordinate_bits().hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.designation {
            Designation::Unknown => write!(f, "({:.6}, {:.6})", self.latitude, self.longitude),
            Designation::Name(name) => {
                write!(f, "{name} ({:.6}, {:.6})", self.latitude, self.longitude)
            }
        }
    }
}
