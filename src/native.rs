//! Native representations exchanged with the platform services.
//!
//! The translation in both directions is pure. Encoding always succeeds;
//! decoding returns `None` for any shape that does not map onto exactly one
//! abstract value, and never panics.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::Location;
use crate::predicate::{
    Activation, NotificationSound, Position, PositionPredicate, PredicateId, Presentation,
};
use crate::region::{BeaconIdentifier, BeaconMajor, BeaconMinor, Region};

/// Native circular region geometry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircularGeometry {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

/// Native beacon identity constraint.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconConstraint {
    pub uuid: Uuid,
    pub major: Option<u16>,
    pub minor: Option<u16>,
}

impl From<&BeaconIdentifier> for BeaconConstraint {
    fn from(value: &BeaconIdentifier) -> Self {
        Self {
            uuid: value.uuid,
            major: value.major_value(),
            minor: value.minor_value(),
        }
    }
}

impl BeaconConstraint {
    /// Decodes the constraint; a minor value without a major is ambiguous.
    #[must_use]
    pub const fn abstracted(&self) -> Option<BeaconIdentifier> {
        let major = match (self.major, self.minor) {
            (None, None) => BeaconMajor::Any,
            (None, Some(_)) => return None,
            (Some(major), None) => BeaconMajor::Value {
                major,
                minor: BeaconMinor::Any,
            },
            (Some(major), Some(minor)) => BeaconMajor::Value {
                major,
                minor: BeaconMinor::Value(minor),
            },
        };
        Some(BeaconIdentifier {
            uuid: self.uuid,
            major,
        })
    }
}

/// A region as registered with the geofencing service.
///
/// Platforms key regions by identifier, so equality and hashing do too.
/// Exactly one of `circular` / `beacon` is expected to be set.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeRegion {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circular: Option<CircularGeometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beacon: Option<BeaconConstraint>,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

impl PartialEq for NativeRegion {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for NativeRegion {}

impl Hash for NativeRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl NativeRegion {
    fn encode(region: &Region, notify_on_entry: bool, notify_on_exit: bool) -> Self {
        let (circular, beacon) = match region {
            Region::Circle(area) => (
                Some(CircularGeometry {
                    latitude: area.center().latitude(),
                    longitude: area.center().longitude(),
                    radius: area.radius(),
                }),
                None,
            ),
            Region::BeaconArea(identifier) => (None, Some(BeaconConstraint::from(identifier))),
        };
        Self {
            identifier: region.identifier(),
            circular,
            beacon,
            notify_on_entry,
            notify_on_exit,
        }
    }

    /// A region known only by its identifier, e.g. one the platform reports
    /// without geometry. Decodes to nothing.
    #[must_use]
    pub fn identified(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            circular: None,
            beacon: None,
            notify_on_entry: false,
            notify_on_exit: false,
        }
    }

    /// Registration used for monitoring: both boundaries are watched so that
    /// predicates of either position sharing the region can be observed.
    #[must_use]
    pub fn monitoring(region: &Region) -> Self {
        Self::encode(region, true, true)
    }

    /// Registration bound to a single predicate's side of the boundary.
    #[must_use]
    pub fn for_predicate(predicate: &PositionPredicate) -> Self {
        match predicate.position() {
            Position::Inside => Self::encode(predicate.region(), true, false),
            Position::Outside => Self::encode(predicate.region(), false, true),
        }
    }

    /// Decodes the geometry, if it is exactly one recognized shape.
    #[must_use]
    pub fn abstracted_region(&self) -> Option<Region> {
        match (&self.circular, &self.beacon) {
            (Some(_), Some(_)) | (None, None) => None,
            (Some(circle), None) => {
                let center = Location::new(circle.latitude, circle.longitude).ok()?;
                Region::circle(center, circle.radius).ok()
            }
            (None, Some(beacon)) => beacon.abstracted().map(Region::BeaconArea),
        }
    }

    /// Decodes the position from the notify flags; both or neither is ambiguous.
    #[must_use]
    pub const fn abstracted_position(&self) -> Option<Position> {
        match (self.notify_on_entry, self.notify_on_exit) {
            (true, false) => Some(Position::Inside),
            (false, true) => Some(Position::Outside),
            (true, true) | (false, false) => None,
        }
    }

    /// Decodes a `WhenInUse` predicate from a single-sided registration.
    #[must_use]
    pub fn abstracted_predicate(&self) -> Option<PositionPredicate> {
        let region = self.abstracted_region()?;
        let position = self.abstracted_position()?;
        Some(PositionPredicate::new(position, region, Activation::WhenInUse))
    }

    /// Returns true when the identifier is the canonical identifier of the
    /// decoded geometry, i.e. the region was registered by this crate.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.abstracted_region()
            .is_some_and(|region| region.identifier() == self.identifier)
    }
}

/// Notification content as handed to the notification service.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: NotificationSound,
}

/// Location trigger attached to a notification request.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationTrigger {
    pub region: NativeRegion,
    pub repeats: bool,
}

/// A notification request as scheduled with the notification service.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRequest {
    pub identifier: String,
    pub category: String,
    pub content: NotificationContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<LocationTrigger>,
}

impl NativeRequest {
    /// Builds the repeating location-triggered request for an `Always` predicate.
    ///
    /// Returns `None` for `WhenInUse` predicates, which never schedule anything.
    #[must_use]
    pub fn for_predicate(predicate: &PositionPredicate, category: &str) -> Option<Self> {
        let presentation = predicate.activation().presentation()?;
        Some(Self {
            identifier: predicate.id().to_string(),
            category: category.to_string(),
            content: NotificationContent {
                title: presentation.title().to_string(),
                body: presentation.body().to_string(),
                sound: presentation.sound().clone(),
            },
            trigger: Some(LocationTrigger {
                region: NativeRegion::for_predicate(predicate),
                repeats: true,
            }),
        })
    }

    /// The trigger region, when the request belongs to `category`.
    #[must_use]
    pub fn native_region(&self, category: &str) -> Option<&NativeRegion> {
        if self.category != category {
            return None;
        }
        self.trigger.as_ref().map(|t| &t.region)
    }

    /// Decodes the `Always` predicate this request was built from.
    ///
    /// Identity comes from the request identifier; the presentation is rebuilt
    /// from the content. A blank title cannot be an `Always` presentation, so
    /// such a request has no abstraction.
    #[must_use]
    pub fn abstracted_predicate(&self, category: &str) -> Option<PositionPredicate> {
        let region_native = self.native_region(category)?;
        let region = region_native.abstracted_region()?;
        let position = region_native.abstracted_position()?;
        let id: PredicateId = self.identifier.parse().ok()?;

        let presentation = Presentation::new(
            self.content.title.clone(),
            self.content.body.clone(),
            self.content.sound.clone(),
        )
        .ok()?;

        Some(PositionPredicate::with_id(
            id,
            position,
            region,
            Activation::Always(presentation),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: &str = "regionwatch";

    fn circle() -> Region {
        Region::circle(Location::new(48.81, 2.30).unwrap(), 50.0).unwrap()
    }

    fn always() -> Activation {
        Activation::Always(
            Presentation::new("Start X", "Entered", NotificationSound::Named("chime".into()))
                .unwrap(),
        )
    }

    #[test]
    fn monitoring_region_watches_both_boundaries() {
        let native = NativeRegion::monitoring(&circle());
        assert!(native.notify_on_entry && native.notify_on_exit);
        assert_eq!(native.abstracted_position(), None);
        assert_eq!(native.abstracted_region(), Some(circle()));
        assert!(native.is_canonical());
    }

    #[test]
    fn predicate_region_encodes_position() {
        let inside = PositionPredicate::inside(circle(), Activation::WhenInUse);
        let outside = PositionPredicate::outside(circle(), Activation::WhenInUse);

        let n_in = NativeRegion::for_predicate(&inside);
        let n_out = NativeRegion::for_predicate(&outside);
        assert_eq!(n_in.abstracted_position(), Some(Position::Inside));
        assert_eq!(n_out.abstracted_position(), Some(Position::Outside));
        assert_eq!(n_in.abstracted_predicate(), Some(inside));
    }

    #[test]
    fn ambiguous_shapes_decode_to_none() {
        let mut native = NativeRegion::monitoring(&circle());
        native.beacon = Some(BeaconConstraint {
            uuid: Uuid::nil(),
            major: None,
            minor: None,
        });
        assert_eq!(native.abstracted_region(), None);

        native.circular = None;
        native.beacon = None;
        assert_eq!(native.abstracted_region(), None);
    }

    #[test]
    fn invalid_geometry_decodes_to_none() {
        let mut native = NativeRegion::monitoring(&circle());
        native.circular = Some(CircularGeometry {
            latitude: 48.0,
            longitude: 2.0,
            radius: 0.0,
        });
        assert_eq!(native.abstracted_region(), None);
        assert!(!native.is_canonical());
    }

    #[test]
    fn beacon_minor_without_major_is_ambiguous() {
        let c = BeaconConstraint {
            uuid: Uuid::from_u128(7),
            major: None,
            minor: Some(3),
        };
        assert_eq!(c.abstracted(), None);

        let exact = BeaconIdentifier::exact(Uuid::from_u128(7), 1, 3);
        assert_eq!(BeaconConstraint::from(&exact).abstracted(), Some(exact));
    }

    #[test]
    fn foreign_identifier_is_not_canonical() {
        let mut native = NativeRegion::monitoring(&circle());
        native.identifier = "someone-else".to_string();
        assert!(!native.is_canonical());
    }

    #[test]
    fn when_in_use_has_no_request() {
        let p = PositionPredicate::inside(circle(), Activation::WhenInUse);
        assert!(NativeRequest::for_predicate(&p, CATEGORY).is_none());
    }

    #[test]
    fn request_is_repeating_and_keyed_by_identity() {
        let p = PositionPredicate::inside(circle(), always());
        let request = NativeRequest::for_predicate(&p, CATEGORY).unwrap();
        assert_eq!(request.identifier, p.id().to_string());
        assert_eq!(request.content.title, "Start X");
        let trigger = request.trigger.as_ref().unwrap();
        assert!(trigger.repeats);
        assert!(trigger.region.notify_on_entry);
        assert!(!trigger.region.notify_on_exit);
    }

    #[test]
    fn request_decodes_with_identity_preserved() {
        let p = PositionPredicate::outside(circle(), always());
        let mut request = NativeRequest::for_predicate(&p, CATEGORY).unwrap();

        let decoded = request.abstracted_predicate(CATEGORY).unwrap();
        assert_eq!(decoded, p);
        assert_eq!(decoded.activation(), p.activation());

        // Body text lost on the platform side: identity still holds.
        request.content.body.clear();
        let decoded = request.abstracted_predicate(CATEGORY).unwrap();
        assert_eq!(decoded.id(), p.id());
        assert!(decoded.is_always());
        assert_eq!(decoded.position(), Position::Outside);
        assert_eq!(decoded.region(), &circle());
    }

    #[test]
    fn request_with_blank_title_has_no_abstraction() {
        let p = PositionPredicate::inside(circle(), always());
        let mut request = NativeRequest::for_predicate(&p, CATEGORY).unwrap();
        request.content.title = "   ".to_string();
        assert!(request.abstracted_predicate(CATEGORY).is_none());
    }

    #[test]
    fn identified_region_decodes_to_nothing() {
        let native = NativeRegion::identified("lost-region");
        assert_eq!(native, NativeRegion::identified("lost-region"));
        assert!(native.abstracted_region().is_none());
        assert!(!native.is_canonical());
    }

    #[test]
    fn foreign_category_is_ignored() {
        let p = PositionPredicate::inside(circle(), always());
        let request = NativeRequest::for_predicate(&p, "other").unwrap();
        assert!(request.abstracted_predicate(CATEGORY).is_none());
        assert!(request.native_region(CATEGORY).is_none());
    }
}
