//! Position predicates: the unit of desired monitoring.
//!
//! A predicate says "tell me when the device is `position` relative to
//! `region`", and how loudly (`activation`). Its identity is derived from those
//! three fields, so equal predicates built independently are the same
//! predicate for the engine and for both adapters.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use blake3::Hasher as Blake3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::region::Region;

/// Side of the region boundary that satisfies a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Satisfied when the device enters the region.
    Inside,
    /// Satisfied when the device leaves the region.
    Outside,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inside => write!(f, "inside"),
            Self::Outside => write!(f, "outside"),
        }
    }
}

/// Sound played with a system notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum NotificationSound {
    /// Platform default sound.
    #[default]
    Default,
    /// A named sound resource.
    Named(String),
}

/// Content of the system notification shown for an `Always` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Presentation {
    title: String,
    body: String,
    #[serde(default)]
    sound: NotificationSound,
}

impl Presentation {
    /// Creates a presentation.
    ///
    /// # Errors
    /// Returns `EmptyPresentationTitle` when the title is blank.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        sound: NotificationSound,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyPresentationTitle);
        }
        Ok(Self {
            title,
            body: body.into(),
            sound,
        })
    }

    /// Notification title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Notification body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Notification sound.
    #[must_use]
    pub const fn sound(&self) -> &NotificationSound {
        &self.sound
    }
}

/// How a satisfied predicate is surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "presentation", rename_all = "snake_case")]
pub enum Activation {
    /// Only observed by a running app; no system alert.
    WhenInUse,
    /// Also shown as a system notification, even when the app is not running.
    Always(Presentation),
}

impl Activation {
    /// The presentation for `Always` activations.
    #[must_use]
    pub const fn presentation(&self) -> Option<&Presentation> {
        match self {
            Self::WhenInUse => None,
            Self::Always(presentation) => Some(presentation),
        }
    }

    /// Returns true for `Always` activations.
    #[must_use]
    pub const fn is_always(&self) -> bool {
        matches!(self, Self::Always(_))
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WhenInUse => write!(f, "when in use"),
            Self::Always(_) => write!(f, "always"),
        }
    }
}

/// Stable identity of a predicate.
///
/// Derived from the first 16 bytes of a blake3 digest over the predicate's
/// canonical encoding. Its string form is the notification request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateId(Uuid);

impl PredicateId {
    const DOMAIN: &'static [u8] = b"regionwatch.position-predicate.v1";

    /// Derives the identity of `(position, region, activation)`.
    #[must_use]
    pub fn derive(position: Position, region: &Region, activation: &Activation) -> Self {
        let mut h = Blake3::new();
        h.update(Self::DOMAIN);
        h.update(&[match position {
            Position::Inside => 1,
            Position::Outside => 2,
        }]);
        update_field(&mut h, &region.identifier());
        match activation {
            Activation::WhenInUse => {
                h.update(&[0]);
            }
            Activation::Always(p) => {
                h.update(&[1]);
                update_field(&mut h, &p.title);
                update_field(&mut h, &p.body);
                match &p.sound {
                    NotificationSound::Default => {
                        h.update(&[0]);
                    }
                    NotificationSound::Named(name) => {
                        h.update(&[1]);
                        update_field(&mut h, name);
                    }
                }
            }
        }

        let digest = h.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

// Length-prefixed so adjacent fields cannot run into each other.
fn update_field(h: &mut Blake3, value: &str) {
    h.update(&(value.len() as u64).to_le_bytes());
    h.update(value.as_bytes());
}

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PredicateId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidPredicateId {
                value: s.to_string(),
            })
    }
}

/// A desired monitoring intent.
///
/// Equality and hashing use the derived [`PredicateId`] only.
///
/// # Examples
///
/// ```
/// use regionwatch::{Activation, Location, Position, PositionPredicate, Region};
///
/// let region = Region::circle(Location::new(48.81, 2.30).unwrap(), 50.0).unwrap();
/// let a = PositionPredicate::new(Position::Inside, region.clone(), Activation::WhenInUse);
/// let b = PositionPredicate::new(Position::Inside, region, Activation::WhenInUse);
/// assert_eq!(a, b);
/// assert_eq!(a.id(), b.id());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PredicateRepr", into = "PredicateRepr")]
pub struct PositionPredicate {
    id: PredicateId,
    position: Position,
    region: Region,
    activation: Activation,
}

#[derive(Serialize, Deserialize)]
struct PredicateRepr {
    position: Position,
    region: Region,
    activation: Activation,
}

impl From<PredicateRepr> for PositionPredicate {
    fn from(value: PredicateRepr) -> Self {
        Self::new(value.position, value.region, value.activation)
    }
}

impl From<PositionPredicate> for PredicateRepr {
    fn from(value: PositionPredicate) -> Self {
        Self {
            position: value.position,
            region: value.region,
            activation: value.activation,
        }
    }
}

impl PositionPredicate {
    /// Creates a predicate; its identity is derived from the three fields.
    #[must_use]
    pub fn new(position: Position, region: Region, activation: Activation) -> Self {
        let id = PredicateId::derive(position, &region, &activation);
        Self {
            id,
            position,
            region,
            activation,
        }
    }

    /// Satisfied when entering `region`.
    #[must_use]
    pub fn inside(region: Region, activation: Activation) -> Self {
        Self::new(Position::Inside, region, activation)
    }

    /// Satisfied when leaving `region`.
    #[must_use]
    pub fn outside(region: Region, activation: Activation) -> Self {
        Self::new(Position::Outside, region, activation)
    }

    /// Rebuilds a predicate whose identity was recorded elsewhere.
    ///
    /// Used when decoding native requests, where the presentation text may not
    /// survive but the identity must.
    pub(crate) const fn with_id(
        id: PredicateId,
        position: Position,
        region: Region,
        activation: Activation,
    ) -> Self {
        Self {
            id,
            position,
            region,
            activation,
        }
    }

    /// Stable identity.
    #[must_use]
    pub const fn id(&self) -> PredicateId {
        self.id
    }

    /// Satisfying side of the boundary.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Monitored region.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Activation mode.
    #[must_use]
    pub const fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Returns true when a system notification is scheduled for this predicate.
    #[must_use]
    pub const fn is_always(&self) -> bool {
        self.activation.is_always()
    }
}

impl PartialEq for PositionPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PositionPredicate {}

impl Hash for PositionPredicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PositionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} when {} {}",
            self.activation, self.position, self.region
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::location::Location;

    fn region() -> Region {
        Region::circle(Location::new(48.81, 2.30).unwrap(), 50.0).unwrap()
    }

    fn always(title: &str) -> Activation {
        Activation::Always(Presentation::new(title, "body", NotificationSound::Default).unwrap())
    }

    #[test]
    fn identity_is_stable_across_constructions() {
        let a = PositionPredicate::inside(region(), always("Start X"));
        let b = PositionPredicate::inside(
            Region::circle(Location::named(48.81, 2.30, "X").unwrap(), 50.0).unwrap(),
            always("Start X"),
        );
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn activation_distinguishes_predicates() {
        let a = PositionPredicate::inside(region(), always("Start X"));
        let b = PositionPredicate::inside(region(), Activation::WhenInUse);
        let c = PositionPredicate::inside(region(), always("Start Y"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn position_distinguishes_predicates() {
        let a = PositionPredicate::inside(region(), Activation::WhenInUse);
        let b = PositionPredicate::outside(region(), Activation::WhenInUse);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        let a = Presentation::new("ab", "c", NotificationSound::Default).unwrap();
        let b = Presentation::new("a", "bc", NotificationSound::Default).unwrap();
        let pa = PositionPredicate::inside(region(), Activation::Always(a));
        let pb = PositionPredicate::inside(region(), Activation::Always(b));
        assert_ne!(pa.id(), pb.id());
    }

    #[test]
    fn predicate_id_parses_its_display_form() {
        let p = PositionPredicate::outside(region(), Activation::WhenInUse);
        let parsed: PredicateId = p.id().to_string().parse().unwrap();
        assert_eq!(parsed, p.id());
        assert!("not-a-uuid".parse::<PredicateId>().is_err());
    }

    #[test]
    fn presentation_requires_title() {
        assert_eq!(
            Presentation::new("  ", "b", NotificationSound::Default).unwrap_err(),
            ValidationError::EmptyPresentationTitle
        );
    }

    #[test]
    fn deserialized_predicate_recomputes_identity() {
        let p = PositionPredicate::inside(region(), always("Start X"));
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("\"id\""));
        let back: PositionPredicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), p.id());
    }
}
