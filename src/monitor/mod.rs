//! Monitoring sessions.
//!
//! A session turns a desired predicate set into registrations (`plan`),
//! waits for every registration outcome (`registration`), then runs a worker
//! that resolves region crossings back to predicates (`resolver`,
//! `dispatcher`) and hands them to the consumer's [`PredicateStream`].

/// Session worker and teardown.
mod dispatcher;
/// Session and emission types.
pub mod events;
/// Desired predicates to registrations.
pub mod plan;
/// Registration fan-in.
mod registration;
/// Region events back to predicates.
pub mod resolver;
/// Consumer stream handle.
pub mod stream;

pub(crate) use dispatcher::{ActiveClaim, ControlMsg, SessionShared, SessionWorker, Subscriptions};
pub(crate) use registration::join_outcomes;

pub use events::{Crossing, SessionId, SessionState, Triggered};
pub use plan::ReconciliationPlan;
pub use resolver::ResolutionTable;
pub use stream::PredicateStream;
