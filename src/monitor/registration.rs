//! Registration join: waits for every region start and request schedule.

use std::collections::HashSet;

use crossbeam_channel::{never, select, Receiver};

use crate::adapters::Outcome;
use crate::error::{AdapterError, RegistrationError};

#[derive(Clone, Copy)]
enum Kind {
    Region,
    Request,
}

impl Kind {
    fn error(self, identifier: String, source: AdapterError) -> RegistrationError {
        match self {
            Self::Region => RegistrationError::Region { identifier, source },
            Self::Request => RegistrationError::Request { identifier, source },
        }
    }

    const fn path(self) -> &'static str {
        match self {
            Self::Region => "region_outcomes",
            Self::Request => "request_outcomes",
        }
    }
}

/// Outstanding identifiers of one kind and their outcome channel.
struct Pending {
    kind: Kind,
    waiting: HashSet<String>,
    rx: Receiver<Outcome>,
}

impl Pending {
    fn new(kind: Kind, waiting: HashSet<String>, rx: Option<Receiver<Outcome>>) -> Self {
        let rx = match rx {
            Some(rx) if !waiting.is_empty() => rx,
            _ => never(),
        };
        Self { kind, waiting, rx }
    }

    fn is_done(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Receiver to select on; `never` once every identifier has answered.
    fn channel(&self) -> Receiver<Outcome> {
        if self.is_done() {
            never()
        } else {
            self.rx.clone()
        }
    }

    fn record(&mut self, outcome: Outcome, first_failure: &mut Option<RegistrationError>) {
        if !self.waiting.remove(&outcome.identifier) {
            tracing::warn!(
                identifier = %outcome.identifier,
                "outcome for an identifier that was not requested"
            );
            return;
        }
        if let Err(source) = outcome.result {
            tracing::warn!(identifier = %outcome.identifier, error = %source, "registration failed");
            if first_failure.is_none() {
                *first_failure = Some(self.kind.error(outcome.identifier, source));
            }
        }
    }

    /// The adapter dropped its sender early: every outstanding identifier fails.
    fn disconnect(&mut self, first_failure: &mut Option<RegistrationError>) {
        let mut outstanding: Vec<String> = self.waiting.drain().collect();
        outstanding.sort();
        tracing::warn!(
            outstanding = outstanding.len(),
            channel = self.kind.path(),
            "outcome channel closed before every registration answered"
        );
        if first_failure.is_none() {
            if let Some(identifier) = outstanding.into_iter().next() {
                *first_failure = Some(self.kind.error(
                    identifier,
                    AdapterError::Disconnected {
                        path: self.kind.path().to_string(),
                    },
                ));
            }
        }
    }
}

/// Blocks until every region and request identifier has an outcome.
///
/// Outcomes are awaited in whatever order they arrive. The join always waits
/// for all of them (so no late outcome is left unread) and reports the first
/// failure it saw.
pub(crate) fn join_outcomes(
    regions: HashSet<String>,
    region_outcomes: Option<Receiver<Outcome>>,
    requests: HashSet<String>,
    request_outcomes: Option<Receiver<Outcome>>,
) -> Result<(), RegistrationError> {
    let mut region_side = Pending::new(Kind::Region, regions, region_outcomes);
    let mut request_side = Pending::new(Kind::Request, requests, request_outcomes);
    let mut first_failure = None;

    while !(region_side.is_done() && request_side.is_done()) {
        let region_rx = region_side.channel();
        let request_rx = request_side.channel();
        select! {
            recv(region_rx) -> msg => match msg {
                Ok(outcome) => region_side.record(outcome, &mut first_failure),
                Err(_) => region_side.disconnect(&mut first_failure),
            },
            recv(request_rx) -> msg => match msg {
                Ok(outcome) => request_side.record(outcome, &mut first_failure),
                Err(_) => request_side.disconnect(&mut first_failure),
            },
        }
    }

    first_failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_join_completes_immediately() {
        assert!(join_outcomes(HashSet::new(), None, HashSet::new(), None).is_ok());
    }

    #[test]
    fn outcomes_in_any_order_complete_the_join() {
        let (rtx, rrx) = unbounded();
        let (qtx, qrx) = unbounded();
        qtx.send(Outcome::succeeded("q1")).unwrap();
        rtx.send(Outcome::succeeded("r2")).unwrap();
        rtx.send(Outcome::succeeded("r1")).unwrap();

        let result = join_outcomes(ids(&["r1", "r2"]), Some(rrx), ids(&["q1"]), Some(qrx));
        assert!(result.is_ok());
    }

    #[test]
    fn first_failure_is_reported_after_all_answer() {
        let (rtx, rrx) = unbounded();
        rtx.send(Outcome::failed("r1", AdapterError::RegionLimitExceeded { limit: 20 }))
            .unwrap();
        rtx.send(Outcome::failed("r2", AdapterError::platform(5, "boom")))
            .unwrap();

        let err = join_outcomes(ids(&["r1", "r2"]), Some(rrx), HashSet::new(), None).unwrap_err();
        assert_eq!(err.identifier(), "r1");
        assert_eq!(err.adapter_error(), &AdapterError::RegionLimitExceeded { limit: 20 });
        assert!(rtx.is_empty());
    }

    #[test]
    fn request_failure_is_tagged_as_request() {
        let (qtx, qrx) = unbounded();
        qtx.send(Outcome::failed(
            "q1",
            AdapterError::Unauthorized {
                capability: "notifications".into(),
            },
        ))
        .unwrap();
        let err = join_outcomes(HashSet::new(), None, ids(&["q1"]), Some(qrx)).unwrap_err();
        assert!(matches!(err, RegistrationError::Request { .. }));
    }

    #[test]
    fn closed_channel_fails_outstanding_identifiers() {
        let (rtx, rrx) = unbounded();
        rtx.send(Outcome::succeeded("r1")).unwrap();
        drop(rtx);

        let err = join_outcomes(ids(&["r1", "r2"]), Some(rrx), HashSet::new(), None).unwrap_err();
        assert_eq!(err.identifier(), "r2");
        assert!(matches!(err.adapter_error(), AdapterError::Disconnected { .. }));
    }

    #[test]
    fn unknown_outcomes_are_ignored() {
        let (rtx, rrx) = unbounded();
        rtx.send(Outcome::failed("stray", AdapterError::platform(1, "x")))
            .unwrap();
        rtx.send(Outcome::succeeded("r1")).unwrap();
        assert!(join_outcomes(ids(&["r1"]), Some(rrx), HashSet::new(), None).is_ok());
    }
}
