use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{SessionError, WatchError, WatchResult};

use super::dispatcher::{ControlMsg, SessionShared};
use super::events::{SessionId, SessionState, Triggered};

/// Stream of predicates that became true during one monitoring session.
///
/// The stream is lazy in the sense that nothing is emitted until a crossing
/// happens; it never completes on its own. Dropping it tears the session down
/// without blocking.
#[derive(Debug)]
pub struct PredicateStream {
    session_id: SessionId,
    rx: Receiver<Triggered>,
    control_tx: Sender<ControlMsg>,
    shared: Arc<SessionShared>,
    released: AtomicBool,
    teardown_timeout: Duration,
}

impl PredicateStream {
    pub(crate) fn new(
        session_id: SessionId,
        rx: Receiver<Triggered>,
        control_tx: Sender<ControlMsg>,
        shared: Arc<SessionShared>,
        teardown_timeout: Duration,
    ) -> Self {
        Self {
            session_id,
            rx,
            control_tx,
            shared,
            released: AtomicBool::new(false),
            teardown_timeout,
        }
    }

    /// The session backing this stream.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Returns true while the session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.state().is_active()
    }

    /// Emissions dropped because the buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events()
    }

    /// Emissions handed to the buffer so far.
    #[must_use]
    pub fn emitted_events(&self) -> u64 {
        self.shared.emitted_events()
    }

    /// Receive the next emission (blocking).
    ///
    /// # Errors
    /// Once the session has ended and the buffer is drained, returns the
    /// termination cause, or `Disconnected` after a teardown.
    pub fn recv(&self) -> WatchResult<Triggered> {
        self.rx.recv().map_err(|_| self.closed_error())
    }

    /// Receive the next emission with a timeout.
    ///
    /// # Errors
    /// `Timeout` when nothing arrived in time; otherwise as [`Self::recv`].
    pub fn recv_timeout(&self, timeout: Duration) -> WatchResult<Triggered> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WatchError::Session(SessionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => self.closed_error(),
        })
    }

    /// Receive an emission if one is buffered.
    ///
    /// # Errors
    /// As [`Self::recv`] once the session has ended and the buffer is drained.
    pub fn try_recv(&self) -> WatchResult<Option<Triggered>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.closed_error()),
        }
    }

    /// Blocking iterator over emissions; ends when the session ends.
    pub fn iter(&self) -> impl Iterator<Item = Triggered> + '_ {
        self.rx.iter()
    }

    /// Tears the session down and waits until every registration is released.
    ///
    /// Idempotent. Returns immediately if the session already ended.
    ///
    /// # Errors
    /// `Timeout` if the worker did not finish within the configured teardown
    /// timeout.
    pub fn cancel(&self) -> WatchResult<()> {
        self.request_teardown();
        if self.shared.wait_inactive(self.teardown_timeout) {
            Ok(())
        } else {
            Err(WatchError::Session(SessionError::Timeout {
                duration_ms: u64::try_from(self.teardown_timeout.as_millis()).unwrap_or(u64::MAX),
            }))
        }
    }

    /// Requests teardown without waiting. Idempotent.
    pub fn unsubscribe(&self) {
        self.request_teardown();
    }

    fn request_teardown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // Full means a teardown is already queued; disconnected means the
        // worker is gone.
        let _ = self.control_tx.try_send(ControlMsg::Teardown);
    }

    fn closed_error(&self) -> WatchError {
        match self.shared.state() {
            SessionState::Terminated(err) => WatchError::Session(err),
            SessionState::Active | SessionState::TornDown => {
                WatchError::Session(SessionError::Disconnected {
                    path: "predicate_stream".to_string(),
                })
            }
        }
    }
}

impl Drop for PredicateStream {
    fn drop(&mut self) {
        // Best-effort: do not block on drop.
        self.request_teardown();
    }
}
