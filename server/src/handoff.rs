//! Single-slot mailbox carrying one remote execute request from the network
//! thread to the consumer thread, and its result back.
//!
//! The slot cycles `Empty -> Requested -> Executing -> Completed -> Empty`.
//! Only one request can be unresolved at any time, so a result can never be
//! attributed to the wrong request. Every request gets a ticket; tickets
//! from before a connection reset are refused when the result comes back.

use crate::error::RemoteError;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifies one request handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub ticket: RequestTicket,
    pub payload: Vec<u8>,
}

/// Result of running a script on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub result: Vec<u8>,
}

impl ScriptOutcome {
    pub fn success(result: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            result: result.into(),
        }
    }

    pub fn failure(result: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            result: result.into(),
        }
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Requested(Vec<u8>),
    Executing,
    Completed(ScriptOutcome),
}

#[derive(Debug, Default)]
struct HandoffState {
    slot: Slot,
    /// Ticket of the request currently occupying the slot
    current: u64,
}

#[derive(Debug, Default)]
pub struct CommandHandoff {
    state: Mutex<HandoffState>,
}

impl CommandHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HandoffState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Network thread: hands a request to the consumer.
    ///
    /// Fails with [`RemoteError::HandoffBusy`] while a previous request is
    /// still unresolved; the slot is left untouched.
    pub fn post_request(&self, payload: Vec<u8>) -> Result<RequestTicket, RemoteError> {
        let mut state = self.lock();
        if !matches!(state.slot, Slot::Empty) {
            return Err(RemoteError::HandoffBusy);
        }
        state.current += 1;
        state.slot = Slot::Requested(payload);
        Ok(RequestTicket(state.current))
    }

    /// Consumer thread: takes the pending request, if any. Never blocks.
    pub fn try_take_request(&self) -> Option<PendingRequest> {
        let mut state = self.lock();
        match std::mem::take(&mut state.slot) {
            Slot::Requested(payload) => {
                state.slot = Slot::Executing;
                Some(PendingRequest {
                    ticket: RequestTicket(state.current),
                    payload,
                })
            }
            other => {
                state.slot = other;
                None
            }
        }
    }

    /// Consumer thread: publishes the result for `ticket`.
    ///
    /// Returns false if the request was abandoned in the meantime, in which
    /// case the outcome is dropped.
    pub fn post_response(&self, ticket: RequestTicket, outcome: ScriptOutcome) -> bool {
        let mut state = self.lock();
        if ticket.0 != state.current || !matches!(state.slot, Slot::Executing) {
            return false;
        }
        state.slot = Slot::Completed(outcome);
        true
    }

    /// Network thread: takes a finished result, freeing the slot.
    pub fn try_take_response(&self) -> Option<ScriptOutcome> {
        let mut state = self.lock();
        match std::mem::take(&mut state.slot) {
            Slot::Completed(outcome) => Some(outcome),
            other => {
                state.slot = other;
                None
            }
        }
    }

    /// True while a request is unresolved or its result not yet collected
    pub fn is_busy(&self) -> bool {
        !matches!(self.lock().slot, Slot::Empty)
    }

    /// Abandons whatever is in flight. Outstanding tickets become stale.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.slot = Slot::Empty;
        state.current += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// An empty slot yields nothing on either side
    #[test]
    fn test_empty_handoff() {
        let handoff = CommandHandoff::new();
        assert!(!handoff.is_busy());
        assert!(handoff.try_take_request().is_none());
        assert!(handoff.try_take_response().is_none());
    }

    /// Request, take, respond, collect
    #[test]
    fn test_full_cycle() {
        let handoff = CommandHandoff::new();
        let ticket = handoff.post_request(b"return 1".to_vec()).unwrap();
        assert!(handoff.is_busy());

        let request = handoff.try_take_request().unwrap();
        assert_eq!(request.ticket, ticket);
        assert_eq!(request.payload, b"return 1");

        // Taken once only
        assert!(handoff.try_take_request().is_none());
        assert!(handoff.try_take_response().is_none());

        assert!(handoff.post_response(ticket, ScriptOutcome::success("1")));
        assert_eq!(
            handoff.try_take_response(),
            Some(ScriptOutcome::success("1"))
        );
        assert!(!handoff.is_busy());
    }

    /// The slot refuses a second request until the first is collected
    #[test]
    fn test_second_request_rejected_while_pending() {
        let handoff = CommandHandoff::new();
        handoff.post_request(b"first".to_vec()).unwrap();
        assert!(matches!(
            handoff.post_request(b"second".to_vec()),
            Err(RemoteError::HandoffBusy)
        ));

        let request = handoff.try_take_request().unwrap();
        assert_eq!(request.payload, b"first");

        // Still busy while executing and until the result is collected
        assert!(handoff.post_request(b"third".to_vec()).is_err());
        handoff.post_response(request.ticket, ScriptOutcome::success(""));
        assert!(handoff.post_request(b"third".to_vec()).is_err());

        handoff.try_take_response().unwrap();
        assert!(handoff.post_request(b"third".to_vec()).is_ok());
    }

    /// Responses are only accepted for a taken request
    #[test]
    fn test_response_without_taking_request_is_refused() {
        let handoff = CommandHandoff::new();
        let ticket = handoff.post_request(b"x".to_vec()).unwrap();
        assert!(!handoff.post_response(ticket, ScriptOutcome::success("x")));
        assert!(handoff.try_take_response().is_none());
    }

    /// Tickets issued before a reset are refused
    #[test]
    fn test_stale_ticket_after_reset() {
        let handoff = CommandHandoff::new();
        handoff.post_request(b"old".to_vec()).unwrap();
        let stale = handoff.try_take_request().unwrap();

        handoff.reset();
        assert!(!handoff.is_busy());

        let fresh = handoff.post_request(b"new".to_vec()).unwrap();
        let request = handoff.try_take_request().unwrap();
        assert_eq!(request.ticket, fresh);
        assert_ne!(stale.ticket, fresh);

        assert!(!handoff.post_response(stale.ticket, ScriptOutcome::success("old")));
        assert!(handoff.post_response(fresh, ScriptOutcome::success("new")));
        assert_eq!(
            handoff.try_take_response(),
            Some(ScriptOutcome::success("new"))
        );
    }

    /// Network and consumer threads exchange through the slot
    #[test]
    fn test_cross_thread_round_trip() {
        let handoff = Arc::new(CommandHandoff::new());

        let consumer = {
            let handoff = Arc::clone(&handoff);
            std::thread::spawn(move || {
                let mut served = 0;
                while served < 20 {
                    if let Some(request) = handoff.try_take_request() {
                        let mut reversed = request.payload.clone();
                        reversed.reverse();
                        assert!(handoff.post_response(request.ticket, ScriptOutcome::success(reversed)));
                        served += 1;
                    }
                    std::thread::yield_now();
                }
            })
        };

        for i in 0..20u8 {
            let payload = vec![i, i + 1, i + 2];
            handoff.post_request(payload.clone()).unwrap();
            let outcome = loop {
                if let Some(outcome) = handoff.try_take_response() {
                    break outcome;
                }
                std::thread::yield_now();
            };
            assert_eq!(outcome.result, vec![i + 2, i + 1, i]);
        }

        consumer.join().unwrap();
    }
}
