//! Protocol state machine: turns assembled frames into handoff requests and
//! queued responses for the current connection.

use crate::context::SharedContext;
use crate::error::RemoteError;
use log::{debug, info, warn};
use remote_protocol::{Assembled, ClientSubscriptions, Frame, OutboundPacket};
use std::sync::Arc;

/// Result text sent when a RemoteExecute arrives while another is unresolved
pub const BUSY_MESSAGE: &str = "remote execute already pending";

pub struct ProtocolSession {
    context: Arc<SharedContext>,
}

impl ProtocolSession {
    pub fn new(context: Arc<SharedContext>) -> Self {
        Self { context }
    }

    /// Handles one assembled frame or diagnostic.
    ///
    /// Returns true when a well-formed packet arrived, which counts as a
    /// sign of life for the liveness counter.
    pub fn dispatch(&self, event: Assembled) -> bool {
        match event {
            Assembled::Frame(frame) => {
                self.handle_frame(frame);
                true
            }
            Assembled::Malformed(report) => {
                warn!(
                    "Malformed packet: type {}, received {} bytes, expected {}",
                    report.offending_type, report.received, report.expected
                );
                self.queue(OutboundPacket::malformed(&report));
                false
            }
        }
    }

    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Handshake { interests } => {
                let subscriptions = ClientSubscriptions::from_interest_byte(interests);
                info!(
                    "Handshake: logging={}, multiworld updates={}",
                    subscriptions.logging, subscriptions.multiworld_updates
                );
                self.context.set_subscriptions(subscriptions);
                self.queue(OutboundPacket::handshake_ack());
            }
            Frame::KeepAlive => {}
            Frame::RemoteExecute { payload } => {
                let len = payload.len();
                match self.context.handoff.post_request(payload) {
                    Ok(_) => debug!("Remote execute of {} bytes handed to consumer", len),
                    Err(RemoteError::HandoffBusy) => {
                        warn!("Rejecting remote execute: previous request unresolved");
                        self.queue(OutboundPacket::remote_execute_result(
                            false,
                            BUSY_MESSAGE.as_bytes(),
                        ));
                    }
                    Err(e) => warn!("Could not hand off remote execute: {}", e),
                }
            }
            Frame::LogMessage { message } => {
                warn!(
                    "Ignoring client-sent log message of {} bytes",
                    message.len()
                );
            }
        }
    }

    /// Moves a finished consumer result into the outbound queue.
    ///
    /// Returns true if a result was collected.
    pub fn collect_response(&self) -> bool {
        let Some(outcome) = self.context.handoff.try_take_response() else {
            return false;
        };
        self.queue(OutboundPacket::remote_execute_result(
            outcome.success,
            &outcome.result,
        ));
        true
    }

    fn queue(&self, packet: Result<OutboundPacket, remote_protocol::FrameError>) {
        match packet.map_err(RemoteError::from) {
            Ok(packet) => {
                self.context.outbound.enqueue(packet);
            }
            // The response is abandoned; there is nothing to retry with
            Err(e) => warn!("Dropping response: {}", e),
        }
    }
}
