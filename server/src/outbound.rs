//! Ordered queue of response packets waiting to be written to the client.
//!
//! Producers (the protocol logic on the network thread, log events from the
//! consumer thread) append under the lock. The network thread drains the
//! queue once per tick without holding the lock across the send.

use crate::error::TransportFault;
use crate::transport::ClientStream;
use log::trace;
use remote_protocol::OutboundPacket;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct QueueState {
    packets: VecDeque<OutboundPacket>,
    next_sequence: u8,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a packet, stamping it with the next response sequence number.
    ///
    /// Returns the assigned sequence number, or `None` for unsequenced
    /// packets. Sequence numbers follow queueing order and wrap at 256.
    pub fn enqueue(&self, mut packet: OutboundPacket) -> Option<u8> {
        let mut state = self.lock();
        let sequence = if packet.packet_type().is_sequenced() {
            let sequence = state.next_sequence;
            state.next_sequence = sequence.wrapping_add(1);
            packet.set_sequence(sequence);
            Some(sequence)
        } else {
            None
        };
        state.packets.push_back(packet);
        sequence
    }

    /// Sends queued packets in order, returning how many went out whole.
    ///
    /// A packet is only removed once all of its bytes were accepted.
    /// Flushing stops at the first packet that was not, leaving it at the
    /// head of the queue to be resent from its first byte on a later tick.
    pub fn flush_ready<S: ClientStream + ?Sized>(
        &self,
        stream: &mut S,
    ) -> Result<usize, TransportFault> {
        let mut sent = 0;

        loop {
            let Some(packet) = self.lock().packets.pop_front() else {
                return Ok(sent);
            };

            match stream.send(packet.as_bytes()) {
                Ok(len) if len == packet.len() => sent += 1,
                Ok(len) => {
                    trace!(
                        "Sent {} of {} bytes of {:?} packet, retrying next tick",
                        len,
                        packet.len(),
                        packet.packet_type()
                    );
                    self.lock().packets.push_front(packet);
                    return Ok(sent);
                }
                Err(fault) => {
                    self.lock().packets.push_front(packet);
                    return Err(fault);
                }
            }
        }
    }

    /// Discards all pending packets and restarts sequence numbering.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.packets.clear();
        state.next_sequence = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().packets.is_empty()
    }

    /// Wire bytes of every pending packet, oldest first
    pub fn pending_bytes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .packets
            .iter()
            .map(|packet| packet.as_bytes().to_vec())
            .collect()
    }
}
