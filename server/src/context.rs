//! State shared between the network thread and the consumer thread.
//!
//! The outbound queue and the command handoff each have their own lock and
//! no code path holds both at once. Everything else is atomic.

use crate::handoff::CommandHandoff;
use crate::outbound::OutboundQueue;
use remote_protocol::ClientSubscriptions;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct SharedContext {
    pub outbound: OutboundQueue,
    pub handoff: CommandHandoff,
    interests: AtomicU8,
    connected: AtomicBool,
    shutdown: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriptions(&self) -> ClientSubscriptions {
        ClientSubscriptions::from_interest_byte(self.interests.load(Ordering::Acquire))
    }

    pub fn set_subscriptions(&self, subscriptions: ClientSubscriptions) {
        self.interests
            .store(subscriptions.to_interest_byte(), Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Fresh per-connection state: nothing queued, sequence at zero, no
    /// subscriptions, no request in flight.
    pub fn reset_connection(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        self.interests.store(0, Ordering::Release);
        self.outbound.clear();
        self.handoff.reset();
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = addr;
    }
}
