//! Connection manager: owns the listening socket and the single client,
//! and runs the network thread's tick loop.
//!
//! ```text
//! Listening --bind ok--> Accepting --client--> Connected
//!     ^  |                   ^                    |
//!     +--+ bind failed       +---- Draining <-----+ timeout / close / fault
//!     ^                      |
//!     +----------------------+ accept fault
//! ```
//!
//! Teardown closes the client and discards its state right away; the
//! manager then spends one tick in `Draining` before it accepts again.
//!
//! Each connected tick decrements the liveness counter, collects a finished
//! consumer result, performs one receive attempt and flushes the outbound
//! queue. Receive and send are serialized within the tick because the
//! socket stack allows only one blocking call at a time.

use crate::config::RemoteConfig;
use crate::context::SharedContext;
use crate::error::TransportFault;
use crate::session::ProtocolSession;
use crate::transport::{ClientStream, Listener, RecvOutcome, Transport};
use log::{debug, error, info, trace, warn};
use remote_protocol::{FrameAssembler, LOG_MESSAGE_HEADER_LEN};
use std::sync::Arc;
use std::time::Duration;

/// Smallest receive buffer; discarding an oversized frame reads this much at a time
const MIN_RECV_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Accepting,
    Connected,
    Draining,
    Closed,
}

/// Ticks left before an idle connection is dropped
#[derive(Debug, Clone)]
pub struct LivenessCounter {
    remaining: u32,
    ceiling: u32,
}

impl LivenessCounter {
    pub fn new(ceiling: u32) -> Self {
        Self {
            remaining: ceiling,
            ceiling,
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.ceiling;
    }

    /// Counts down one tick
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

#[derive(Debug)]
enum Teardown {
    LivenessTimeout,
    PeerClosed,
    Fault(TransportFault),
}

type StreamOf<T> = <<T as Transport>::Listener as Listener>::Stream;

pub struct ConnectionManager<T: Transport> {
    transport: T,
    config: RemoteConfig,
    context: Arc<SharedContext>,
    session: ProtocolSession,
    state: ConnectionState,
    listener: Option<T::Listener>,
    client: Option<StreamOf<T>>,
    assembler: FrameAssembler,
    liveness: LivenessCounter,
    recv_buf: Vec<u8>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: RemoteConfig, context: Arc<SharedContext>) -> Self {
        let recv_buf = vec![0u8; config.max_payload_len.max(MIN_RECV_BUFFER)];
        Self {
            transport,
            session: ProtocolSession::new(Arc::clone(&context)),
            context,
            state: ConnectionState::Listening,
            listener: None,
            client: None,
            assembler: FrameAssembler::new(config.max_payload_len),
            liveness: LivenessCounter::new(config.liveness_ceiling()),
            recv_buf,
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn liveness(&self) -> &LivenessCounter {
        &self.liveness
    }

    /// Runs until shutdown is requested on the shared context.
    pub fn run(mut self) {
        info!("Network thread started");
        while !self.context.is_shutdown_requested() {
            let pause = self.tick();
            std::thread::sleep(pause);
        }
        self.close();
        info!("Network thread stopped");
    }

    /// Performs one iteration of the network loop and returns how long to
    /// sleep before the next one.
    pub fn tick(&mut self) -> Duration {
        match self.state {
            ConnectionState::Listening => {
                if !self.listen() {
                    return self.config.bind_retry_backoff();
                }
            }
            ConnectionState::Accepting => {
                if !self.accept() {
                    return self.config.bind_retry_backoff();
                }
            }
            ConnectionState::Connected => self.poll_connection(),
            ConnectionState::Draining => {
                debug!("Connection drained, accepting again");
                self.state = ConnectionState::Accepting;
            }
            ConnectionState::Closed => {}
        }
        self.config.tick_period()
    }

    fn listen(&mut self) -> bool {
        match self.transport.bind(&self.config) {
            Ok(listener) => {
                let addr = listener.local_addr();
                match addr {
                    Some(addr) => info!("Remote API listening on {}", addr),
                    None => info!("Remote API listening on {}", self.config.bind_addr),
                }
                self.context.set_local_addr(addr);
                self.listener = Some(listener);
                self.state = ConnectionState::Accepting;
                true
            }
            Err(fault) => {
                error!(
                    "{}; retrying in {:?}",
                    fault,
                    self.config.bind_retry_backoff()
                );
                false
            }
        }
    }

    /// Returns false when the listener failed and has to be bound again.
    fn accept(&mut self) -> bool {
        let Some(listener) = self.listener.as_mut() else {
            self.state = ConnectionState::Listening;
            return true;
        };

        match listener.poll_accept() {
            Ok(Some(client)) => {
                info!("Client connected from {}", client.peer());
                self.context.reset_connection(true);
                self.assembler.reset();
                self.liveness.reset();
                self.client = Some(client);
                self.state = ConnectionState::Connected;
                true
            }
            Ok(None) => true,
            Err(fault) => {
                warn!(
                    "{}; rebinding in {:?}",
                    fault,
                    self.config.bind_retry_backoff()
                );
                self.listener = None;
                self.context.set_local_addr(None);
                self.state = ConnectionState::Listening;
                false
            }
        }
    }

    fn poll_connection(&mut self) {
        self.liveness.tick();
        self.session.collect_response();

        let result = self.receive().and_then(|()| self.flush());
        match result {
            Err(reason) => self.teardown(reason),
            Ok(()) if self.liveness.is_expired() => self.teardown(Teardown::LivenessTimeout),
            Ok(()) => {}
        }
    }

    /// One receive attempt. The first read never blocks; once a frame has
    /// started, follow-up reads may block briefly to finish it. Follow-up
    /// reads stop after one buffer's worth of bytes, or when the data runs
    /// dry; the frame is then resumed next tick.
    fn receive(&mut self) -> Result<(), Teardown> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };

        let mut budget = self.recv_buf.len() + LOG_MESSAGE_HEADER_LEN;
        let mut first = true;
        loop {
            let mut wanted = self.assembler.wanted();
            if !first {
                wanted = wanted.min(budget);
                if wanted == 0 {
                    trace!("Read budget spent, resuming frame next tick");
                    return Ok(());
                }
            }
            let buf = &mut self.recv_buf[..wanted];
            let outcome = if first {
                client.try_recv(buf)
            } else {
                client.recv_bounded(buf)
            }
            .map_err(Teardown::Fault)?;

            match outcome {
                RecvOutcome::Empty => return Ok(()),
                RecvOutcome::Closed => return Err(Teardown::PeerClosed),
                RecvOutcome::Data(len) => {
                    if !first {
                        budget -= len;
                    }
                    first = false;
                    trace!("Received {} of {} wanted bytes", len, wanted);
                    for event in self.assembler.push(&self.recv_buf[..len]) {
                        if self.session.dispatch(event) {
                            self.liveness.reset();
                        }
                    }
                    if self.assembler.is_idle() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn flush(&mut self) -> Result<(), Teardown> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        let sent = self
            .context
            .outbound
            .flush_ready(client)
            .map_err(Teardown::Fault)?;
        if sent > 0 {
            trace!("Flushed {} packets", sent);
        }
        Ok(())
    }

    fn teardown(&mut self, reason: Teardown) {
        self.state = ConnectionState::Draining;
        match &reason {
            Teardown::LivenessTimeout => info!(
                "No keep-alive for {} ticks, dropping client",
                self.liveness.ceiling()
            ),
            Teardown::PeerClosed => info!("Client closed the connection"),
            Teardown::Fault(fault) => warn!("Dropping client: {}", fault),
        }

        let dropped = self.context.outbound.len();
        if dropped > 0 {
            debug!("Discarding {} unsent packets", dropped);
        }
        self.context.reset_connection(false);
        self.assembler.reset();
        self.client = None;
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!("Closing client connection for shutdown");
        }
        self.context.reset_connection(false);
        self.listener = None;
        self.context.set_local_addr(None);
        self.state = ConnectionState::Closed;
    }
}
