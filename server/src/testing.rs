//! Deterministic in-memory transport for driving the network thread tick by tick.

use crate::config::RemoteConfig;
use crate::error::TransportFault;
use crate::transport::{ClientStream, Listener, RecvOutcome, Transport};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Pipe {
    to_server: VecDeque<u8>,
    from_server: Vec<u8>,
    closed: bool,
    /// Bytes the server may still send; `None` is unlimited
    send_budget: Option<usize>,
    fail_sends: bool,
    fail_recvs: bool,
    /// Largest number of bytes handed out by one receive
    max_chunk: Option<usize>,
}

#[derive(Debug, Default)]
struct Network {
    failing_binds: u32,
    failing_accepts: u32,
    bind_attempts: u32,
    pending: VecDeque<Arc<Mutex<Pipe>>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    network: Arc<Mutex<Network>>,
}

impl MockTransport {
    /// Makes the next `count` binds fail.
    pub fn fail_binds(&self, count: u32) {
        self.network.lock().unwrap().failing_binds = count;
    }

    /// Makes the next `count` accept polls fail.
    pub fn fail_accepts(&self, count: u32) {
        self.network.lock().unwrap().failing_accepts = count;
    }

    pub fn bind_attempts(&self) -> u32 {
        self.network.lock().unwrap().bind_attempts
    }

    /// Queues a client for the next accept poll.
    pub fn connect(&self) -> MockPeer {
        let pipe = Arc::new(Mutex::new(Pipe::default()));
        self.network
            .lock()
            .unwrap()
            .pending
            .push_back(Arc::clone(&pipe));
        MockPeer { pipe }
    }
}

impl Transport for MockTransport {
    type Listener = MockListener;

    fn bind(&mut self, config: &RemoteConfig) -> Result<MockListener, TransportFault> {
        let mut network = self.network.lock().unwrap();
        network.bind_attempts += 1;
        if network.failing_binds > 0 {
            network.failing_binds -= 1;
            return Err(TransportFault::Bind {
                addr: config.bind_addr.clone(),
                source: io::Error::new(io::ErrorKind::AddrInUse, "mock bind failure"),
            });
        }
        Ok(MockListener {
            network: Arc::clone(&self.network),
        })
    }
}

pub struct MockListener {
    network: Arc<Mutex<Network>>,
}

impl Listener for MockListener {
    type Stream = MockStream;

    fn poll_accept(&mut self) -> Result<Option<MockStream>, TransportFault> {
        let mut network = self.network.lock().unwrap();
        if network.failing_accepts > 0 {
            network.failing_accepts -= 1;
            return Err(TransportFault::Accept(io::Error::new(
                io::ErrorKind::Other,
                "mock accept failure",
            )));
        }
        let pipe = network.pending.pop_front();
        Ok(pipe.map(|pipe| MockStream { pipe }))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        "127.0.0.1:6969".parse().ok()
    }
}

pub struct MockStream {
    pipe: Arc<Mutex<Pipe>>,
}

impl MockStream {
    fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        let mut pipe = self.pipe.lock().unwrap();
        if pipe.fail_recvs {
            return Err(TransportFault::Recv(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock receive failure",
            )));
        }
        if pipe.to_server.is_empty() {
            return Ok(if pipe.closed {
                RecvOutcome::Closed
            } else {
                RecvOutcome::Empty
            });
        }

        let limit = pipe.max_chunk.unwrap_or(usize::MAX);
        let len = buf.len().min(pipe.to_server.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(pipe.to_server.drain(..len)) {
            *slot = byte;
        }
        Ok(RecvOutcome::Data(len))
    }
}

impl ClientStream for MockStream {
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        self.recv(buf)
    }

    fn recv_bounded(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        self.recv(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportFault> {
        let mut pipe = self.pipe.lock().unwrap();
        if pipe.fail_sends {
            return Err(TransportFault::Send(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock send failure",
            )));
        }

        let len = match pipe.send_budget.as_mut() {
            Some(budget) => {
                let len = bytes.len().min(*budget);
                *budget -= len;
                len
            }
            None => bytes.len(),
        };
        pipe.from_server.extend_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn peer(&self) -> String {
        "mock-peer".to_string()
    }
}

/// Test-side end of a mock connection
#[derive(Debug, Clone)]
pub struct MockPeer {
    pipe: Arc<Mutex<Pipe>>,
}

impl MockPeer {
    pub fn write(&self, bytes: &[u8]) {
        self.pipe.lock().unwrap().to_server.extend(bytes.iter().copied());
    }

    /// Everything the server sent since the last call
    pub fn take_received(&self) -> Vec<u8> {
        std::mem::take(&mut self.pipe.lock().unwrap().from_server)
    }

    pub fn close(&self) {
        self.pipe.lock().unwrap().closed = true;
    }

    pub fn set_send_budget(&self, budget: Option<usize>) {
        self.pipe.lock().unwrap().send_budget = budget;
    }

    pub fn fail_sends(&self) {
        self.pipe.lock().unwrap().fail_sends = true;
    }

    pub fn fail_recvs(&self) {
        self.pipe.lock().unwrap().fail_recvs = true;
    }

    pub fn set_max_chunk(&self, max_chunk: Option<usize>) {
        self.pipe.lock().unwrap().max_chunk = max_chunk;
    }

    pub fn unread(&self) -> usize {
        self.pipe.lock().unwrap().to_server.len()
    }
}
