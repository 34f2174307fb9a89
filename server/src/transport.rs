//! Socket seam between the connection manager and the socket stack.
//!
//! The stack this server was built for allows only one blocking socket call
//! in flight per process, reports no usable "would block" error, and only
//! honours non-blocking mode for receives. The traits below expose exactly
//! the operations the network thread needs under those rules:
//!
//! - a non-blocking accept poll,
//! - a non-blocking receive used to detect the start of a frame,
//! - a briefly blocking receive used only to finish a frame already started,
//! - a best-effort send that may accept fewer bytes than offered.
//!
//! Closing is done by dropping the stream or listener.

use crate::config::RemoteConfig;
use crate::error::TransportFault;
use log::debug;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// Result of a single receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// This many bytes were written to the front of the buffer
    Data(usize),
    /// Nothing available right now
    Empty,
    /// Peer shut the connection down gracefully
    Closed,
}

pub trait ClientStream: Send {
    /// Receives without blocking.
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault>;

    /// Receives, blocking at most for the frame read timeout.
    fn recv_bounded(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault>;

    /// Sends as much of `bytes` as the stack accepts right now.
    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportFault>;

    fn peer(&self) -> String;
}

pub trait Listener: Send {
    type Stream: ClientStream;

    /// Returns a newly connected client, or `None` if nobody is waiting.
    fn poll_accept(&mut self) -> Result<Option<Self::Stream>, TransportFault>;

    fn local_addr(&self) -> Option<SocketAddr>;
}

pub trait Transport: Send + 'static {
    type Listener: Listener;

    fn bind(&mut self, config: &RemoteConfig) -> Result<Self::Listener, TransportFault>;
}

/// TCP over `std::net`
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Listener = TcpClientListener;

    fn bind(&mut self, config: &RemoteConfig) -> Result<Self::Listener, TransportFault> {
        let bind_fault = |source: io::Error| TransportFault::Bind {
            addr: config.bind_addr.clone(),
            source,
        };

        let listener = TcpListener::bind(&config.bind_addr).map_err(bind_fault)?;
        listener.set_nonblocking(true).map_err(bind_fault)?;

        Ok(TcpClientListener {
            listener,
            frame_read_timeout: config.frame_read_timeout(),
        })
    }
}

pub struct TcpClientListener {
    listener: TcpListener,
    frame_read_timeout: Duration,
}

impl Listener for TcpClientListener {
    type Stream = TcpClient;

    fn poll_accept(&mut self) -> Result<Option<TcpClient>, TransportFault> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle for {}: {}", peer, e);
                }
                Ok(Some(TcpClient {
                    stream,
                    peer,
                    frame_read_timeout: self.frame_read_timeout,
                }))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(TransportFault::Accept(e)),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

pub struct TcpClient {
    stream: TcpStream,
    peer: SocketAddr,
    frame_read_timeout: Duration,
}

impl TcpClient {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        match self.stream.read(buf) {
            Ok(0) => Ok(RecvOutcome::Closed),
            Ok(len) => Ok(RecvOutcome::Data(len)),
            Err(e) if is_transient(&e) => Ok(RecvOutcome::Empty),
            Err(e) => Err(TransportFault::Recv(e)),
        }
    }
}

impl ClientStream for TcpClient {
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        self.stream
            .set_nonblocking(true)
            .map_err(TransportFault::Recv)?;
        self.read_into(buf)
    }

    fn recv_bounded(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, TransportFault> {
        self.stream
            .set_nonblocking(false)
            .map_err(TransportFault::Recv)?;
        self.stream
            .set_read_timeout(Some(self.frame_read_timeout))
            .map_err(TransportFault::Recv)?;
        self.read_into(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportFault> {
        self.stream
            .set_nonblocking(true)
            .map_err(TransportFault::Send)?;
        match self.stream.write(bytes) {
            Ok(len) => Ok(len),
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(TransportFault::Send(e)),
        }
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}
