//! # Remote Control Server
//!
//! Lets one external tool drive a host application over TCP: the tool sends
//! scripts, the host runs them on its own thread and sends the results back,
//! and the host can stream log lines to a subscribed tool.
//!
//! ## Threads
//!
//! ### Network Thread
//! Spawned by [`RemoteApi::start`]. Owns the listening socket and the single
//! client connection, reassembles incoming frames, keeps the connection
//! alive and flushes the outbound queue. It never runs scripts.
//!
//! ### Consumer Thread
//! The host's own thread. Once per frame it calls
//! [`RemoteHandle::process_command`], which runs at most one pending script.
//! It may also push log lines with [`RemoteHandle::send_log`]. Neither call
//! blocks on the network.
//!
//! ## Connection Lifecycle
//!
//! At most one client is served. The connection is dropped when no valid
//! packet arrived within the keep-alive timeout, when the peer closes it, or
//! on any socket fault; the server then waits for the next client. Pending
//! outbound packets, the subscription flags and any in-flight script result
//! are discarded on every teardown, and sequence numbers restart at zero.
//!
//! ## Module Organization
//!
//! - `api`: [`RemoteApi`] and the consumer-side [`RemoteHandle`]
//! - `config`: tunable timings and limits
//! - `connection`: the network thread's state machine
//! - `handoff`: single-slot request/response mailbox
//! - `outbound`: sequenced send queue
//! - `session`: per-packet protocol handling
//! - `transport`: socket seam and its TCP implementation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use remote_server::{RemoteApi, RemoteConfig, ScriptOutcome};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = RemoteApi::start(RemoteConfig::default())?;
//!     let handle = api.handle();
//!
//!     let mut run_script = |payload: &[u8]| {
//!         ScriptOutcome::success(format!("ran {} bytes", payload.len()))
//!     };
//!
//!     loop {
//!         handle.process_command(&mut run_script);
//!         handle.send_log(b"frame done");
//!         std::thread::sleep(Duration::from_millis(16));
//!     }
//! }
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handoff;
pub mod outbound;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{RemoteApi, RemoteHandle, ScriptExecutor};
pub use config::RemoteConfig;
pub use connection::{ConnectionManager, ConnectionState, LivenessCounter};
pub use error::{RemoteError, TransportFault};
pub use handoff::{PendingRequest, RequestTicket, ScriptOutcome};
pub use transport::{ClientStream, Listener, RecvOutcome, TcpTransport, Transport};
