//! # Remote Control Client
//!
//! Async client for the remote-control protocol. It connects to a host,
//! announces which streams it wants, sends scripts and reads back their
//! results.
//!
//! The server drops a connection that stays silent for its keep-alive
//! timeout, so a long-lived client should call
//! [`RemoteClient::keep_alive`] regularly.
//!
//! ```rust,no_run
//! use remote_client::RemoteClient;
//! use remote_protocol::ClientSubscriptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RemoteClient::connect("127.0.0.1:6969").await?;
//!     client.handshake(ClientSubscriptions::default()).await?;
//!
//!     let result = client.execute(b"return 1 + 1").await?;
//!     println!("{} -> {}", result.success, result.result_text());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;

pub use error::ClientError;
pub use network::{ExecuteResult, RemoteClient};
