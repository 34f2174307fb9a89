use remote_protocol::FrameError;
use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Failure of the underlying socket stack.
///
/// Recoverable by dropping the client and going back to accepting.
#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport fault: {0}")]
    Transport(#[from] TransportFault),
    #[error("malformed frame: {0}")]
    MalformedFrame(FrameError),
    #[error("a remote execute request is already pending")]
    HandoffBusy,
    #[error("could not allocate outbound packet: {0}")]
    AllocationFailure(TryReserveError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration: {0}")]
    ConfigRead(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("failed to spawn network thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<FrameError> for RemoteError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Allocation(source) => RemoteError::AllocationFailure(source),
            other => RemoteError::MalformedFrame(other),
        }
    }
}
