use remote_protocol::{FrameError, MalformedReport, ServerPacket};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("could not decode server packet: {0}")]
    Frame(#[from] FrameError),
    #[error("server closed the connection")]
    Closed,
    #[error(
        "server rejected packet type {} ({} of {} bytes)",
        .0.offending_type, .0.received, .0.expected
    )]
    Malformed(MalformedReport),
    #[error("unexpected reply: {0:?}")]
    Unexpected(ServerPacket),
}
