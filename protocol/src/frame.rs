//! Stateless encoding and decoding of client-to-server frames.

use crate::packet::PacketType;
use crate::{LOG_MESSAGE_HEADER_LEN, REMOTE_EXECUTE_HEADER_LEN};
use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("declared length {declared} does not match {available} available payload bytes")]
    LengthMismatch { declared: u64, available: usize },
    #[error("payload of {declared} bytes exceeds the maximum of {max}")]
    TooLarge { declared: u64, max: u64 },
    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("could not allocate packet buffer: {0}")]
    Allocation(#[from] TryReserveError),
}

/// One complete protocol message as received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Handshake { interests: u8 },
    LogMessage { message: Vec<u8> },
    RemoteExecute { payload: Vec<u8> },
    KeepAlive,
}

impl Frame {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Frame::Handshake { .. } => PacketType::Handshake,
            Frame::LogMessage { .. } => PacketType::LogMessage,
            Frame::RemoteExecute { .. } => PacketType::RemoteExecute,
            Frame::KeepAlive => PacketType::KeepAlive,
        }
    }

    /// Encoded size of this frame on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Handshake { .. } => 2,
            Frame::LogMessage { message } => LOG_MESSAGE_HEADER_LEN + message.len(),
            Frame::RemoteExecute { payload } => REMOTE_EXECUTE_HEADER_LEN + payload.len(),
            Frame::KeepAlive => 1,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(self.packet_type().as_u8());

        match self {
            Frame::Handshake { interests } => bytes.push(*interests),
            Frame::LogMessage { message } => {
                bytes.extend_from_slice(&(message.len() as u64).to_le_bytes());
                bytes.extend_from_slice(message);
            }
            Frame::RemoteExecute { payload } => {
                let declared = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
                    declared: payload.len() as u64,
                    max: u32::MAX as u64,
                })?;
                bytes.extend_from_slice(&declared.to_le_bytes());
                bytes.extend_from_slice(payload);
            }
            Frame::KeepAlive => {}
        }

        Ok(bytes)
    }

    /// Decodes exactly one frame occupying all of `bytes`.
    ///
    /// The declared length of a length-prefixed frame must match the bytes
    /// actually present; nothing past the declared length is ever read.
    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        let (&type_byte, rest) = bytes.split_first().ok_or(FrameError::Truncated {
            needed: 1,
            available: 0,
        })?;

        let frame = match PacketType::try_from(type_byte)? {
            PacketType::Handshake => match rest {
                [interests] => Frame::Handshake {
                    interests: *interests,
                },
                [] => {
                    return Err(FrameError::Truncated {
                        needed: 2,
                        available: bytes.len(),
                    })
                }
                _ => {
                    return Err(FrameError::LengthMismatch {
                        declared: 1,
                        available: rest.len(),
                    })
                }
            },
            PacketType::LogMessage => {
                let (declared, payload) = split_length::<8>(bytes)?;
                Frame::LogMessage {
                    message: payload_of(declared, payload)?,
                }
            }
            PacketType::RemoteExecute => {
                let (declared, payload) = split_length::<4>(bytes)?;
                Frame::RemoteExecute {
                    payload: payload_of(declared, payload)?,
                }
            }
            PacketType::KeepAlive => {
                if !rest.is_empty() {
                    return Err(FrameError::LengthMismatch {
                        declared: 0,
                        available: rest.len(),
                    });
                }
                Frame::KeepAlive
            }
            PacketType::MalformedPacket => return Err(FrameError::UnknownType(type_byte)),
        };

        Ok(frame)
    }
}

/// Reads an `N`-byte little-endian length following the type byte.
pub(crate) fn read_length(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    let len = bytes.len().min(8);
    raw[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(raw)
}

fn split_length<const N: usize>(bytes: &[u8]) -> Result<(u64, &[u8]), FrameError> {
    if bytes.len() < 1 + N {
        return Err(FrameError::Truncated {
            needed: 1 + N,
            available: bytes.len(),
        });
    }
    let (header, payload) = bytes[1..].split_at(N);
    Ok((read_length(header), payload))
}

fn payload_of(declared: u64, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if declared != payload.len() as u64 {
        return Err(FrameError::LengthMismatch {
            declared,
            available: payload.len(),
        });
    }
    Ok(payload.to_vec())
}
