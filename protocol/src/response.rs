//! Server-to-client packets: construction on the server, decoding on the client.

use crate::frame::{read_length, FrameError};
use crate::packet::PacketType;
use crate::LOG_MESSAGE_HEADER_LEN;
use serde::{Deserialize, Serialize};

/// Body of a MalformedPacket diagnostic, three little-endian u32 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedReport {
    pub offending_type: u32,
    pub received: u32,
    pub expected: u32,
}

const MALFORMED_BODY_LEN: usize = 12;

/// A fully encoded packet waiting in the outbound queue.
///
/// Sequenced packets reserve byte 1 for the response sequence number, which
/// is filled in when the packet is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    packet_type: PacketType,
    bytes: Vec<u8>,
}

impl OutboundPacket {
    /// Allocates the whole packet up front so an allocation failure surfaces
    /// as an error instead of an abort.
    fn build(
        packet_type: PacketType,
        body_len: usize,
        write_body: impl FnOnce(&mut Vec<u8>) -> Result<(), FrameError>,
    ) -> Result<Self, FrameError> {
        let header_len = if packet_type.is_sequenced() { 2 } else { 1 };
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(header_len + body_len)?;

        bytes.push(packet_type.as_u8());
        if packet_type.is_sequenced() {
            bytes.push(0);
        }
        write_body(&mut bytes)?;

        Ok(Self { packet_type, bytes })
    }

    pub fn handshake_ack() -> Result<Self, FrameError> {
        Self::build(PacketType::Handshake, 0, |_| Ok(()))
    }

    pub fn remote_execute_result(success: bool, result: &[u8]) -> Result<Self, FrameError> {
        Self::build(PacketType::RemoteExecute, 1 + result.len(), |bytes| {
            bytes.push(success as u8);
            bytes.extend_from_slice(result);
            Ok(())
        })
    }

    pub fn log_message(message: &[u8]) -> Result<Self, FrameError> {
        Self::build(
            PacketType::LogMessage,
            LOG_MESSAGE_HEADER_LEN - 1 + message.len(),
            |bytes| Ok(bincode::serialize_into(bytes, message)?),
        )
    }

    pub fn malformed(report: &MalformedReport) -> Result<Self, FrameError> {
        Self::build(PacketType::MalformedPacket, MALFORMED_BODY_LEN, |bytes| {
            Ok(bincode::serialize_into(bytes, report)?)
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn sequence(&self) -> Option<u8> {
        if self.packet_type.is_sequenced() {
            Some(self.bytes[1])
        } else {
            None
        }
    }

    /// Stamps the response sequence number. Ignored for unsequenced packets.
    pub fn set_sequence(&mut self, sequence: u8) {
        if self.packet_type.is_sequenced() {
            self.bytes[1] = sequence;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A packet as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    HandshakeAck {
        sequence: u8,
    },
    LogMessage {
        message: Vec<u8>,
    },
    RemoteExecuteResult {
        sequence: u8,
        success: bool,
        result: Vec<u8>,
    },
    Malformed {
        sequence: u8,
        report: MalformedReport,
    },
}

impl ServerPacket {
    /// Decodes the packet at the start of `bytes`, returning it with the
    /// number of bytes it occupied.
    ///
    /// A RemoteExecute result carries no length on the wire, so it extends
    /// to the end of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<(ServerPacket, usize), FrameError> {
        let type_byte = *bytes.first().ok_or(FrameError::Truncated {
            needed: 1,
            available: 0,
        })?;

        match PacketType::try_from(type_byte)? {
            PacketType::Handshake => {
                require(bytes, 2)?;
                Ok((ServerPacket::HandshakeAck { sequence: bytes[1] }, 2))
            }
            PacketType::LogMessage => {
                require(bytes, LOG_MESSAGE_HEADER_LEN)?;
                let declared = read_length(&bytes[1..LOG_MESSAGE_HEADER_LEN]);
                let total = (LOG_MESSAGE_HEADER_LEN as u64).saturating_add(declared);
                if (bytes.len() as u64) < total {
                    return Err(FrameError::LengthMismatch {
                        declared,
                        available: bytes.len() - LOG_MESSAGE_HEADER_LEN,
                    });
                }
                let total = total as usize;
                let message: Vec<u8> = bincode::deserialize(&bytes[1..total])?;
                Ok((ServerPacket::LogMessage { message }, total))
            }
            PacketType::RemoteExecute => {
                require(bytes, 3)?;
                Ok((
                    ServerPacket::RemoteExecuteResult {
                        sequence: bytes[1],
                        success: bytes[2] != 0,
                        result: bytes[3..].to_vec(),
                    },
                    bytes.len(),
                ))
            }
            PacketType::MalformedPacket => {
                let total = 2 + MALFORMED_BODY_LEN;
                require(bytes, total)?;
                let report: MalformedReport = bincode::deserialize(&bytes[2..total])?;
                Ok((
                    ServerPacket::Malformed {
                        sequence: bytes[1],
                        report,
                    },
                    total,
                ))
            }
            PacketType::KeepAlive => Err(FrameError::UnknownType(type_byte)),
        }
    }

    pub fn sequence(&self) -> Option<u8> {
        match self {
            ServerPacket::HandshakeAck { sequence }
            | ServerPacket::RemoteExecuteResult { sequence, .. }
            | ServerPacket::Malformed { sequence, .. } => Some(*sequence),
            ServerPacket::LogMessage { .. } => None,
        }
    }
}

fn require(bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}
