//! Incremental frame reassembly for a byte stream that arrives in pieces.
//!
//! The network side asks [`FrameAssembler::wanted`] how many bytes the
//! current frame stage still needs and never reads more than that, so a
//! read can never consume bytes belonging to the next frame. Partial frames
//! survive across calls; a slow client simply completes its frame on a
//! later tick.

use crate::frame::{read_length, Frame};
use crate::packet::PacketType;
use crate::response::MalformedReport;

/// Upper bound on a single read while skipping an oversized payload
const DISCARD_CHUNK: usize = 4096;

/// Result of feeding bytes to the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Frame(Frame),
    Malformed(MalformedReport),
}

#[derive(Debug)]
enum Stage {
    Idle,
    Header {
        packet_type: PacketType,
        header: Vec<u8>,
        needed: usize,
    },
    Body {
        packet_type: PacketType,
        declared: usize,
        payload: Vec<u8>,
    },
    Discard {
        remaining: u64,
    },
}

#[derive(Debug)]
pub struct FrameAssembler {
    stage: Stage,
    max_payload_len: usize,
}

impl FrameAssembler {
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            stage: Stage::Idle,
            max_payload_len,
        }
    }

    /// True when no frame is partially assembled
    pub fn is_idle(&self) -> bool {
        matches!(self.stage, Stage::Idle)
    }

    /// Number of bytes the current stage still needs. Always at least one.
    pub fn wanted(&self) -> usize {
        match &self.stage {
            Stage::Idle => 1,
            Stage::Header { header, needed, .. } => needed - header.len(),
            Stage::Body {
                declared, payload, ..
            } => declared - payload.len(),
            Stage::Discard { remaining } => (*remaining).min(DISCARD_CHUNK as u64) as usize,
        }
    }

    /// Drops any partially assembled frame.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
    }

    /// Feeds received bytes, returning every frame or diagnostic they complete.
    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<Assembled> {
        let mut completed = Vec::new();

        while !bytes.is_empty() {
            let take = self.wanted().min(bytes.len());
            let (chunk, rest) = bytes.split_at(take);
            bytes = rest;

            if let Some(event) = self.advance(chunk) {
                completed.push(event);
            }
        }

        completed
    }

    // `chunk` never exceeds `wanted()`
    fn advance(&mut self, chunk: &[u8]) -> Option<Assembled> {
        match &mut self.stage {
            Stage::Idle => self.start(chunk[0]),
            Stage::Header {
                packet_type,
                header,
                needed,
            } => {
                header.extend_from_slice(chunk);
                if header.len() < *needed {
                    return None;
                }
                let packet_type = *packet_type;
                let header = std::mem::take(header);
                self.finish_header(packet_type, &header)
            }
            Stage::Body {
                packet_type,
                declared,
                payload,
            } => {
                payload.extend_from_slice(chunk);
                if payload.len() < *declared {
                    return None;
                }
                let packet_type = *packet_type;
                let payload = std::mem::take(payload);
                self.stage = Stage::Idle;
                Some(Assembled::Frame(complete(packet_type, payload)))
            }
            Stage::Discard { remaining } => {
                *remaining -= chunk.len() as u64;
                if *remaining == 0 {
                    self.stage = Stage::Idle;
                }
                None
            }
        }
    }

    fn start(&mut self, type_byte: u8) -> Option<Assembled> {
        let (packet_type, needed) = match PacketType::try_from(type_byte) {
            Ok(PacketType::KeepAlive) => return Some(Assembled::Frame(Frame::KeepAlive)),
            Ok(packet_type @ PacketType::Handshake) => (packet_type, 1),
            Ok(packet_type @ PacketType::RemoteExecute) => (packet_type, 4),
            Ok(packet_type @ PacketType::LogMessage) => (packet_type, 8),
            Ok(PacketType::MalformedPacket) | Err(_) => {
                return Some(Assembled::Malformed(MalformedReport {
                    offending_type: type_byte as u32,
                    received: 1,
                    expected: 0,
                }));
            }
        };

        self.stage = Stage::Header {
            packet_type,
            header: Vec::with_capacity(needed),
            needed,
        };
        None
    }

    fn finish_header(&mut self, packet_type: PacketType, header: &[u8]) -> Option<Assembled> {
        if packet_type == PacketType::Handshake {
            self.stage = Stage::Idle;
            return Some(Assembled::Frame(Frame::Handshake {
                interests: header[0],
            }));
        }

        let declared = read_length(header);
        let header_len = 1 + header.len() as u64;

        if declared > self.max_payload_len as u64 {
            self.stage = Stage::Discard {
                remaining: declared,
            };
            return Some(Assembled::Malformed(MalformedReport {
                offending_type: packet_type.as_u8() as u32,
                received: clamp_u32(header_len),
                expected: clamp_u32(header_len.saturating_add(declared)),
            }));
        }

        if declared == 0 {
            self.stage = Stage::Idle;
            return Some(Assembled::Frame(complete(packet_type, Vec::new())));
        }

        let declared = declared as usize;
        self.stage = Stage::Body {
            packet_type,
            declared,
            payload: Vec::with_capacity(declared),
        };
        None
    }
}

fn complete(packet_type: PacketType, payload: Vec<u8>) -> Frame {
    match packet_type {
        PacketType::LogMessage => Frame::LogMessage { message: payload },
        _ => Frame::RemoteExecute { payload },
    }
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}
