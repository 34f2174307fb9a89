use crate::frame::FrameError;
use serde::{Deserialize, Serialize};

pub const INTEREST_LOGGING: u8 = 0x01;
pub const INTEREST_MULTIWORLD_UPDATES: u8 = 0x02;

/// Leading byte of every packet on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 1,
    LogMessage = 2,
    RemoteExecute = 3,
    KeepAlive = 4,
    MalformedPacket = 5,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether server-to-client packets of this type carry a sequence byte.
    ///
    /// Log events are unsolicited and never correlate with a request, so
    /// they are the only packets sent without one.
    pub fn is_sequenced(self) -> bool {
        !matches!(self, PacketType::LogMessage)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Handshake),
            2 => Ok(PacketType::LogMessage),
            3 => Ok(PacketType::RemoteExecute),
            4 => Ok(PacketType::KeepAlive),
            5 => Ok(PacketType::MalformedPacket),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// Optional event streams a client asked for during the handshake.
///
/// Reset to all-false on every new connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSubscriptions {
    /// Forward host log events as LogMessage packets
    pub logging: bool,
    /// Deliver multiworld update notices
    pub multiworld_updates: bool,
}

impl ClientSubscriptions {
    pub fn from_interest_byte(interests: u8) -> Self {
        Self {
            logging: interests & INTEREST_LOGGING != 0,
            multiworld_updates: interests & INTEREST_MULTIWORLD_UPDATES != 0,
        }
    }

    pub fn to_interest_byte(self) -> u8 {
        let mut interests = 0;
        if self.logging {
            interests |= INTEREST_LOGGING;
        }
        if self.multiworld_updates {
            interests |= INTEREST_MULTIWORLD_UPDATES;
        }
        interests
    }
}
