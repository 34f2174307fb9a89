//! Wire protocol shared by the remote-control server and its clients.
//!
//! Every packet starts with a single type byte. Client-to-server frames are
//! delimited by a type-specific layout (see [`Frame`]); server-to-client
//! packets additionally carry a one-byte response sequence number directly
//! after the type byte so a client can correlate requests and responses.
//!
//! | Value | Name            | Direction | Payload                                   |
//! |-------|-----------------|-----------|-------------------------------------------|
//! | 1     | Handshake       | both      | 1 byte interest flags                     |
//! | 2     | LogMessage      | s -> c    | 8-byte LE length + message                |
//! | 3     | RemoteExecute   | both      | 4-byte LE length + script / success + text |
//! | 4     | KeepAlive       | c -> s    | none                                      |
//! | 5     | MalformedPacket | s -> c    | type, received, expected (u32 LE each)    |

pub mod assembler;
pub mod frame;
pub mod packet;
pub mod response;

pub use assembler::{Assembled, FrameAssembler};
pub use frame::{Frame, FrameError};
pub use packet::{ClientSubscriptions, PacketType, INTEREST_LOGGING, INTEREST_MULTIWORLD_UPDATES};
pub use response::{MalformedReport, OutboundPacket, ServerPacket};

/// Version of the remote protocol spoken by this crate.
pub const PROTOCOL_VERSION: u8 = 1;

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6969;

/// Largest script payload accepted in a single RemoteExecute request.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Type byte plus the 4-byte little-endian payload length.
pub const REMOTE_EXECUTE_HEADER_LEN: usize = 5;

/// Type byte plus the 8-byte little-endian message length.
pub const LOG_MESSAGE_HEADER_LEN: usize = 9;
