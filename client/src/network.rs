use crate::error::ClientError;
use log::{debug, info, trace, warn};
use remote_protocol::{ClientSubscriptions, Frame, FrameError, PacketType, ServerPacket};
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// How long to keep reading after a RemoteExecute result starts arriving
const DEFAULT_RESULT_SETTLE: Duration = Duration::from_millis(50);

/// Outcome of a remote script as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResult {
    pub sequence: u8,
    pub success: bool,
    pub result: Vec<u8>,
}

impl ExecuteResult {
    pub fn result_text(&self) -> String {
        String::from_utf8_lossy(&self.result).into_owned()
    }
}

pub struct RemoteClient<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
    logs: VecDeque<Vec<u8>>,
    result_settle: Duration,
}

impl RemoteClient<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> RemoteClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            logs: VecDeque::new(),
            result_settle: DEFAULT_RESULT_SETTLE,
        }
    }

    /// A RemoteExecute result has no length prefix; it ends where the data
    /// stops. This sets how long to wait for more of it.
    pub fn with_result_settle(mut self, settle: Duration) -> Self {
        self.result_settle = settle;
        self
    }

    /// Announces the client's interests and waits for the acknowledgement.
    /// Returns the acknowledgement's sequence number.
    pub async fn handshake(&mut self, subscriptions: ClientSubscriptions) -> Result<u8, ClientError> {
        self.send_frame(&Frame::Handshake {
            interests: subscriptions.to_interest_byte(),
        })
        .await?;

        match self.next_reply().await? {
            ServerPacket::HandshakeAck { sequence } => {
                info!("Handshake acknowledged (sequence {})", sequence);
                Ok(sequence)
            }
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn keep_alive(&mut self) -> Result<(), ClientError> {
        self.send_frame(&Frame::KeepAlive).await
    }

    /// Sends a script and waits for its result.
    pub async fn execute(&mut self, script: &[u8]) -> Result<ExecuteResult, ClientError> {
        self.send_frame(&Frame::RemoteExecute {
            payload: script.to_vec(),
        })
        .await?;

        match self.next_reply().await? {
            ServerPacket::RemoteExecuteResult {
                sequence,
                success,
                result,
            } => Ok(ExecuteResult {
                sequence,
                success,
                result,
            }),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Writes raw bytes, bypassing frame encoding.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let bytes = frame.encode()?;
        trace!("Sending {:?} ({} bytes)", frame.packet_type(), bytes.len());
        self.send_raw(&bytes).await
    }

    /// Log lines received so far, oldest first
    pub fn take_logs(&mut self) -> Vec<Vec<u8>> {
        self.logs.drain(..).collect()
    }

    /// Waits for the next log line.
    pub async fn next_log(&mut self) -> Result<Vec<u8>, ClientError> {
        loop {
            if let Some(message) = self.logs.pop_front() {
                return Ok(message);
            }
            match self.next_packet().await? {
                ServerPacket::LogMessage { message } => return Ok(message),
                ServerPacket::Malformed { report, .. } => return Err(ClientError::Malformed(report)),
                other => warn!("Ignoring {:?} while waiting for a log line", other),
            }
        }
    }

    /// Next packet that is not a log line; log lines are kept for
    /// [`take_logs`](Self::take_logs).
    async fn next_reply(&mut self) -> Result<ServerPacket, ClientError> {
        loop {
            match self.next_packet().await? {
                ServerPacket::LogMessage { message } => {
                    debug!("Server log: {}", String::from_utf8_lossy(&message));
                    self.logs.push_back(message);
                }
                ServerPacket::Malformed { report, .. } => return Err(ClientError::Malformed(report)),
                packet => return Ok(packet),
            }
        }
    }

    /// Reads and decodes the next packet from the server.
    pub async fn next_packet(&mut self) -> Result<ServerPacket, ClientError> {
        loop {
            if !self.buffer.is_empty() {
                if self.buffer[0] == PacketType::RemoteExecute.as_u8() {
                    self.settle().await?;
                }
                match ServerPacket::decode(&self.buffer) {
                    Ok((packet, used)) => {
                        self.buffer.drain(..used);
                        return Ok(packet);
                    }
                    Err(FrameError::Truncated { .. }) | Err(FrameError::LengthMismatch { .. }) => {}
                    Err(e) => {
                        self.buffer.clear();
                        return Err(e.into());
                    }
                }
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), ClientError> {
        let mut chunk = [0u8; 4096];
        let len = self.stream.read(&mut chunk).await?;
        if len == 0 {
            return Err(ClientError::Closed);
        }
        self.buffer.extend_from_slice(&chunk[..len]);
        Ok(())
    }

    /// Collects whatever arrives within the settle window.
    async fn settle(&mut self) -> Result<(), ClientError> {
        let mut chunk = [0u8; 4096];
        loop {
            match timeout(self.result_settle, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => return Ok(()),
                Ok(Ok(len)) => self.buffer.extend_from_slice(&chunk[..len]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
