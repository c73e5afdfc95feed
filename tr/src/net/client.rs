//! Line-protocol client
//!
//! A thin player connection used by the integration tests and handy for
//! poking at a running server.

use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use super::messages::{ClientMessage, Hello, ServerMessage};
use crate::domain::{PlayerId, RoomCode};

/// Default timeout for waiting on a server message
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the server says after a successful hello
#[derive(Debug, Clone)]
pub struct Joined {
    pub room: RoomCode,
    pub player_id: PlayerId,
}

pub struct RelayClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl RelayClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.context("Failed to connect to server")?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn write_line<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize message")?;
        self.writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write message")?;
        self.writer.write_all(b"\n").await.context("Failed to write newline")?;
        self.writer.flush().await.context("Failed to flush message")?;
        Ok(())
    }

    /// Send the opening hello and wait for the verdict
    pub async fn hello(&mut self, hello: &Hello) -> Result<Joined> {
        debug!(?hello, "RelayClient::hello: called");
        self.write_line(hello).await?;
        match self.recv().await? {
            ServerMessage::Welcome { room, player_id, .. } => Ok(Joined { room, player_id }),
            ServerMessage::JoinRejected { reason } => Err(eyre!("Join rejected: {}", reason)),
            other => Err(eyre!("Unexpected reply to hello: {}", other.kind())),
        }
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        debug!(?message, "RelayClient::send: called");
        self.write_line(message).await
    }

    /// Wait for the next server message
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        let line = tokio::time::timeout(self.timeout, self.lines.next_line())
            .await
            .map_err(|_| eyre!("Timed out waiting for server"))?
            .context("Failed to read from server")?
            .ok_or_else(|| eyre!("Server closed the connection"))?;
        serde_json::from_str(&line).context("Failed to parse server message")
    }

    /// Skip messages until one matches
    pub async fn recv_until<F>(&mut self, mut matches: F) -> Result<ServerMessage>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let message = self.recv().await?;
            if matches(&message) {
                return Ok(message);
            }
            debug!(kind = message.kind(), "RelayClient::recv_until: skipping");
        }
    }
}
