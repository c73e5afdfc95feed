//! TCP listener for player connections
//!
//! Each connection opens with a [`Hello`] line that creates or joins a room.
//! After that, incoming lines are [`ClientMessage`]s forwarded to the session
//! and a writer task streams [`ServerMessage`]s back until either side closes.

use eyre::{Context, Result, eyre};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, Hello, ServerMessage};
use crate::config::ServerConfig;
use crate::coordinator::SessionHandle;
use crate::domain::{PlayerId, new_player_id};
use crate::rooms::RoomRegistry;

/// Bind the player-facing listener
pub async fn bind(addr: &str) -> Result<TcpListener> {
    debug!(%addr, "bind: called");
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!(addr = %listener.local_addr()?, "Listening for players");
    Ok(listener)
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, registry: RoomRegistry, config: ServerConfig) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
        debug!(%peer, "serve: accepted connection");

        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, registry, config).await {
                warn!(%peer, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Write one message as a JSON line
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &ServerMessage) -> Result<()> {
    let json = serde_json::to_string(message).context("Failed to serialize message")?;
    writer.write_all(json.as_bytes()).await.context("Failed to write message")?;
    writer.write_all(b"\n").await.context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush message")?;
    Ok(())
}

/// One line read from a connection
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    /// Longer than the limit; the whole line was discarded
    TooLong(usize),
    Closed,
}

/// Read one newline-terminated line, buffering at most `max_bytes` of it
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, max_bytes: usize) -> Result<Line> {
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(max_bytes as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await
        .context("Failed to read line")?;
    if read == 0 {
        return Ok(Line::Closed);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.len() <= max_bytes {
        return Ok(Line::Text(String::from_utf8_lossy(&buf).into_owned()));
    }

    let mut skipped = buf.len();
    loop {
        let (consumed, done) = {
            let chunk = reader.fill_buf().await.context("Failed to read line")?;
            match chunk.iter().position(|b| *b == b'\n') {
                Some(index) => (index + 1, true),
                None => (chunk.len(), chunk.is_empty()),
            }
        };
        reader.consume(consumed);
        skipped += consumed;
        if done {
            return Ok(Line::TooLong(skipped));
        }
    }
}

fn default_name(player_id: &str) -> String {
    let suffix = &player_id[player_id.len().saturating_sub(4)..];
    format!("agent-{}", suffix)
}

async fn handle_connection(stream: TcpStream, registry: RoomRegistry, config: ServerConfig) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let line = match read_line(&mut reader, config.max_line_bytes).await? {
        Line::Text(line) => line,
        Line::TooLong(bytes) => return Err(eyre!("Hello too large: {} bytes", bytes)),
        Line::Closed => {
            debug!("handle_connection: closed before hello");
            return Ok(());
        }
    };

    let hello: Hello = match serde_json::from_str(line.trim()) {
        Ok(hello) => hello,
        Err(e) => {
            let reason = format!("Expected createRoom or joinRoom: {}", e);
            write_message(&mut write_half, &ServerMessage::JoinRejected { reason }).await?;
            return Ok(());
        }
    };
    debug!(?hello, "handle_connection: parsed hello");

    let (handle, name) = match hello {
        Hello::CreateRoom { name } => (registry.create_room().await, name),
        Hello::JoinRoom { room, name } => match registry.get(&room).await {
            Some(handle) => (handle, name),
            None => {
                let reason = format!("Unknown room: {}", room);
                write_message(&mut write_half, &ServerMessage::JoinRejected { reason }).await?;
                return Ok(());
            }
        },
    };

    let player_id = new_player_id();
    let name = name.unwrap_or_else(|| default_name(&player_id));
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(config.client_buffer);
    handle.connect(&player_id, &name, tx).await?;

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            write_message(&mut write_half, &message).await?;
            if matches!(message, ServerMessage::JoinRejected { .. }) {
                break;
            }
        }
        Ok::<(), eyre::Report>(())
    });

    loop {
        tokio::select! {
            line = read_line(&mut reader, config.max_line_bytes) => match line {
                Ok(Line::Text(line)) => forward_line(&handle, &player_id, &line).await?,
                Ok(Line::TooLong(bytes)) => warn!(%player_id, bytes, "Dropping oversized message"),
                Ok(Line::Closed) => {
                    debug!(%player_id, "handle_connection: peer closed");
                    break;
                }
                Err(e) => {
                    warn!(%player_id, error = %e, "Failed to read from connection");
                    break;
                }
            },
            result = &mut writer => {
                match result {
                    Ok(Ok(())) => debug!(%player_id, "handle_connection: session closed the stream"),
                    Ok(Err(e)) => warn!(%player_id, error = %e, "Failed to write to connection"),
                    Err(e) => warn!(%player_id, error = %e, "Writer task failed"),
                }
                break;
            }
        }
    }

    writer.abort();
    if let Err(e) = handle.disconnect(&player_id).await {
        debug!(%player_id, error = %e, "handle_connection: session already closed");
    }
    Ok(())
}

/// Parse one client line and hand it to the session
///
/// Bad lines are logged and dropped; only a closed session is an error.
async fn forward_line(handle: &SessionHandle, player_id: &PlayerId, line: &str) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    match serde_json::from_str::<ClientMessage>(line) {
        Ok(message) => handle.send(player_id, message).await,
        Err(e) => {
            warn!(%player_id, error = %e, "Dropping malformed message");
            Ok(())
        }
    }
}
