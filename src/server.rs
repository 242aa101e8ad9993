//! TCP server for the page protocol.
//!
//! Accepts one connection at a time and drives it to completion before
//! accepting the next. Each session reads request lines, answers them from
//! the shared word store, and closes after the page carrying the sentinel.

use crate::config::ServerConfig;
use crate::protocol::{self, encode_response};
use crate::store::WordStore;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace, warn};

/// Listen backlog for the accepting socket.
const LISTEN_BACKLOG: i32 = 5;

/// Response buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Expected request line length; longer lines are still accepted.
const MAX_LINE_LENGTH: usize = 64;

/// Server errors that stop the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to load word file '{}': {}", .0.display(), .1)]
    WordFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The sentinel page was sent and the server closed the connection.
    EndOfStream,
    /// The client closed the connection first.
    ClientClosed,
}

/// Per-connection counters, logged when the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub requests: u64,
    pub words_sent: u64,
    pub malformed: u64,
    pub end: SessionEnd,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            requests: 0,
            words_sent: 0,
            malformed: 0,
            end: SessionEnd::ClientClosed,
        }
    }
}

/// Server instance
pub struct Server {
    config: ServerConfig,
    store: Arc<WordStore>,
}

impl Server {
    /// Create a server over an already loaded store
    pub fn new(config: ServerConfig, store: Arc<WordStore>) -> Self {
        Server { config, store }
    }

    /// Create a server, loading the word file named in the config
    pub fn from_config(config: ServerConfig) -> Result<Self, ServerError> {
        let store = WordStore::from_file(&config.filename)
            .map_err(|e| ServerError::WordFile(config.filename.clone(), e))?;
        Ok(Self::new(config, store))
    }

    /// Bind the listening socket with `SO_REUSEADDR` set.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.listen;
        create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|e| ServerError::Bind(addr, e))
    }

    /// Bind and serve until Ctrl-C.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        info!(
            address = %self.config.listen,
            words = self.store.len(),
            "Server listening"
        );
        if self.store.is_empty() {
            warn!("Word file is empty, every session ends on its first page");
        }

        tokio::select! {
            _ = self.serve(listener) => {}
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(ServerError::Signal)?;
                info!("Shutting down");
            }
        }

        Ok(())
    }

    /// Accept and serve connections one at a time, forever.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "New connection");

                    match handle_connection(stream, &self.store).await {
                        Ok(stats) => debug!(
                            %peer,
                            requests = stats.requests,
                            words = stats.words_sent,
                            malformed = stats.malformed,
                            end = ?stats.end,
                            "Session finished"
                        ),
                        Err(e) => debug!(%peer, error = %e, "Connection error"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the store for testing
    #[cfg(test)]
    pub fn store(&self) -> &Arc<WordStore> {
        &self.store
    }
}

/// Create a listening socket, handing it to Tokio in non-blocking mode.
fn create_listener(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Drive one session to completion.
///
/// Malformed request fields are treated as 0. The connection is shut down
/// right after the first end-of-stream page is written.
pub async fn handle_connection<S>(stream: S, store: &WordStore) -> std::io::Result<SessionStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(MAX_LINE_LENGTH);
    let mut response = BytesMut::with_capacity(BUFFER_SIZE);
    let mut stats = SessionStats::default();

    loop {
        line.clear();

        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            trace!("Connection closed by client");
            break;
        }

        let text = String::from_utf8_lossy(&line);
        let request = match protocol::decode_request(&text) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Malformed request, defaulting fields to 0");
                stats.malformed += 1;
                protocol::decode_request_lenient(&text)
            }
        };

        let page = store.serve(request.offset, request.count);
        trace!(
            offset = request.offset,
            count = request.count,
            returned = page.words.len(),
            end_of_stream = page.end_of_stream,
            "Serving page"
        );

        response.clear();
        encode_response(&page, &mut response);
        writer.write_all(&response).await?;

        stats.requests += 1;
        stats.words_sent += page.words.len() as u64;

        if page.end_of_stream {
            writer.shutdown().await?;
            stats.end = SessionEnd::EndOfStream;
            break;
        }
    }

    Ok(stats)
}
