//! Client side of the page protocol.
//!
//! Connects to a server, walks the word sequence page by page, and counts
//! every word it receives. One request is in flight at a time.
//!
//! ```text
//! Connecting ──ok──▶ Requesting ──sent──▶ AwaitingResponse ──page──▶ Requesting
//!     │                  │                      │
//!   error             send error         EOF page / closed
//!     ▼                  ▼                      ▼
//!  (fatal)             Failed                  Done
//! ```

use crate::config::ClientConfig;
use crate::frequency::FrequencyTable;
use crate::protocol::{decode_response, encode_request, PageRequest, PageResponse};
use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, trace, warn};

/// Expected response line length; longer lines are still accepted.
const RESPONSE_CAPACITY: usize = 1024;

/// Fatal client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {0}: {1}")]
    Connect(SocketAddr, #[source] std::io::Error),
}

/// Client session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Requesting,
    AwaitingResponse,
    /// Terminal: end of stream seen, or the server hung up.
    Done,
    /// Terminal: a request could not be sent.
    Failed,
}

impl ClientState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientState::Done | ClientState::Failed)
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A page carried the sentinel.
    EndOfStream,
    /// The connection closed or failed while waiting for a page.
    ConnectionClosed,
    /// A request could not be written.
    SendFailed,
}

/// Offset of the next page and the fixed page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCursor {
    offset: usize,
    step: usize,
}

impl SessionCursor {
    pub fn new(offset: usize, step: usize) -> Self {
        Self { offset, step }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.offset, self.step)
    }

    /// Move to the next page.
    pub fn advance(&mut self) {
        self.offset = self.offset.saturating_add(self.step);
    }
}

/// Result of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub frequencies: FrequencyTable,
    pub pages: u64,
    pub outcome: SessionOutcome,
    pub elapsed: Duration,
}

impl SessionReport {
    /// Write the sorted frequency table followed by the elapsed time.
    /// With `quiet` set only the elapsed time line is written.
    pub fn write_to<W: Write>(&self, out: &mut W, quiet: bool) -> std::io::Result<()> {
        if !quiet {
            for (word, count) in self.frequencies.snapshot() {
                writeln!(out, "{word}, {count}")?;
            }
        }
        writeln!(out, "ELAPSED_MS:{}", self.elapsed.as_millis())
    }
}

/// Client instance
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client { config }
    }

    /// Connect and run a full session.
    ///
    /// Only a failed connect is an error. Anything that goes wrong later ends
    /// the session and the words counted so far are reported.
    pub async fn run(&self) -> Result<SessionReport, ClientError> {
        let started = Instant::now();
        let server = self.config.server;

        trace!(%server, "Connecting");
        let stream = TcpStream::connect(server)
            .await
            .map_err(|e| ClientError::Connect(server, e))?;
        info!(
            %server,
            step = self.config.step,
            offset = self.config.initial_offset,
            "Connected"
        );

        let cursor = SessionCursor::new(self.config.initial_offset, self.config.step);
        let mut report = run_session(stream, cursor).await;
        report.elapsed = started.elapsed();

        info!(
            pages = report.pages,
            distinct = report.frequencies.len(),
            words = report.frequencies.total(),
            outcome = ?report.outcome,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Session finished"
        );
        Ok(report)
    }
}

/// Drive a connected session until it reaches a terminal state.
pub async fn run_session<S>(stream: S, mut cursor: SessionCursor) -> SessionReport
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(RESPONSE_CAPACITY);

    let mut frequencies = FrequencyTable::new();
    let mut pages = 0;
    let mut outcome = SessionOutcome::EndOfStream;
    let mut state = ClientState::Connecting;

    while !state.is_terminal() {
        state = match state {
            // The stream arrives already connected.
            ClientState::Connecting => ClientState::Requesting,

            ClientState::Requesting => {
                let request = encode_request(cursor.request());
                match writer.write_all(request.as_bytes()).await {
                    Ok(()) => ClientState::AwaitingResponse,
                    Err(e) => {
                        warn!(offset = cursor.offset(), error = %e, "Failed to send request");
                        outcome = SessionOutcome::SendFailed;
                        ClientState::Failed
                    }
                }
            }

            ClientState::AwaitingResponse => {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => {
                        warn!(
                            offset = cursor.offset(),
                            "Server closed connection before end of stream"
                        );
                        outcome = SessionOutcome::ConnectionClosed;
                        ClientState::Done
                    }
                    Err(e) => {
                        warn!(offset = cursor.offset(), error = %e, "Failed to read response");
                        outcome = SessionOutcome::ConnectionClosed;
                        ClientState::Done
                    }
                    Ok(_) => {
                        pages += 1;
                        let page = decode_page(&String::from_utf8_lossy(&line));
                        trace!(
                            offset = cursor.offset(),
                            words = page.words.len(),
                            end_of_stream = page.end_of_stream,
                            "Received page"
                        );

                        frequencies.record_all(page.words.iter().map(String::as_str));

                        if page.end_of_stream {
                            outcome = SessionOutcome::EndOfStream;
                            ClientState::Done
                        } else {
                            cursor.advance();
                            ClientState::Requesting
                        }
                    }
                }
            }

            ClientState::Done | ClientState::Failed => state,
        };
    }

    SessionReport {
        frequencies,
        pages,
        outcome,
        elapsed: started.elapsed(),
    }
}

/// Decode a response line, salvaging what it can from a broken frame.
fn decode_page(frame: &str) -> PageResponse {
    decode_response(frame).unwrap_or_else(|violation| {
        warn!(error = %violation, "Using partial response frame");
        violation.partial
    })
}
