//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading commands and sending
//! responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  Decode every complete       │
//!    │  command in the buffer,      │
//!    │  execute, reply              │
//!    │              │               │
//!    │              ▼               │
//!    │  Read more bytes, or stop    │
//!    │  on shutdown                 │
//!    │              │               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error / shutdown
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a BytesMut buffer. After each decoded
//! command only the consumed prefix is dropped, so several pipelined
//! commands arriving in one read are all answered, in order. Bytes that
//! fail to decode are answered with one error reply and discarded; the
//! connection stays open.

use crate::commands::CommandHandler;
use crate::protocol::{ProtocolError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Maximum size of undecoded data held for one client (64 MB)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, parsing, and response sending
/// for one connected client.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Flips to `true` when the server is shutting down
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    /// * `shutdown` - Server shutdown signal
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
            shutdown,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Commands are read, executed and answered until the client
    /// disconnects, an I/O error occurs or the server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed by server"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::UnexpectedEof) => debug!(
                client = %self.addr,
                discarded = self.buffer.len(),
                "Client disconnected mid-command"
            ),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut shutdown = self.shutdown.clone();

        loop {
            self.process_buffer().await?;

            if *shutdown.borrow() {
                return Ok(());
            }

            tokio::select! {
                result = self.read_more_data() => result?,
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// Executes every complete command currently in the buffer.
    async fn process_buffer(&mut self) -> Result<(), ConnectionError> {
        while !self.buffer.is_empty() {
            match self.parser.parse(&self.buffer) {
                Ok(Some((request, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed command"
                    );

                    let response = self.command_handler.execute(request).await;
                    self.stats.command_processed();

                    match response {
                        Some(response) => self.send_response(&response).await?,
                        None => trace!(client = %self.addr, "Ignored non-command value"),
                    }
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete command, need more data"
                    );
                    break;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error");
                    self.buffer.clear();
                    self.send_response(&RespValue::error(format!("protocol error: {}", e)))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command in buffer, dropped with the connection
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = match response.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Reply cannot be encoded");
                RespValue::error(format!("reply could not be encoded: {}", e)).encode()?
            }
        };
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A reply that could not be encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected | ConnectionError::UnexpectedEof => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                info!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
