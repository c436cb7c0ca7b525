//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::protocol::{read_request, write_response, Command, Request, Response};
use crate::store::Storage;

use super::shutdown::Shutdown;

/// Where a connection is in its request/response cycle
///
/// Body decoding happens inside `read_request`, so it has no state of its
/// own here.
enum State {
    AwaitingRequest,
    Dispatching(Request),
    WritingResponse(Response),
    Closed,
}

/// Handles a single client connection
pub(crate) struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared key-value store
    storage: Arc<dyn Storage>,

    /// Checked between frames
    shutdown: Shutdown,

    max_body_size: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and applies the configured timeouts
    pub(crate) fn new(
        stream: TcpStream,
        storage: Arc<dyn Storage>,
        shutdown: Shutdown,
        config: &Config,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        if config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
        }
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            storage,
            shutdown,
            max_body_size: config.max_body_size,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Serves one request at a time, in arrival order. Returns `Ok` when
    /// the client disconnects between frames, the read times out, or the
    /// server is shutting down; returns the error when a frame is
    /// truncated or malformed or a response cannot be written. No partial
    /// response is ever sent.
    pub(crate) fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let mut state = State::AwaitingRequest;
        loop {
            state = match state {
                State::AwaitingRequest => self.await_request()?,
                State::Dispatching(request) => {
                    State::WritingResponse(dispatch(self.storage.as_ref(), &request))
                }
                State::WritingResponse(response) => {
                    self.send_response(&response)?;
                    State::AwaitingRequest
                }
                State::Closed => return Ok(()),
            };
        }
    }

    fn await_request(&mut self) -> Result<State> {
        if self.shutdown.is_triggered() {
            tracing::debug!("Server shutting down, closing connection from {}", self.peer_addr);
            return Ok(State::Closed);
        }

        match read_request(&mut self.reader, self.max_body_size) {
            Ok(Some(request)) => Ok(State::Dispatching(request)),
            Ok(None) => {
                tracing::debug!("Client {} disconnected", self.peer_addr);
                Ok(State::Closed)
            }
            Err(CacheError::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                // Windows reports TimedOut instead of WouldBlock
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                Ok(State::Closed)
            }
            Err(CacheError::Io(ref e))
                if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) =>
            {
                tracing::debug!("Connection reset by client {}", self.peer_addr);
                Ok(State::Closed)
            }
            Err(e) => {
                // Framing is lost, nothing reliable can be sent back
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                Err(e)
            }
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: &Response) -> Result<()> {
        if let Err(e) = write_response(&mut self.writer, response) {
            if e.is_disconnect() {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr, e
                );
            } else {
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Execute one request against the store
///
/// Every request yields exactly one response, echoing opcode, opaque and
/// CAS. SET overwrites unconditionally; DELETE answers OK whether or not
/// the key existed.
pub fn dispatch(storage: &dyn Storage, request: &Request) -> Response {
    match request.command() {
        Command::Get { key } => {
            tracing::trace!("GET {:?}", key);
            match storage.get(&key) {
                Some(value) => Response::ok(request, Some(value)),
                None => Response::not_found(request),
            }
        }
        Command::Set { key, value } => {
            tracing::trace!("SET {:?} ({} bytes)", key, value.len());
            storage.put(key.to_vec(), value);
            Response::ok(request, None)
        }
        Command::Delete { key } => {
            tracing::trace!("DELETE {:?}", key);
            storage.delete(&key);
            Response::ok(request, None)
        }
        Command::Unknown { opcode } => {
            tracing::debug!("Unsupported opcode 0x{:02x}", opcode);
            Response::unknown_command(request)
        }
    }
}
