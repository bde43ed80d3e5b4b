//! Client Connection Handler
//!
//! Serves one client connection against the node's `KvService`.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RingKvError};
use crate::protocol::{read_message, write_client, ClientMessage, Framing, Message, StatusType};

use super::KvService;

/// Handles a single client connection
pub struct ClientConnection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    service: Arc<KvService>,

    /// Peer address for logging
    peer_addr: String,
}

impl ClientConnection {
    /// Set up buffered I/O over an accepted stream
    pub fn new(stream: TcpStream, service: Arc<KvService>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            service,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Serve requests until the client disconnects
    ///
    /// Every response uses the framing of the request it answers.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let (response, framing) = match read_message(&mut self.reader) {
                Ok(Message::Client { message, framing }) => {
                    tracing::trace!("Request from {}: {:?}", self.peer_addr, message);
                    (self.execute(message), framing)
                }
                Ok(Message::Malformed { framing, reason }) => {
                    tracing::debug!("Malformed request from {}: {}", self.peer_addr, reason);
                    (ClientMessage::failed(reason), framing)
                }
                Ok(Message::Control(control)) => (
                    ClientMessage::failed(format!(
                        "{} is not accepted on the client port",
                        control.kind()
                    )),
                    Framing::Internal,
                ),
                Err(e) if e.is_disconnect() => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(RingKvError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            if let Err(e) = write_client(&mut self.writer, &response, framing) {
                if e.is_disconnect() {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a request and build its response
    fn execute(&self, request: ClientMessage) -> ClientMessage {
        let key = request.key.as_deref();

        match (request.status, key) {
            (StatusType::Get, Some(key)) => match self.service.get(key) {
                Ok(value) => ClientMessage::reply(StatusType::GetSuccess, Some(key), Some(&value)),
                Err(e) => self.error_reply(StatusType::GetError, key, e),
            },
            (StatusType::Put, Some(key)) => {
                let value = request.value.as_deref().unwrap_or("");
                match self.service.put(key, value) {
                    Ok(StatusType::DeleteSuccess) => {
                        ClientMessage::reply(StatusType::DeleteSuccess, Some(key), None)
                    }
                    Ok(status) => ClientMessage::reply(status, Some(key), Some(value)),
                    Err(e) if value == "null" => self.error_reply(StatusType::DeleteError, key, e),
                    Err(e) => self.error_reply(StatusType::PutError, key, e),
                }
            }
            (StatusType::Delete, Some(key)) => match self.service.delete(key) {
                Ok(status) => ClientMessage::reply(status, Some(key), None),
                Err(e) => self.error_reply(StatusType::DeleteError, key, e),
            },
            (StatusType::Keyrange, _) => match self.service.key_ranges() {
                Ok(ranges) => ClientMessage::reply(StatusType::KeyrangeSuccess, None, Some(&ranges)),
                Err(RingKvError::ServerStopped) => {
                    ClientMessage::reply(StatusType::ServerStopped, None, None)
                }
                Err(e) => ClientMessage::failed(e.to_string()),
            },
            (StatusType::Get | StatusType::Put | StatusType::Delete, None) => {
                ClientMessage::failed(format!("{} requires a key", request.status))
            }
            (status, _) => ClientMessage::failed(format!("{} is not a request", status)),
        }
    }

    /// Map a service error onto the response status
    fn error_reply(&self, failure: StatusType, key: &str, error: RingKvError) -> ClientMessage {
        match error {
            RingKvError::NotResponsible(_) => {
                ClientMessage::reply(StatusType::ServerNotResponsible, Some(key), None)
            }
            RingKvError::ServerStopped => {
                ClientMessage::reply(StatusType::ServerStopped, Some(key), None)
            }
            e => {
                tracing::debug!("{} for {} from {}: {}", failure, key, self.peer_addr, e);
                ClientMessage::reply(failure, Some(key), None)
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
