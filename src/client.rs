//! Client
//!
//! Blocking request/response client for a single storage node.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use crate::error::{Result, RingKvError};
use crate::protocol::{read_message, write_client, ClientMessage, Framing, Message};

/// Connection to one storage node
pub struct KvClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    framing: Framing,
    server: String,
}

impl KvClient {
    /// Connect using Internal framing
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            framing: Framing::Internal,
            server: addr.to_string(),
        })
    }

    /// Switch the framing used for subsequent requests
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Send one request and wait for its response
    pub fn send(&mut self, request: &ClientMessage) -> Result<ClientMessage> {
        write_client(&mut self.writer, request, self.framing)?;
        match read_message(&mut self.reader)? {
            Message::Client { message, .. } => Ok(message),
            Message::Malformed { reason, .. } => Err(RingKvError::MalformedMessage(reason)),
            Message::Control(control) => Err(RingKvError::MalformedMessage(format!(
                "unexpected {} from {}",
                control.kind(),
                self.server
            ))),
        }
    }

    pub fn get(&mut self, key: &str) -> Result<ClientMessage> {
        self.send(&ClientMessage::get(key))
    }

    pub fn put(&mut self, key: &str, value: &str) -> Result<ClientMessage> {
        self.send(&ClientMessage::put(key, value))
    }

    pub fn delete(&mut self, key: &str) -> Result<ClientMessage> {
        self.send(&ClientMessage::delete(key))
    }

    pub fn keyrange(&mut self) -> Result<ClientMessage> {
        self.send(&ClientMessage::keyrange())
    }
}
