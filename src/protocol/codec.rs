//! Protocol codec
//!
//! Encoding and decoding for both framings on a shared byte stream.
//!
//! ## Internal framing
//! ```text
//! ┌────────────┬─────────────┬─────────┬─────┬─────────┬───────┬──────┐
//! │ Marker(10) │ Status (25) │ KLen(4) │ Key │ VLen(4) │ Value │ \r\n │
//! └────────────┴─────────────┴─────────┴─────┴─────────┴───────┴──────┘
//! ```
//! Status is ASCII, right-padded with spaces. Lengths are big-endian.
//! A zero length means the field is absent.
//!
//! ## External framing
//! ```text
//! STATUS [escaped-key] [value words ...]\r\n
//! ```
//! Value words are re-joined with single spaces on decode, so runs of
//! whitespace inside a value do not survive this framing. Line breaks and
//! backslashes in values travel escaped, so a value can never end the line.

use std::io::{BufRead, Read, Write};
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, RingKvError};

use super::escape::{escape, escape_value, split_escaped_token, unescape};
use super::message::{ChunkPayload, MetadataPayload, TransferPayload};
use super::{ClientMessage, ControlKind, ControlMessage, Framing, KvPairs, Message, StatusType};

/// Prefix that marks an internal frame
pub const MARKER: &[u8] = b"AzgLJSkqMm";

/// Width of the space-padded status field
pub const STATUS_WIDTH: usize = 25;

/// Frame terminator for both framings
pub const TERMINATOR: &[u8] = b"\r\n";

/// Maximum key or value size (16 MB)
pub const MAX_FIELD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Encoding
// =============================================================================

/// Build one internal frame
///
/// Fails for a key or value the decoder would refuse.
pub fn encode_frame(status: &str, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    for (what, field) in [("key", key), ("value", value)] {
        if field.len() > MAX_FIELD_SIZE as usize {
            return Err(malformed(format!(
                "{} {} too large to frame: {} bytes (max {})",
                status,
                what,
                field.len(),
                MAX_FIELD_SIZE
            )));
        }
    }

    let mut buf = BytesMut::with_capacity(
        MARKER.len() + STATUS_WIDTH + 8 + key.len() + value.len() + TERMINATOR.len(),
    );
    buf.put_slice(MARKER);
    buf.put_slice(format!("{:<width$}", status, width = STATUS_WIDTH).as_bytes());
    buf.put_u32(key.len() as u32);
    buf.put_slice(key);
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
    buf.put_slice(TERMINATOR);
    Ok(buf.to_vec())
}

/// Encode a client message in the requested framing
pub fn encode_client(message: &ClientMessage, framing: Framing) -> Result<Vec<u8>> {
    match framing {
        Framing::Internal => encode_frame(
            message.status.as_str(),
            message.key.as_deref().unwrap_or("").as_bytes(),
            message.value.as_deref().unwrap_or("").as_bytes(),
        ),
        Framing::External => {
            let mut line = String::from(message.status.as_str());
            if let Some(key) = &message.key {
                line.push(' ');
                line.push_str(&escape(key));
            }
            if let Some(value) = &message.value {
                line.push(' ');
                line.push_str(&escape_value(value));
            }
            let mut bytes = line.into_bytes();
            bytes.extend_from_slice(TERMINATOR);
            Ok(bytes)
        }
    }
}

/// Encode a control message (always internal framing)
pub fn encode_control(message: &ControlMessage) -> Result<Vec<u8>> {
    let kind = message.kind().as_str();
    match message {
        ControlMessage::Init { node } => encode_frame(kind, node.as_bytes(), &[]),
        ControlMessage::Metadata { ring, cache } => {
            let payload = bincode::serialize(&MetadataPayload {
                ring: ring.clone(),
                cache: *cache,
            })?;
            encode_frame(kind, &[], &payload)
        }
        ControlMessage::TransferTo {
            target,
            range,
            pairs,
            last,
        } => {
            let payload = bincode::serialize(&TransferPayload {
                range: *range,
                pairs: pairs.clone(),
                last: *last,
            })?;
            encode_frame(kind, target.as_bytes(), &payload)
        }
        ControlMessage::Receive { from, pairs, last } => {
            encode_frame(kind, from.as_bytes(), &encode_chunk(pairs, *last)?)
        }
        ControlMessage::TransferComplete { ping, from } => {
            encode_frame(kind, ping.as_bytes(), from.as_bytes())
        }
        ControlMessage::Shutdown { pairs, last } => {
            encode_frame(kind, &[], &encode_chunk(pairs, *last)?)
        }
    }
}

fn encode_chunk(pairs: &KvPairs, last: bool) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&ChunkPayload {
        pairs: pairs.clone(),
        last,
    })?)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one complete frame
///
/// Single entry point for both framings: the marker prefix selects internal
/// decoding, anything else is parsed as external text. Never panics; bad
/// input becomes `Message::Malformed`.
pub fn decode(bytes: &[u8]) -> Message {
    if bytes.starts_with(MARKER) {
        match decode_internal(&bytes[MARKER.len()..]) {
            Ok(message) => message,
            Err(e) => Message::Malformed {
                framing: Framing::Internal,
                reason: e.to_string(),
            },
        }
    } else {
        match decode_external(bytes) {
            Ok(message) => message,
            Err(e) => Message::Malformed {
                framing: Framing::External,
                reason: e.to_string(),
            },
        }
    }
}

fn malformed(reason: impl Into<String>) -> RingKvError {
    RingKvError::MalformedMessage(reason.into())
}

/// Take `n` bytes off the front of `input`
fn take<'a>(input: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(malformed(format!(
            "incomplete {}: expected {} bytes, got {}",
            what,
            n,
            input.len()
        )));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

fn take_len(input: &mut &[u8], what: &str) -> Result<usize> {
    let raw = take(input, 4, what)?;
    let len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    if len > MAX_FIELD_SIZE {
        return Err(malformed(format!(
            "{} too large: {} bytes (max {})",
            what, len, MAX_FIELD_SIZE
        )));
    }
    Ok(len as usize)
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(format!("{} is not UTF-8", what)))
}

fn optional_utf8(bytes: &[u8], what: &str) -> Result<Option<String>> {
    if bytes.is_empty() {
        Ok(None)
    } else {
        utf8(bytes, what).map(Some)
    }
}

fn decode_internal(body: &[u8]) -> Result<Message> {
    let mut input = body
        .strip_suffix(TERMINATOR)
        .ok_or_else(|| malformed("missing frame terminator"))?;

    let status_raw = take(&mut input, STATUS_WIDTH, "status")?;
    let status = std::str::from_utf8(status_raw)
        .map_err(|_| malformed("status is not UTF-8"))?
        .trim();

    let key_len = take_len(&mut input, "key length")?;
    let key = take(&mut input, key_len, "key")?;
    let value_len = take_len(&mut input, "value length")?;
    let value = take(&mut input, value_len, "value")?;

    if !input.is_empty() {
        return Err(malformed(format!("{} trailing bytes", input.len())));
    }

    if let Some(kind) = ControlKind::parse(status) {
        return decode_control(kind, key, value).map(Message::Control);
    }

    let status = StatusType::from_str(status)?;
    Ok(Message::Client {
        message: ClientMessage::new(status, optional_utf8(key, "key")?, optional_utf8(value, "value")?),
        framing: Framing::Internal,
    })
}

/// An empty payload is a final, empty chunk
fn decode_chunk(value: &[u8]) -> Result<(KvPairs, bool)> {
    if value.is_empty() {
        return Ok((KvPairs::new(), true));
    }
    let payload: ChunkPayload = bincode::deserialize(value)?;
    Ok((payload.pairs, payload.last))
}

fn decode_control(kind: ControlKind, key: &[u8], value: &[u8]) -> Result<ControlMessage> {
    let node = utf8(key, "node identifier")?;
    match kind {
        ControlKind::Init => {
            if node.is_empty() {
                return Err(malformed("INIT without node identity"));
            }
            Ok(ControlMessage::Init { node })
        }
        ControlKind::Metadata => {
            let payload: MetadataPayload = bincode::deserialize(value)?;
            Ok(ControlMessage::Metadata {
                ring: payload.ring,
                cache: payload.cache,
            })
        }
        ControlKind::TransferTo => {
            let payload: TransferPayload = bincode::deserialize(value)?;
            Ok(ControlMessage::TransferTo {
                target: node,
                range: payload.range,
                pairs: payload.pairs,
                last: payload.last,
            })
        }
        ControlKind::Receive => {
            let (pairs, last) = decode_chunk(value)?;
            Ok(ControlMessage::Receive {
                from: node,
                pairs,
                last,
            })
        }
        ControlKind::TransferComplete => Ok(ControlMessage::TransferComplete {
            ping: node,
            from: utf8(value, "sender")?,
        }),
        ControlKind::Shutdown => {
            let (pairs, last) = decode_chunk(value)?;
            Ok(ControlMessage::Shutdown { pairs, last })
        }
    }
}

fn decode_external(bytes: &[u8]) -> Result<Message> {
    let text = std::str::from_utf8(bytes).map_err(|_| malformed("message is not UTF-8"))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed("empty message"));
    }

    let (status_token, rest) = split_escaped_token(text);
    let status = StatusType::from_str(status_token)?;

    let rest = rest.trim_start();
    let (key, value) = if rest.is_empty() {
        (None, None)
    } else if !status.carries_key() {
        (None, Some(unescape(&rest.split_whitespace().collect::<Vec<_>>().join(" "))))
    } else {
        let (key_token, rest) = split_escaped_token(rest);
        let words: Vec<&str> = rest.split_whitespace().collect();
        let value = if words.is_empty() {
            None
        } else {
            Some(unescape(&words.join(" ")))
        };
        (Some(unescape(key_token)), value)
    };

    Ok(Message::Client {
        message: ClientMessage::new(status, key, value),
        framing: Framing::External,
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (either framing) from a stream
///
/// Sniffs the marker a byte at a time so short external lines never block
/// waiting for marker-length input. Blocks until a full frame arrives.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    while frame.len() < MARKER.len() {
        reader.read_exact(&mut byte)?;
        frame.push(byte[0]);

        if byte[0] != MARKER[frame.len() - 1] {
            if byte[0] == b'\n' {
                return Ok(frame);
            }
            let limit = (MAX_FIELD_SIZE as u64) * 2;
            reader.by_ref().take(limit).read_until(b'\n', &mut frame)?;
            if frame.last() != Some(&b'\n') {
                return Err(RingKvError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside an external frame",
                )));
            }
            return Ok(frame);
        }
    }

    let mut status = [0u8; STATUS_WIDTH];
    reader.read_exact(&mut status)?;
    frame.extend_from_slice(&status);

    for what in ["key", "value"] {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes);
        if len > MAX_FIELD_SIZE {
            return Err(malformed(format!(
                "{} too large: {} bytes (max {})",
                what, len, MAX_FIELD_SIZE
            )));
        }
        frame.extend_from_slice(&len_bytes);

        let start = frame.len();
        frame.resize(start + len as usize, 0);
        reader.read_exact(&mut frame[start..])?;
    }

    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator)?;
    frame.extend_from_slice(&terminator);

    Ok(frame)
}

/// Read and decode the next message, skipping blank external lines
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Message> {
    loop {
        let frame = read_frame(reader)?;
        if !frame.starts_with(MARKER) && frame.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        tracing::trace!("Read frame of {} bytes", frame.len());
        return Ok(decode(&frame));
    }
}

/// Write an encoded frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

/// Write a client message in the given framing
pub fn write_client<W: Write>(writer: &mut W, message: &ClientMessage, framing: Framing) -> Result<()> {
    write_frame(writer, &encode_client(message, framing)?)
}

/// Write a control message
pub fn write_control<W: Write>(writer: &mut W, message: &ControlMessage) -> Result<()> {
    write_frame(writer, &encode_control(message)?)
}
