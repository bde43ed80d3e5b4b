//! Protocol Module
//!
//! Wire protocol shared by client connections and cluster control traffic.
//!
//! ## Two framings, one stream
//! - **Internal**: marker-prefixed, length-delimited frames. Carries control
//!   messages and, from the client library, client messages with arbitrary
//!   key/value bytes.
//! - **External**: plain text `STATUS [key] [value...]` lines, usable from a
//!   terminal.
//!
//! `decode` inspects the leading bytes and returns a tagged `Message`.
//! Responses go back in the framing the request arrived in.
//!
//! ### Client Statuses
//! - Requests: GET, PUT, DELETE, KEYRANGE (`PUT key null` deletes)
//! - Responses: GET_SUCCESS, GET_ERROR, PUT_SUCCESS, PUT_UPDATE, PUT_ERROR,
//!   DELETE_SUCCESS, DELETE_ERROR, KEYRANGE_SUCCESS,
//!   SERVER_NOT_RESPONSIBLE, SERVER_STOPPED, FAILED
//!
//! ### Control Kinds
//! - INIT, METADATA, TRANSFER_TO, RECEIVE, TRANSFER_COMPLETE, SHUTDOWN

mod codec;
mod escape;
mod message;
mod status;

pub use codec::{
    decode, encode_client, encode_control, encode_frame, read_frame, read_message, write_client,
    write_control, write_frame, MARKER, MAX_FIELD_SIZE, STATUS_WIDTH, TERMINATOR,
};
pub use escape::{escape, escape_value, unescape};
pub use message::{chunk_pairs, ClientMessage, ControlMessage, Framing, KvPairs, Message, MAX_PAIR_SIZE};
pub use status::{ControlKind, StatusType};
