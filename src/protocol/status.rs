//! Status definitions
//!
//! Client request/response statuses and internal control kinds. Both travel
//! as the same status token on the wire.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RingKvError};

/// Client-facing status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusType {
    // Requests
    Get,
    Put,
    Delete,
    Keyrange,

    // Responses
    GetSuccess,
    GetError,
    PutSuccess,
    PutUpdate,
    PutError,
    DeleteSuccess,
    DeleteError,
    KeyrangeSuccess,
    ServerNotResponsible,
    ServerStopped,
    Failed,
}

impl StatusType {
    const ALL: [StatusType; 15] = [
        StatusType::Get,
        StatusType::Put,
        StatusType::Delete,
        StatusType::Keyrange,
        StatusType::GetSuccess,
        StatusType::GetError,
        StatusType::PutSuccess,
        StatusType::PutUpdate,
        StatusType::PutError,
        StatusType::DeleteSuccess,
        StatusType::DeleteError,
        StatusType::KeyrangeSuccess,
        StatusType::ServerNotResponsible,
        StatusType::ServerStopped,
        StatusType::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Get => "GET",
            StatusType::Put => "PUT",
            StatusType::Delete => "DELETE",
            StatusType::Keyrange => "KEYRANGE",
            StatusType::GetSuccess => "GET_SUCCESS",
            StatusType::GetError => "GET_ERROR",
            StatusType::PutSuccess => "PUT_SUCCESS",
            StatusType::PutUpdate => "PUT_UPDATE",
            StatusType::PutError => "PUT_ERROR",
            StatusType::DeleteSuccess => "DELETE_SUCCESS",
            StatusType::DeleteError => "DELETE_ERROR",
            StatusType::KeyrangeSuccess => "KEYRANGE_SUCCESS",
            StatusType::ServerNotResponsible => "SERVER_NOT_RESPONSIBLE",
            StatusType::ServerStopped => "SERVER_STOPPED",
            StatusType::Failed => "FAILED",
        }
    }

    /// Is this a request a client may send?
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            StatusType::Get | StatusType::Put | StatusType::Delete | StatusType::Keyrange
        )
    }

    /// Whether the first text word after the status is a key
    ///
    /// `KEYRANGE_SUCCESS` and `FAILED` carry only a value.
    pub fn carries_key(&self) -> bool {
        !matches!(
            self,
            StatusType::Keyrange | StatusType::KeyrangeSuccess | StatusType::Failed
        )
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusType {
    type Err = RingKvError;

    /// Case-insensitive; unknown tokens are rejected
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|status| status.as_str() == upper)
            .copied()
            .ok_or_else(|| RingKvError::MalformedMessage(format!("Unknown status: {}", s)))
    }
}

/// Internal control message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Init,
    Metadata,
    TransferTo,
    Receive,
    TransferComplete,
    Shutdown,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Init => "INIT",
            ControlKind::Metadata => "METADATA",
            ControlKind::TransferTo => "TRANSFER_TO",
            ControlKind::Receive => "RECEIVE",
            ControlKind::TransferComplete => "TRANSFER_COMPLETE",
            ControlKind::Shutdown => "SHUTDOWN",
        }
    }

    /// Exact match only; control tokens are never typed by hand
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INIT" => Some(ControlKind::Init),
            "METADATA" => Some(ControlKind::Metadata),
            "TRANSFER_TO" => Some(ControlKind::TransferTo),
            "RECEIVE" => Some(ControlKind::Receive),
            "TRANSFER_COMPLETE" => Some(ControlKind::TransferComplete),
            "SHUTDOWN" => Some(ControlKind::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
