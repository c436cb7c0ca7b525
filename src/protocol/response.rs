//! Response definitions
//!
//! Represents responses to clients.

use bytes::Bytes;

use super::Request;

/// Response status codes
///
/// The full set defined by the binary protocol. The server only emits
/// `Ok`, `KeyNotFound` and `UnknownCommand`; the rest are kept so the
/// codes stay reserved and clients can decode them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Ok = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumericValue = 0x0006,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
}

impl Status {
    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            0x0000 => Status::Ok,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::NonNumericValue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A response to send to a client
///
/// Always built from the request it answers, so opcode, opaque and CAS
/// are echoed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opcode: u8,
    pub status: Status,
    pub opaque: u32,
    pub cas: u64,

    /// Value for a GET hit; `None` means an empty body
    pub value: Option<Bytes>,
}

impl Response {
    /// Response to `request` with an explicit status
    pub fn for_request(request: &Request, status: Status, value: Option<Bytes>) -> Self {
        Self {
            opcode: request.opcode,
            status,
            opaque: request.opaque,
            cas: request.cas,
            value,
        }
    }

    /// Create an OK response with optional value
    pub fn ok(request: &Request, value: Option<Bytes>) -> Self {
        Self::for_request(request, Status::Ok, value)
    }

    /// Create a KEY_NOT_FOUND response
    pub fn not_found(request: &Request) -> Self {
        Self::for_request(request, Status::KeyNotFound, None)
    }

    /// Create an UNKNOWN_COMMAND response
    pub fn unknown_command(request: &Request) -> Self {
        Self::for_request(request, Status::UnknownCommand, None)
    }

    /// Length of the body this response puts on the wire
    pub fn body_length(&self) -> usize {
        self.value.as_ref().map_or(0, |v| v.len())
    }
}
