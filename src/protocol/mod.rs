//! Protocol Module
//!
//! The memcached binary wire protocol (the subset this server speaks).
//!
//! ## Frame Format
//!
//! Every frame is a 24-byte header followed by a body. All multi-byte
//! fields are big-endian.
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!    /              |               |               |               |
//!   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
//!   +---------------+---------------+---------------+---------------+
//!  0| Magic         | Opcode        | Key length                    |
//!   +---------------+---------------+---------------+---------------+
//!  4| Extras length | Data type     | vbucket / status              |
//!   +---------------+---------------+---------------+---------------+
//!  8| Total body length                                             |
//!   +---------------+---------------+---------------+---------------+
//! 12| Opaque                                                        |
//!   +---------------+---------------+---------------+---------------+
//! 16| CAS                                                           |
//!   |                                                               |
//!   +---------------+---------------+---------------+---------------+
//! 24| Extras, then key, then value                                  |
//!   +---------------------------------------------------------------+
//! ```
//!
//! Requests carry magic 0x80 and a vbucket id at offset 6; responses carry
//! magic 0x81 and the status code at offset 6.
//!
//! ### Opcodes
//! - 0x00: GET
//! - 0x01: SET
//! - 0x04: DELETE
//!
//! Any other opcode is decoded as [`Command::Unknown`] and answered with
//! `UNKNOWN_COMMAND`.

mod command;
mod response;
mod codec;

pub use command::{Command, Opcode, Request, RequestHeader};
pub use response::{Response, Status};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response,
};

/// Size of every request and response header
pub const HEADER_SIZE: usize = 24;

/// Magic byte opening a request frame
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte opening a response frame
pub const RESPONSE_MAGIC: u8 = 0x81;
