//! Request definitions
//!
//! Represents requests from clients, both as raw frames and as the
//! command the server dispatches on.

use bytes::Bytes;

/// Opcodes this server acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Delete = 0x04,
}

impl Opcode {
    /// Map a raw opcode byte, `None` for anything unsupported
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Opcode::Get),
            0x01 => Some(Opcode::Set),
            0x04 => Some(Opcode::Delete),
            _ => None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

/// The fixed 24-byte request header, as read off the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub vbucket: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    /// Bytes of value following extras and key.
    ///
    /// Only meaningful once the header has been validated (see
    /// `codec::decode_request_header`), which guarantees it cannot underflow.
    pub fn value_length(&self) -> usize {
        self.total_body_length as usize - self.key_length as usize - self.extras_length as usize
    }
}

/// A complete request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Raw opcode byte; kept raw so unknown opcodes can be echoed back
    pub opcode: u8,
    pub data_type: u8,
    pub vbucket: u16,

    /// Correlation token, echoed verbatim in the response
    pub opaque: u32,

    /// Echoed verbatim; never checked
    pub cas: u64,

    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Request {
    /// Build a request with an empty body for the given raw opcode
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            data_type: 0,
            vbucket: 0,
            opaque: 0,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    pub fn get(key: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Get.into()).with_key(key)
    }

    /// SET carries 8 bytes of extras (flags + expiration), zeroed here
    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Set.into())
            .with_extras(Bytes::from_static(&[0u8; 8]))
            .with_key(key)
            .with_value(value)
    }

    pub fn delete(key: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Delete.into()).with_key(key)
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Length of extras + key + value
    pub fn body_length(&self) -> usize {
        self.extras.len() + self.key.len() + self.value.len()
    }

    /// The command this frame asks for
    ///
    /// Extras are dropped: none of the supported commands use them. The
    /// value is only carried for SET.
    pub fn command(&self) -> Command {
        match Opcode::from_u8(self.opcode) {
            Some(Opcode::Get) => Command::Get {
                key: self.key.clone(),
            },
            Some(Opcode::Set) => Command::Set {
                key: self.key.clone(),
                value: self.value.clone(),
            },
            Some(Opcode::Delete) => Command::Delete {
                key: self.key.clone(),
            },
            None => Command::Unknown {
                opcode: self.opcode,
            },
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Bytes },

    /// Store a value, overwriting unconditionally
    Set { key: Bytes, value: Bytes },

    /// Delete a key (idempotent)
    Delete { key: Bytes },

    /// Any opcode the server does not implement
    Unknown { opcode: u8 },
}
