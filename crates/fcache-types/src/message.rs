//! Minimal binary-protocol request/response framing as seen by an engine.
//!
//! The server owns wire framing; an engine only sees the decoded pieces it
//! needs: opcode, extras, key, value, and the response it should produce.

use std::fmt;

use crate::flags::Datatype;
use crate::Vbid;

/// Binary protocol status codes an engine puts in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The request was accepted.
    Success,
    /// The requested key was not found.
    KeyNotFound,
    /// The key already exists.
    KeyExists,
    /// The request was malformed.
    Einval,
    /// The opcode is not supported.
    NotSupported,
}

impl Status {
    /// Wire value of the status.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            Self::Success => 0x0000,
            Self::KeyNotFound => 0x0001,
            Self::KeyExists => 0x0002,
            Self::Einval => 0x0004,
            Self::NotSupported => 0x0083,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::KeyNotFound => "key not found",
            Self::KeyExists => "key exists",
            Self::Einval => "invalid arguments",
            Self::NotSupported => "not supported",
        };
        f.write_str(name)
    }
}

/// A decoded client request handed to `unknown_command`.
#[derive(Debug, Clone)]
pub struct Request {
    /// Client opcode.
    pub opcode: u8,
    /// Extras section bytes.
    pub extras: Vec<u8>,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
    /// Client-chosen opaque, echoed in the response.
    pub opaque: u32,
    /// Request CAS.
    pub cas: u64,
    /// Target vbucket.
    pub vbucket: Vbid,
}

impl Request {
    /// Build a bare request with the given opcode and no payload sections.
    #[must_use]
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            extras: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            opaque: 0,
            cas: 0,
            vbucket: Vbid::new(0),
        }
    }

    /// Attach extras bytes.
    #[must_use]
    pub fn with_extras(mut self, extras: Vec<u8>) -> Self {
        self.extras = extras;
        self
    }

    /// Attach key bytes.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }
}

/// The response an engine produces for `unknown_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response status.
    pub status: Status,
    /// Extras bytes.
    pub extras: Vec<u8>,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
    /// Value encoding bits.
    pub datatype: Datatype,
    /// Response CAS.
    pub cas: u64,
}

impl Response {
    /// An empty-bodied response with the given status.
    #[must_use]
    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            extras: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            datatype: Datatype::RAW,
            cas: 0,
        }
    }

    /// An empty-bodied success response.
    #[must_use]
    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }
}
