//! Core protocol and document types shared by the FrankenCache engine
//! crates: identity newtypes, the document/item model, datatype flags, and
//! the wire codecs for the control channel and extended-attribute blobs.

pub mod control;
pub mod flags;
pub mod item;
pub mod message;
pub mod stream;
pub mod xattr;

use std::fmt;

/// CAS value marking an item as locked. Stored into an item when a test
/// asks for the locked sentinel via the control channel.
pub const LOCKED_CAS: u64 = u64::MAX;

/// Opaque handle identifying one in-flight client request.
///
/// The host mints cookies and owns their meaning; engines treat them as
/// opaque identity. A connection presents a fresh cookie per command, so a
/// cookie observed for a connection id can change when the connection is
/// reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Cookie(u64);

impl Cookie {
    /// Wrap a raw host-assigned cookie value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw cookie value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cookie:{:#x}", self.0)
    }
}

/// Small integer identifying a client connection. Stable across requests on
/// the same connection; assigned by the host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw host-assigned connection id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw connection id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// A vbucket (virtual bucket) identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Vbid(u16);

impl Vbid {
    /// Wrap a raw vbucket number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw vbucket number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Vbid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vb:{}", self.0)
    }
}

/// Caller-chosen token naming one outstanding "hold this cookie" request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SuspendToken(u32);

impl SuspendToken {
    /// Wrap a raw token value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw token value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SuspendToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

/// A document key.
///
/// Keys are raw bytes on the wire; most tests use ASCII. Ordering and
/// hashing are byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey(Vec<u8>);

impl DocKey {
    /// Build a key from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw key bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for DocKey {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// The operation kinds an engine call can present to the injection gate.
///
/// Compare-and-swap stores are distinguished from plain stores so that a
/// CAS-only injector can leave every other operation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    /// Item allocation (plain or extended).
    Allocate,
    /// Point read (get, get-if, get-and-touch).
    Get,
    /// Metadata-only read.
    GetMeta,
    /// Statistics read.
    GetStats,
    /// Locked read.
    Lock,
    /// Unlock of a previously locked item.
    Unlock,
    /// Document removal.
    Remove,
    /// Plain store (set/add/replace/append/prepend).
    Store,
    /// Compare-and-swap store.
    Cas,
    /// Counter arithmetic.
    Arithmetic,
    /// Full-bucket flush.
    Flush,
    /// Any opcode the engine does not model explicitly.
    UnknownCommand,
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allocate => "ALLOCATE",
            Self::Get => "GET",
            Self::GetMeta => "GET_META",
            Self::GetStats => "GET_STATS",
            Self::Lock => "LOCK",
            Self::Unlock => "UNLOCK",
            Self::Remove => "REMOVE",
            Self::Store => "STORE",
            Self::Cas => "CAS",
            Self::Arithmetic => "ARITHMETIC",
            Self::Flush => "FLUSH",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
        };
        f.write_str(name)
    }
}
