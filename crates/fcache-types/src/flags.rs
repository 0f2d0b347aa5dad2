//! Bit flags used on the binary protocol surface.

use bitflags::bitflags;

bitflags! {
    /// Datatype bits describing how an item's value is encoded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Datatype: u8 {
        /// Value is JSON.
        const JSON   = 0x01;
        /// Value is Snappy-compressed.
        const SNAPPY = 0x02;
        /// Value begins with an extended-attribute section.
        const XATTR  = 0x04;
    }
}

impl Datatype {
    /// Uninterpreted raw bytes (no datatype bits set).
    pub const RAW: Self = Self::empty();
}

impl Default for Datatype {
    fn default() -> Self {
        Self::RAW
    }
}

bitflags! {
    /// Flags a change-stream producer may set when opening a stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StreamOpenFlags: u32 {
        /// The connection acts as a producer.
        const PRODUCER = 0x01;
        /// Deletions should carry their value payloads.
        const INCLUDE_DELETE_TIMES = 0x20;
    }
}

impl Default for StreamOpenFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Optional engine capabilities advertised to the server.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EngineFeatures: u32 {
        /// The engine understands collection-qualified keys.
        const COLLECTIONS = 0x01;
    }
}

impl Default for EngineFeatures {
    fn default() -> Self {
        Self::empty()
    }
}

/// How aggressively an engine compresses stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMode {
    /// Never compress.
    #[default]
    Off,
    /// Compress when the client did not send compressed data.
    Passive,
    /// Always compress eligible values.
    Active,
}
