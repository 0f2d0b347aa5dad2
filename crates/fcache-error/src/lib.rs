//! Engine error codes shared by every FrankenCache crate.
//!
//! `EngineError` mirrors the binary protocol's engine status space: a flat,
//! copyable enum with a stable wire numbering so an error kind can travel
//! inside a control payload and come back out unchanged. Success is not a
//! variant; fallible operations return [`Result`].

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error codes an engine (or the fault-injection shim wrapping it) can
/// surface to the server front-end.
///
/// The numbering in [`EngineError::to_raw`] is part of the control-channel
/// wire format: a client names the error it wants injected by this code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// The requested key was not found.
    #[error("key not found")]
    KeyNotFound,

    /// The key already exists (also surfaced on CAS mismatch and when a
    /// suspension token is already registered).
    #[error("key already exists")]
    KeyExists,

    /// The engine could not allocate memory for the request.
    #[error("out of memory")]
    OutOfMemory,

    /// The item was not stored.
    #[error("item not stored")]
    NotStored,

    /// Malformed request or argument.
    #[error("invalid argument")]
    InvalidArgument,

    /// The operation is not supported by this engine.
    #[error("operation not supported")]
    NotSupported,

    /// The request cannot be completed right now; the caller will be told
    /// via an I/O-complete notification when it may retry.
    #[error("operation would block")]
    WouldBlock,

    /// The item is larger than the engine accepts.
    #[error("item too big")]
    TooBig,

    /// The connection should be disconnected.
    #[error("disconnect")]
    Disconnect,

    /// The vbucket does not belong to this node.
    #[error("not my vbucket")]
    NotMyVbucket,

    /// Temporary failure; the client should retry later.
    #[error("temporary failure")]
    TemporaryFailure,

    /// A change-stream consumer must roll back to an earlier sequence
    /// number before the stream can continue.
    #[error("rollback required")]
    Rollback,

    /// The requested item is locked by another holder.
    #[error("item is locked")]
    Locked,

    /// Generic failure.
    #[error("generic failure")]
    Failed,
}

impl EngineError {
    /// Wire code for this error, as used in the control payload's
    /// inject-error field.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::KeyNotFound => 0x01,
            Self::KeyExists => 0x02,
            Self::OutOfMemory => 0x03,
            Self::NotStored => 0x04,
            Self::InvalidArgument => 0x05,
            Self::NotSupported => 0x06,
            Self::WouldBlock => 0x07,
            Self::TooBig => 0x08,
            Self::Disconnect => 0x0a,
            Self::NotMyVbucket => 0x0c,
            Self::TemporaryFailure => 0x0d,
            Self::Rollback => 0x0f,
            Self::Locked => 0x14,
            Self::Failed => 0xff,
        }
    }

    /// Decode a wire code. Returns `None` for 0 (success is not an error)
    /// and for codes this engine does not know.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x01 => Some(Self::KeyNotFound),
            0x02 => Some(Self::KeyExists),
            0x03 => Some(Self::OutOfMemory),
            0x04 => Some(Self::NotStored),
            0x05 => Some(Self::InvalidArgument),
            0x06 => Some(Self::NotSupported),
            0x07 => Some(Self::WouldBlock),
            0x08 => Some(Self::TooBig),
            0x0a => Some(Self::Disconnect),
            0x0c => Some(Self::NotMyVbucket),
            0x0d => Some(Self::TemporaryFailure),
            0x0f => Some(Self::Rollback),
            0x14 => Some(Self::Locked),
            0xff => Some(Self::Failed),
            _ => None,
        }
    }
}
