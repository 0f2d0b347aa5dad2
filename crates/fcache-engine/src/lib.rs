//! Capability traits at the seam between the server front-end and a storage
//! engine, plus [`MemoryEngine`], the in-memory reference engine.
//!
//! The server consumes engines through [`Engine`]; engines reach back into
//! the server through [`Host`]. Change-data streaming is a separate
//! capability ([`Dcp`]) an engine may or may not expose — callers probe with
//! [`Engine::dcp`] rather than downcasting.

pub mod dcp;
pub mod memory;
pub mod traits;

pub use dcp::{
    Dcp, DcpMessageProducers, DeletionMessage, FailoverEntry, MutationMessage, StreamReqOutcome,
    StreamRequest, SystemEvent, VbucketState,
};
pub use memory::MemoryEngine;
pub use traits::{CollectionId, Collections, Engine, Host};
