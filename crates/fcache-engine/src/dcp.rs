//! The change-data (DCP) capability: the message surface an engine exposes
//! to stream document changes, and the producer sink the host supplies when
//! it pulls the next event.

use fcache_error::Result;
use fcache_types::flags::StreamOpenFlags;
use fcache_types::item::{DocumentState, DurabilityRequirements, ItemHandle};
use fcache_types::message::Response;
use fcache_types::{Cookie, DocKey, Vbid};

/// One entry of a vbucket failover log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverEntry {
    /// UUID the vbucket carried for this branch of history.
    pub vbucket_uuid: u64,
    /// First sequence number of the branch.
    pub seqno: u64,
}

/// Outcome of a stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamReqOutcome {
    /// The stream was accepted as requested.
    Accepted,
    /// The consumer must roll back to the given sequence number and retry.
    Rollback(u64),
}

/// Parameters of a stream request.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Stream flags.
    pub flags: u32,
    /// Client-chosen opaque.
    pub opaque: u32,
    /// Target vbucket.
    pub vbucket: Vbid,
    /// First sequence number the consumer wants.
    pub start_seqno: u64,
    /// Last sequence number the consumer wants.
    pub end_seqno: u64,
    /// UUID the consumer believes the vbucket has.
    pub vbucket_uuid: u64,
    /// Start of the snapshot the consumer holds.
    pub snap_start_seqno: u64,
    /// End of the snapshot the consumer holds.
    pub snap_end_seqno: u64,
    /// Optional JSON filter (collections, stream-id).
    pub json: Option<String>,
}

/// vbucket states for state-change messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbucketState {
    /// Serving reads and writes.
    Active,
    /// Passive copy receiving replication.
    Replica,
    /// In transfer.
    Pending,
    /// Not serving.
    Dead,
}

/// System event kinds delivered over a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// A collection was created.
    CreateCollection,
    /// A collection was dropped.
    DropCollection,
    /// A scope was created.
    CreateScope,
    /// A scope was dropped.
    DropScope,
}

/// A document mutation delivered to a consumer-side engine.
#[derive(Debug, Clone)]
pub struct MutationMessage {
    /// Client-chosen opaque.
    pub opaque: u32,
    /// Document key.
    pub key: DocKey,
    /// Value bytes.
    pub value: Vec<u8>,
    /// Privileged byte count within the value.
    pub priv_bytes: usize,
    /// Value encoding bits (raw).
    pub datatype: u8,
    /// Document CAS.
    pub cas: u64,
    /// Target vbucket.
    pub vbucket: Vbid,
    /// Mutation flags.
    pub flags: u32,
    /// Sequence number of the mutation.
    pub by_seqno: u64,
    /// Revision sequence number.
    pub rev_seqno: u64,
    /// Expiry time.
    pub expiration: u32,
    /// Remaining lock time.
    pub lock_time: u32,
    /// Not-recently-used hint.
    pub nru: u8,
}

/// A deletion (or expiration) delivered to a consumer-side engine.
#[derive(Debug, Clone)]
pub struct DeletionMessage {
    /// Client-chosen opaque.
    pub opaque: u32,
    /// Document key.
    pub key: DocKey,
    /// Value bytes (may carry xattrs).
    pub value: Vec<u8>,
    /// Privileged byte count within the value.
    pub priv_bytes: usize,
    /// Value encoding bits (raw).
    pub datatype: u8,
    /// Document CAS.
    pub cas: u64,
    /// Target vbucket.
    pub vbucket: Vbid,
    /// Sequence number of the deletion.
    pub by_seqno: u64,
    /// Revision sequence number.
    pub rev_seqno: u64,
}

/// The sink a producer-side engine drives when the host pulls the next
/// event with [`Dcp::step`].
pub trait DcpMessageProducers {
    /// Emit a document mutation.
    #[allow(clippy::too_many_arguments)]
    fn mutation(
        &mut self,
        opaque: u32,
        item: &ItemHandle,
        vbucket: Vbid,
        by_seqno: u64,
        rev_seqno: u64,
        lock_time: u32,
        nru: u8,
    ) -> Result<()>;

    /// Emit a snapshot marker.
    fn snapshot_marker(
        &mut self,
        opaque: u32,
        vbucket: Vbid,
        start_seqno: u64,
        end_seqno: u64,
    ) -> Result<()>;

    /// Emit a stream-end.
    fn stream_end(&mut self, opaque: u32, vbucket: Vbid) -> Result<()>;

    /// Emit a no-op (keepalive).
    fn noop(&mut self, opaque: u32) -> Result<()>;
}

/// The change-stream capability of an engine.
pub trait Dcp: Send + Sync {
    /// Pull the next event for this connection into `producers`. Returns
    /// would-block when the stream has nothing to send.
    fn step(&self, cookie: Cookie, producers: &mut dyn DcpMessageProducers) -> Result<()>;

    /// Open a named DCP connection.
    fn open(
        &self,
        cookie: Cookie,
        opaque: u32,
        seqno: u32,
        flags: StreamOpenFlags,
        name: &str,
    ) -> Result<()>;

    /// Ask a consumer connection to add a stream for a vbucket.
    fn add_stream(&self, cookie: Cookie, opaque: u32, vbucket: Vbid, flags: u32) -> Result<()>;

    /// Close one stream.
    fn close_stream(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        stream_id: Option<u16>,
    ) -> Result<()>;

    /// Request a stream of changes for a vbucket.
    fn stream_req(&self, cookie: Cookie, request: &StreamRequest) -> Result<StreamReqOutcome>;

    /// Fetch the failover log for a vbucket.
    fn get_failover_log(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
    ) -> Result<Vec<FailoverEntry>>;

    /// A stream has ended.
    fn stream_end(&self, cookie: Cookie, opaque: u32, vbucket: Vbid, flags: u32) -> Result<()>;

    /// A snapshot marker arrived on a consumer connection.
    #[allow(clippy::too_many_arguments)]
    fn snapshot_marker(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        start_seqno: u64,
        end_seqno: u64,
        flags: u32,
    ) -> Result<()>;

    /// A mutation arrived on a consumer connection.
    fn mutation(&self, cookie: Cookie, message: &MutationMessage) -> Result<()>;

    /// A deletion arrived on a consumer connection.
    fn deletion(&self, cookie: Cookie, message: &DeletionMessage) -> Result<()>;

    /// A v2 deletion (with delete time) arrived on a consumer connection.
    fn deletion_v2(
        &self,
        cookie: Cookie,
        message: &DeletionMessage,
        delete_time: u32,
    ) -> Result<()>;

    /// An expiration arrived on a consumer connection.
    fn expiration(
        &self,
        cookie: Cookie,
        message: &DeletionMessage,
        delete_time: u32,
    ) -> Result<()>;

    /// A vbucket state change arrived.
    fn set_vbucket_state(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        state: VbucketState,
    ) -> Result<()>;

    /// A no-op arrived.
    fn noop(&self, cookie: Cookie, opaque: u32) -> Result<()>;

    /// Flow-control acknowledgement of consumed bytes.
    fn buffer_acknowledgement(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        buffer_bytes: u32,
    ) -> Result<()>;

    /// A control key/value pair negotiating stream behavior.
    fn control(&self, cookie: Cookie, opaque: u32, key: &str, value: &str) -> Result<()>;

    /// A response to an engine-originated message.
    fn response_handler(&self, cookie: Cookie, response: &Response) -> Result<()>;

    /// A system event (collection/scope lifecycle) arrived.
    #[allow(clippy::too_many_arguments)]
    fn system_event(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        event: SystemEvent,
        by_seqno: u64,
        key: &[u8],
        event_data: &[u8],
    ) -> Result<()>;

    /// A durable-write prepare arrived.
    fn prepare(
        &self,
        cookie: Cookie,
        message: &MutationMessage,
        document_state: DocumentState,
        durability: DurabilityRequirements,
    ) -> Result<()>;

    /// A replica acknowledged sequence numbers.
    fn seqno_acknowledged(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        in_memory_seqno: u64,
        on_disk_seqno: u64,
    ) -> Result<()>;

    /// A durable write committed.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        key: &DocKey,
        prepared_seqno: u64,
        commit_seqno: u64,
    ) -> Result<()>;

    /// A durable write aborted.
    fn abort(
        &self,
        cookie: Cookie,
        opaque: u32,
        prepared_seqno: u64,
        abort_seqno: u64,
    ) -> Result<()>;
}
