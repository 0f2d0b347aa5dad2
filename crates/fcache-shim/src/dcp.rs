//! The synthetic change stream and DCP pass-through.
//!
//! A stream opened with the name `ewb_internal` (optionally `:<count>`)
//! never touches the wrapped engine: the shim answers the stream request
//! itself and emits the same canned mutation over and over. Every other
//! stream, and every other DCP message, is forwarded to the wrapped
//! engine's change-stream capability when it has one.

use tracing::debug;

use fcache_engine::{
    Dcp, DcpMessageProducers, DeletionMessage, FailoverEntry, MutationMessage, StreamReqOutcome,
    StreamRequest, SystemEvent, VbucketState,
};
use fcache_error::{EngineError, Result};
use fcache_types::flags::{Datatype, StreamOpenFlags};
use fcache_types::item::{DocumentState, DurabilityRequirements, ItemData, ItemHandle};
use fcache_types::message::Response;
use fcache_types::stream::parse_stream_name;
use fcache_types::xattr::XattrBlob;
use fcache_types::{Cookie, DocKey, Vbid};

use crate::engine::ShimEngine;

/// Opaque stamped on every synthetic mutation.
const SYNTHETIC_OPAQUE: u32 = 0xdead_beef;

/// Per-cookie state of one synthetic stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SyntheticStream {
    /// Set once the stream request was accepted.
    pub started: bool,
    /// Mutations left to emit.
    pub remaining: u64,
}

/// The one item every synthetic stream emits: a small key, a system and a
/// user xattr, and a kilobyte of padding. The large body raises the odds
/// that a transmit path sees a partial send.
pub(crate) fn canned_mutation_item() -> ItemHandle {
    let mut blob = XattrBlob::new();
    blob.set("_ewb", r#"{"internal":true}"#);
    blob.set("meta", r#"{"author":"jack"}"#);
    let mut value = blob.finish();
    value.resize(value.len() + 1000, b'x');
    ItemHandle::new(ItemData {
        key: DocKey::from("k"),
        value,
        cas: 0,
        flags: 0,
        exptime: 0,
        datatype: Datatype::XATTR,
        vbucket: Vbid::new(0),
    })
}

impl ShimEngine {
    fn real_dcp(&self) -> Result<&dyn Dcp> {
        self.real.dcp().ok_or(EngineError::NotSupported)
    }
}

impl Dcp for ShimEngine {
    fn step(&self, cookie: Cookie, producers: &mut dyn DcpMessageProducers) -> Result<()> {
        {
            let mut streams = self.streams.lock();
            if let Some(stream) = streams.get_mut(&cookie) {
                if stream.started && stream.remaining > 0 {
                    stream.remaining -= 1;
                    drop(streams);
                    // The producer callback runs outside the stream lock.
                    return producers.mutation(
                        SYNTHETIC_OPAQUE,
                        &self.canned_mutation,
                        Vbid::new(0),
                        0,
                        0,
                        0,
                        0,
                    );
                }
                // Not started yet, or the bounded stream ran dry: idle.
                return Err(EngineError::WouldBlock);
            }
        }
        self.real_dcp()?.step(cookie, producers)
    }

    fn open(
        &self,
        cookie: Cookie,
        opaque: u32,
        seqno: u32,
        flags: StreamOpenFlags,
        name: &str,
    ) -> Result<()> {
        match parse_stream_name(name) {
            Some(Ok(remaining)) => {
                debug!(%cookie, name, remaining, "opening synthetic stream");
                self.streams.lock().insert(
                    cookie,
                    SyntheticStream {
                        started: false,
                        remaining,
                    },
                );
                Ok(())
            }
            Some(Err(err)) => {
                debug!(%cookie, name, %err, "rejecting synthetic stream name");
                Err(EngineError::InvalidArgument)
            }
            None => self.real_dcp()?.open(cookie, opaque, seqno, flags, name),
        }
    }

    fn add_stream(&self, cookie: Cookie, opaque: u32, vbucket: Vbid, flags: u32) -> Result<()> {
        self.real_dcp()?.add_stream(cookie, opaque, vbucket, flags)
    }

    fn close_stream(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        stream_id: Option<u16>,
    ) -> Result<()> {
        self.real_dcp()?
            .close_stream(cookie, opaque, vbucket, stream_id)
    }

    fn stream_req(&self, cookie: Cookie, request: &StreamRequest) -> Result<StreamReqOutcome> {
        {
            let mut streams = self.streams.lock();
            if let Some(stream) = streams.get_mut(&cookie) {
                if request.start_seqno == 1 {
                    // Test hook: asking to start at 1 means "exercise the
                    // rollback path".
                    return Ok(StreamReqOutcome::Rollback(0));
                }
                stream.started = true;
                return Ok(StreamReqOutcome::Accepted);
            }
        }
        self.real_dcp()?.stream_req(cookie, request)
    }

    fn get_failover_log(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
    ) -> Result<Vec<FailoverEntry>> {
        self.real_dcp()?.get_failover_log(cookie, opaque, vbucket)
    }

    fn stream_end(&self, cookie: Cookie, opaque: u32, vbucket: Vbid, flags: u32) -> Result<()> {
        self.real_dcp()?.stream_end(cookie, opaque, vbucket, flags)
    }

    fn snapshot_marker(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        start_seqno: u64,
        end_seqno: u64,
        flags: u32,
    ) -> Result<()> {
        self.real_dcp()?
            .snapshot_marker(cookie, opaque, vbucket, start_seqno, end_seqno, flags)
    }

    fn mutation(&self, cookie: Cookie, message: &MutationMessage) -> Result<()> {
        self.real_dcp()?.mutation(cookie, message)
    }

    fn deletion(&self, cookie: Cookie, message: &DeletionMessage) -> Result<()> {
        self.real_dcp()?.deletion(cookie, message)
    }

    fn deletion_v2(
        &self,
        cookie: Cookie,
        message: &DeletionMessage,
        delete_time: u32,
    ) -> Result<()> {
        self.real_dcp()?.deletion_v2(cookie, message, delete_time)
    }

    fn expiration(
        &self,
        cookie: Cookie,
        message: &DeletionMessage,
        delete_time: u32,
    ) -> Result<()> {
        self.real_dcp()?.expiration(cookie, message, delete_time)
    }

    fn set_vbucket_state(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        state: VbucketState,
    ) -> Result<()> {
        self.real_dcp()?
            .set_vbucket_state(cookie, opaque, vbucket, state)
    }

    fn noop(&self, cookie: Cookie, opaque: u32) -> Result<()> {
        self.real_dcp()?.noop(cookie, opaque)
    }

    fn buffer_acknowledgement(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        buffer_bytes: u32,
    ) -> Result<()> {
        self.real_dcp()?
            .buffer_acknowledgement(cookie, opaque, vbucket, buffer_bytes)
    }

    fn control(&self, cookie: Cookie, opaque: u32, key: &str, value: &str) -> Result<()> {
        self.real_dcp()?.control(cookie, opaque, key, value)
    }

    fn response_handler(&self, cookie: Cookie, response: &Response) -> Result<()> {
        self.real_dcp()?.response_handler(cookie, response)
    }

    fn system_event(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        event: SystemEvent,
        by_seqno: u64,
        key: &[u8],
        event_data: &[u8],
    ) -> Result<()> {
        self.real_dcp()?
            .system_event(cookie, opaque, vbucket, event, by_seqno, key, event_data)
    }

    fn prepare(
        &self,
        cookie: Cookie,
        message: &MutationMessage,
        document_state: DocumentState,
        durability: DurabilityRequirements,
    ) -> Result<()> {
        self.real_dcp()?
            .prepare(cookie, message, document_state, durability)
    }

    fn seqno_acknowledged(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        in_memory_seqno: u64,
        on_disk_seqno: u64,
    ) -> Result<()> {
        self.real_dcp()?
            .seqno_acknowledged(cookie, opaque, vbucket, in_memory_seqno, on_disk_seqno)
    }

    fn commit(
        &self,
        cookie: Cookie,
        opaque: u32,
        vbucket: Vbid,
        key: &DocKey,
        prepared_seqno: u64,
        commit_seqno: u64,
    ) -> Result<()> {
        self.real_dcp()?
            .commit(cookie, opaque, vbucket, key, prepared_seqno, commit_seqno)
    }

    fn abort(
        &self,
        cookie: Cookie,
        opaque: u32,
        prepared_seqno: u64,
        abort_seqno: u64,
    ) -> Result<()> {
        self.real_dcp()?
            .abort(cookie, opaque, prepared_seqno, abort_seqno)
    }
}

#[cfg(test)]
mod tests {
    use fcache_types::xattr;

    use super::*;

    #[test]
    fn canned_item_layout() {
        let item = canned_mutation_item();
        item.with(|data| {
            assert_eq!(data.key, DocKey::from("k"));
            assert_eq!(data.datatype, Datatype::XATTR);
            assert_eq!(data.vbucket, Vbid::new(0));
            assert_eq!(data.cas, 0);

            let (pairs, consumed) = xattr::parse(&data.value).expect("xattr section");
            assert_eq!(
                pairs,
                vec![
                    ("_ewb".to_string(), r#"{"internal":true}"#.to_string()),
                    ("meta".to_string(), r#"{"author":"jack"}"#.to_string()),
                ]
            );
            let body = &data.value[consumed..];
            assert_eq!(body.len(), 1000);
            assert!(body.iter().all(|&b| b == b'x'));
        });
    }
}
