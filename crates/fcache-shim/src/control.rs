//! The control channel: the distinguished opcode that configures fault
//! injection at runtime.
//!
//! Control requests never reach the wrapped engine. Accepted modes answer
//! with an empty success response; an unrecognized mode or malformed
//! payload answers with an invalid-arguments status so the client sees
//! exactly what it sent.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use fcache_error::{EngineError, Result};
use fcache_types::control::{ControlMode, ControlPayload};
use fcache_types::item::DocStateFilter;
use fcache_types::message::{Request, Response, Status};
use fcache_types::{Cookie, DocKey, SuspendToken, Vbid, LOCKED_CAS};

use crate::engine::ShimEngine;
use crate::injector::FaultInjector;

impl ShimEngine {
    pub(crate) fn handle_control(&self, cookie: Cookie, request: &Request) -> Result<Response> {
        let payload = match ControlPayload::decode(&request.extras) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%cookie, %err, "rejecting control request");
                return Ok(Response::with_status(Status::Einval));
            }
        };

        match payload.mode {
            ControlMode::NextN => self.install_injector(cookie, &payload, |error| {
                FaultInjector::err_on_next_n(error, payload.value)
            }),
            ControlMode::Random => self.install_injector(cookie, &payload, |error| {
                FaultInjector::err_random(error, payload.value)
            }),
            ControlMode::First => {
                self.install_injector(cookie, &payload, FaultInjector::err_on_first)
            }
            ControlMode::Sequence => self.install_injector(cookie, &payload, |error| {
                FaultInjector::err_sequence(error, payload.value)
            }),
            ControlMode::NoNotify => {
                self.install_injector(cookie, &payload, FaultInjector::err_on_no_notify)
            }
            ControlMode::CasMismatch => {
                let id = self.host.connection_id(cookie);
                self.registry
                    .install(id, cookie, FaultInjector::cas_mismatch(payload.value));
                Ok(Response::success())
            }
            ControlMode::IncrementClusterMapRevno => {
                self.clustermap_revno.fetch_add(1, Ordering::Relaxed);
                Ok(Response::success())
            }
            ControlMode::BlockMonitorFile => {
                self.handle_block_monitor_file(cookie, SuspendToken::new(payload.value), request)
            }
            ControlMode::Suspend => {
                self.handle_suspend(cookie, SuspendToken::new(payload.value))
            }
            ControlMode::Resume => self.handle_resume(SuspendToken::new(payload.value)),
            ControlMode::SetItemCas => self.handle_set_item_cas(cookie, request, payload.value),
        }
    }

    /// Install an injector built from the payload's error code, replacing
    /// whatever this connection had before.
    fn install_injector(
        &self,
        cookie: Cookie,
        payload: &ControlPayload,
        build: impl FnOnce(EngineError) -> FaultInjector,
    ) -> Result<Response> {
        let Some(error) = EngineError::from_raw(payload.inject_error) else {
            warn!(
                %cookie,
                inject_error = payload.inject_error,
                "control payload names no known error"
            );
            return Ok(Response::with_status(Status::Einval));
        };
        let id = self.host.connection_id(cookie);
        self.registry.install(id, cookie, build(error));
        Ok(Response::success())
    }

    fn handle_block_monitor_file(
        &self,
        cookie: Cookie,
        token: SuspendToken,
        request: &Request,
    ) -> Result<Response> {
        if request.key.is_empty() {
            return Err(EngineError::InvalidArgument);
        }
        let path = PathBuf::from(String::from_utf8_lossy(&request.key).into_owned());
        if !path.is_file() {
            return Err(EngineError::KeyNotFound);
        }

        if !self.suspensions.suspend(token, cookie) {
            warn!(%token, "block-monitor-file: token already registered");
            return Err(EngineError::KeyExists);
        }

        self.monitors
            .spawn(token, path.clone(), Arc::clone(&self.suspensions))?;
        debug!(%cookie, %token, path = %path.display(), "suspended until file disappears");
        Ok(Response::success())
    }

    fn handle_suspend(&self, cookie: Cookie, token: SuspendToken) -> Result<Response> {
        if self.suspensions.suspend(token, cookie) {
            Ok(Response::success())
        } else {
            warn!(%token, "suspend: token already registered");
            Err(EngineError::KeyExists)
        }
    }

    fn handle_resume(&self, token: SuspendToken) -> Result<Response> {
        if self.suspensions.resume(token) {
            Ok(Response::success())
        } else {
            warn!(%token, "resume: no suspension registered");
            Err(EngineError::InvalidArgument)
        }
    }

    fn handle_set_item_cas(
        &self,
        cookie: Cookie,
        request: &Request,
        value: u32,
    ) -> Result<Response> {
        // The all-ones value asks for the locked-CAS sentinel.
        let cas = if value == u32::MAX {
            LOCKED_CAS
        } else {
            u64::from(value)
        };
        let key = DocKey::new(request.key.clone());
        let item = self
            .real
            .get(cookie, &key, Vbid::new(0), DocStateFilter::Alive)?;
        // item_set_cas has no error return.
        self.real.item_set_cas(&item, cas);
        Ok(Response::success())
    }
}
