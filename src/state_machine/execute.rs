// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::{
    client::transport::{CompletionNotifier, CompletionResult, OsdCommand},
    control_block::cdb::OsdCdb,
    error::{OsdError, Result, TransportError},
    models::segment::OwnedSegment,
    security::SecurityMode,
    state_machine::{
        common::{AttributesMode, RequestState},
        completed::{CompletedRequest, ReleasedBuffers},
        encoded::InboundKind,
        request::RequestCore,
    },
};

/// Data-in layout: `[user][pad][attributes]`.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub user: Option<OwnedSegment>,
    pub kind: Option<InboundKind>,
    pub pad: usize,
    pub attrs: Option<OwnedSegment>,
}

impl Inbound {
    pub fn new(user: Option<OwnedSegment>, kind: Option<InboundKind>) -> Self {
        Self {
            user,
            kind,
            pad: 0,
            attrs: None,
        }
    }

    pub fn attach_attrs(&mut self, seg: OwnedSegment, pad: usize) {
        self.pad = pad;
        self.attrs = Some(seg);
    }

    fn user_capacity(&self) -> usize {
        self.user.as_ref().map_or(0, OwnedSegment::capacity)
    }

    pub fn total_len(&self) -> usize {
        match &self.attrs {
            Some(a) => self.user_capacity() + self.pad + a.capacity(),
            None => self.user_capacity(),
        }
    }

    /// Scatter received bytes into the segments.
    pub fn fill(&mut self, data: &[u8]) {
        let user_cap = self.user_capacity();
        let (user_part, rest) = data.split_at(user_cap.min(data.len()));
        if let Some(user) = self.user.as_mut() {
            user.fill_from(user_part);
        }
        if let Some(attrs) = self.attrs.as_mut() {
            let start = self.pad.min(rest.len());
            attrs.fill_from(&rest[start..]);
        }
    }
}

/// A frozen, possibly signed request ready for submission.
#[derive(Debug)]
pub struct FinalizedRequest {
    core: RequestCore,
    data_out: Vec<Bytes>,
    data_out_len: usize,
    inbound: Inbound,
    security: SecurityMode,
    mode: AttributesMode,
}

impl FinalizedRequest {
    pub(crate) fn new(
        core: RequestCore,
        data_out: Vec<Bytes>,
        data_out_len: usize,
        inbound: Inbound,
        security: SecurityMode,
        mode: AttributesMode,
    ) -> Self {
        Self {
            core,
            data_out,
            data_out_len,
            inbound,
            security,
            mode,
        }
    }

    pub fn cdb(&self) -> &OsdCdb {
        &self.core.cdb
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.security
    }

    pub fn data_out_len(&self) -> usize {
        self.data_out_len
    }

    pub fn data_in_len(&self) -> usize {
        self.inbound.total_len()
    }

    pub fn state(&self) -> RequestState {
        self.core.lifecycle.state()
    }

    fn command(&self) -> OsdCommand {
        OsdCommand {
            cdb: self.core.cdb.clone(),
            data_out: self.data_out.clone(),
            data_out_len: self.data_out_len,
            data_in_len: self.inbound.total_len(),
            timeout: self.core.timeout,
            retries: self.core.retries,
        }
    }

    /// Submit and block until the transport completes the command. A
    /// transport failure is recorded in the returned request.
    pub fn execute(mut self) -> Result<CompletedRequest> {
        self.core.lifecycle.advance(RequestState::Executing)?;
        let cmd = self.command();
        debug!(action = ?cmd.cdb.service_action(), "submitting (blocking)");

        let result = self.core.transport.submit_blocking(&cmd);
        if let Err(e) = &result {
            warn!("blocking submit failed: {e}");
        }
        CompletedRequest::new(self.core, self.inbound, self.security, self.mode, result)
    }

    /// Hand the command to the transport and return immediately.
    pub fn execute_async(mut self) -> Result<PendingRequest> {
        self.core.lifecycle.advance(RequestState::Executing)?;
        let cmd = self.command();
        debug!(action = ?cmd.cdb.service_action(), "submitting (async)");

        let (notifier, rx) = CompletionNotifier::channel();
        let ready = match self.core.transport.submit_async(cmd, notifier) {
            Ok(()) => None,
            Err(e) => {
                warn!("async submit failed: {e}");
                Some(Err(e))
            },
        };

        Ok(PendingRequest {
            parts: Some(PendingParts {
                core: self.core,
                inbound: self.inbound,
                security: self.security,
                mode: self.mode,
            }),
            rx,
            ready,
        })
    }
}

#[derive(Debug)]
struct PendingParts {
    core: RequestCore,
    inbound: Inbound,
    security: SecurityMode,
    mode: AttributesMode,
}

impl PendingParts {
    fn complete(self, result: CompletionResult) -> Result<CompletedRequest> {
        CompletedRequest::new(self.core, self.inbound, self.security, self.mode, result)
    }
}

fn dropped_notifier() -> TransportError {
    TransportError::new("completion notifier dropped without completing")
}

/// An asynchronously executing request.
#[derive(Debug)]
pub struct PendingRequest {
    parts: Option<PendingParts>,
    rx: oneshot::Receiver<CompletionResult>,
    /// Set when submission itself failed.
    ready: Option<CompletionResult>,
}

impl PendingRequest {
    fn take_parts(&mut self) -> Result<PendingParts> {
        self.parts
            .take()
            .ok_or_else(|| OsdError::sequence("completion already taken"))
    }

    /// Wait for the completion without blocking the runtime.
    pub async fn wait(mut self) -> Result<CompletedRequest> {
        let parts = self.take_parts()?;
        let result = match self.ready.take() {
            Some(r) => r,
            None => (&mut self.rx).await.unwrap_or_else(|_| Err(dropped_notifier())),
        };
        parts.complete(result)
    }

    /// Block the calling thread until the completion arrives.
    ///
    /// Inside an async runtime a command still in flight cannot be waited
    /// on this way: that is `InvalidSequence`, use [`Self::wait`] there.
    pub fn wait_blocking(mut self) -> Result<CompletedRequest> {
        if self.ready.is_none() && tokio::runtime::Handle::try_current().is_ok() {
            return Err(OsdError::sequence(
                "wait_blocking called from within an async runtime",
            ));
        }
        let parts = self.take_parts()?;
        let result = match self.ready.take() {
            Some(r) => r,
            None => self
                .rx
                .blocking_recv()
                .unwrap_or_else(|_| Err(dropped_notifier())),
        };
        parts.complete(result)
    }

    /// Non-blocking poll. `Ok(None)` while the command is in flight; once
    /// the completion has been taken further calls are `InvalidSequence`.
    pub fn try_complete(&mut self) -> Result<Option<CompletedRequest>> {
        if self.parts.is_none() {
            return Err(OsdError::sequence("completion already taken"));
        }
        let result = match self.ready.take() {
            Some(r) => r,
            None => match self.rx.try_recv() {
                Ok(r) => r,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => Err(dropped_notifier()),
            },
        };
        let parts = self.take_parts()?;
        parts.complete(result).map(Some)
    }

    /// Release is only legal once the completion has arrived; it then
    /// behaves like [`CompletedRequest::release`].
    pub fn release(&mut self) -> Result<ReleasedBuffers> {
        match self.try_complete()? {
            Some(done) => done.release(),
            None => Err(OsdError::sequence(
                "cannot release a request whose completion has not arrived",
            )),
        }
    }
}
