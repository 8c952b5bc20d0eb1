// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::{
    client::transport::CompletionResult,
    control_block::service_action::ServiceAction,
    error::{OsdError, Result, TransportError},
    models::{
        attr::{AttrCursor, AttrPage, OsdAttr, decode_attr_list, decode_attr_page},
        common::{OSD_MAX_SENSE_LEN, ScsiStatus},
        object_list::ObjectIdList,
        sense_data::{ErrorPriority, OsdSenseInfo, classify, decode_sense},
    },
    security::SecurityMode,
    state_machine::{
        common::{AttributesMode, RequestState},
        encoded::InboundKind,
        execute::Inbound,
        request::RequestCore,
    },
};

/// Buffers handed back by [`CompletedRequest::release`].
#[derive(Debug)]
pub struct ReleasedBuffers {
    /// Caller buffer of a read or listing.
    pub data_in: Option<BytesMut>,
    /// Caller buffer of a page-mode get.
    pub attr_page: Option<BytesMut>,
    pub history: Vec<RequestState>,
}

/// A request whose completion has been recorded.
#[derive(Debug)]
pub struct CompletedRequest {
    core: RequestCore,
    inbound: Inbound,
    security: SecurityMode,
    mode: AttributesMode,
    status: Option<ScsiStatus>,
    transport_error: Option<TransportError>,
    sense: [u8; OSD_MAX_SENSE_LEN],
    sense_len: usize,
}

impl CompletedRequest {
    pub(crate) fn new(
        mut core: RequestCore,
        mut inbound: Inbound,
        security: SecurityMode,
        mode: AttributesMode,
        result: CompletionResult,
    ) -> Result<Self> {
        core.lifecycle.advance(RequestState::Completed)?;

        let mut sense = [0u8; OSD_MAX_SENSE_LEN];
        let mut sense_len = 0;
        let (status, transport_error) = match result {
            Ok(c) => {
                sense_len = c.sense.len().min(OSD_MAX_SENSE_LEN);
                sense[..sense_len].copy_from_slice(&c.sense[..sense_len]);
                inbound.fill(&c.data_in);
                (Some(c.status), None)
            },
            Err(e) => (None, Some(e)),
        };

        debug!(
            action = ?core.cdb.service_action(),
            ?status,
            sense_len,
            "request completed"
        );
        Ok(Self {
            core,
            inbound,
            security,
            mode,
            status,
            transport_error,
            sense,
            sense_len,
        })
    }

    /// SCSI status, `None` after a transport failure.
    pub fn status(&self) -> Option<ScsiStatus> {
        self.status
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.security
    }

    pub fn service_action(&self) -> Option<ServiceAction> {
        self.core.cdb.service_action()
    }

    /// Transport failure, or the target's status and sense when not GOOD.
    pub fn result(&self) -> Result<()> {
        if let Some(e) = &self.transport_error {
            return Err(OsdError::Transport(e.clone()));
        }
        match self.status {
            Some(ScsiStatus::Good | ScsiStatus::ConditionMet) => Ok(()),
            Some(status) => Err(OsdError::Target {
                status,
                sense: Box::new(self.decode_sense()),
            }),
            None => Err(OsdError::sequence("completion carries no status")),
        }
    }

    /// [`Self::result`] that hands the request back on success.
    pub fn check(self) -> Result<Self> {
        self.result().map(|()| self)
    }

    /// Sense bytes as returned, capped at [`OSD_MAX_SENSE_LEN`].
    pub fn sense_bytes(&self) -> &[u8] {
        &self.sense[..self.sense_len]
    }

    pub fn decode_sense(&self) -> OsdSenseInfo {
        decode_sense(self.sense_bytes())
    }

    pub fn priority(&self) -> ErrorPriority {
        match self.status {
            Some(status) => classify(status, &self.decode_sense()),
            None => ErrorPriority::Unreachable,
        }
    }

    /// Bytes received into the read (or list) buffer.
    pub fn data_in(&self) -> &[u8] {
        self.inbound
            .user
            .as_ref()
            .map_or(&[][..], |seg| seg.as_slice())
    }

    /// Decode up to `max` retrieved attributes, continuing at `cursor`.
    pub fn decode_get_attr_list(
        &self,
        cursor: &mut AttrCursor,
        max: usize,
    ) -> Result<Vec<OsdAttr>> {
        if self.mode != AttributesMode::List {
            return Err(OsdError::sequence(format!(
                "no attribute list requested ({})",
                self.mode
            )));
        }
        match &self.inbound.attrs {
            Some(seg) => decode_attr_list(seg.as_slice(), cursor, max),
            None => Ok(Vec::new()),
        }
    }

    /// The page fetched in page mode.
    pub fn attr_page(&self) -> Result<AttrPage<'_>> {
        match (&self.mode, &self.inbound.attrs) {
            (AttributesMode::Page, Some(seg)) => decode_attr_page(seg.as_slice()),
            _ => Err(OsdError::sequence(format!(
                "no attribute page requested ({})",
                self.mode
            ))),
        }
    }

    /// The decoded result of a listing.
    pub fn object_list(&self) -> Result<ObjectIdList> {
        match (&self.inbound.kind, &self.inbound.user) {
            (Some(InboundKind::ObjectList), Some(seg)) => ObjectIdList::parse(seg.as_slice()),
            _ => Err(OsdError::sequence("request is not a listing")),
        }
    }

    pub fn history(&self) -> &[RequestState] {
        self.core.lifecycle.history()
    }

    /// Drop request-owned buffers and return the caller's.
    pub fn release(mut self) -> Result<ReleasedBuffers> {
        self.core.lifecycle.advance(RequestState::Released)?;

        let data_in = self.inbound.user.take().and_then(|s| s.release());
        let attr_page = self.inbound.attrs.take().and_then(|s| s.release());
        if self.transport_error.is_some() {
            warn!("releasing a request that failed in transport");
        }
        Ok(ReleasedBuffers {
            data_in,
            attr_page,
            history: self.core.lifecycle.into_history(),
        })
    }
}
