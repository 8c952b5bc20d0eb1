// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Attribute segments and finalize.
//!
//! Data-out is laid out as `[data][pad][set-attr list][pad][get-attr list]`,
//! data-in as `[data][pad][retrieved attributes or page]`. Each pad makes the
//! next segment start at an offset the CDB can express.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    control_block::{
        cdb::{ListParams, OsdCdb, PageParams, ReqOptions},
        offset::{EncodedOffset, OSD_OFFSET_UNUSED, encode_offset},
        service_action::ServiceAction,
    },
    error::{OsdError, Result},
    models::{
        attr::{
            ATTR_LIST_HEADER_LEN, ATTR_LIST_MAX_BYTES, OsdAttr, append_get_attr_list,
            append_set_attr_list, retrieved_list_size,
        },
        segment::{OwnedSegment, pad_segment},
    },
    security::{
        SecurityMode, apply_security,
        signer::{DataInIntegrity, DataOutIntegrity},
        validate_credentials,
    },
    state_machine::{
        common::{AttributesMode, RequestState},
        completed::ReleasedBuffers,
        execute::{FinalizedRequest, Inbound},
        request::RequestCore,
    },
};

/// What the data-in user segment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Data,
    ObjectList,
}

/// Page-mode get plus the optional single set.
#[derive(Debug)]
struct PageRequest {
    page_id: u32,
    buf: OwnedSegment,
    set_one: Option<OsdAttr>,
}

/// A request with exactly one encoding applied.
#[derive(Debug)]
pub struct EncodedRequest {
    core: RequestCore,
    action: Option<ServiceAction>,
    data_out: Option<Bytes>,
    data_in: Option<(OwnedSegment, InboundKind)>,
    mode: AttributesMode,
    set_attr: OwnedSegment,
    enc_get_attr: OwnedSegment,
    /// Retrieved-list bytes needed by the elements requested so far.
    get_attr_alloc: usize,
    page: Option<PageRequest>,
}

impl EncodedRequest {
    pub(crate) fn new(core: RequestCore) -> Self {
        let limit = core.policy.max_attr_segment_bytes;
        Self {
            action: core.cdb.service_action(),
            core,
            data_out: None,
            data_in: None,
            mode: AttributesMode::None,
            set_attr: OwnedSegment::new(limit),
            enc_get_attr: OwnedSegment::new(limit),
            get_attr_alloc: 0,
            page: None,
        }
    }

    pub(crate) fn with_inbound(mut self, seg: OwnedSegment, kind: InboundKind) -> Self {
        self.data_in = Some((seg, kind));
        self
    }

    pub(crate) fn with_outbound(mut self, data: Bytes) -> Self {
        self.data_out = Some(data);
        self
    }

    pub fn service_action(&self) -> Option<ServiceAction> {
        self.action
    }

    pub fn attributes_mode(&self) -> AttributesMode {
        self.mode
    }

    pub fn state(&self) -> RequestState {
        self.core.lifecycle.state()
    }

    fn ensure_implemented(&self) -> Result<()> {
        match self.action {
            Some(a) if a.is_implemented() => Ok(()),
            Some(a) => Err(OsdError::NotImplemented(a.name())),
            None => Err(OsdError::NotImplemented("unknown service action")),
        }
    }

    /// Append `(page, number, value)` elements to the set list.
    pub fn add_set_attr_list(&mut self, attrs: &[OsdAttr]) -> Result<()> {
        self.ensure_implemented()?;
        self.mode.check(AttributesMode::List)?;
        append_set_attr_list(&mut self.set_attr, attrs)?;
        self.mode = AttributesMode::List;
        Ok(())
    }

    /// Append ids to the get list. `len` of each attribute is the value size
    /// expected back and sizes the retrieved-list buffer.
    pub fn add_get_attr_list(&mut self, attrs: &[OsdAttr]) -> Result<()> {
        self.ensure_implemented()?;
        self.mode.check(AttributesMode::List)?;

        let extra = retrieved_list_size(attrs) - ATTR_LIST_HEADER_LEN;
        let alloc = ATTR_LIST_HEADER_LEN + self.get_attr_alloc + extra;
        // The list header counts at most u16::MAX bytes, whatever the policy.
        let limit = self.core.policy.max_attr_segment_bytes.min(ATTR_LIST_MAX_BYTES);
        if alloc > limit {
            return Err(OsdError::alloc(format!(
                "retrieved attribute list of {alloc} bytes exceeds the {limit}-byte limit"
            )));
        }
        append_get_attr_list(&mut self.enc_get_attr, attrs)?;
        self.get_attr_alloc += extra;
        self.mode = AttributesMode::List;
        Ok(())
    }

    /// Fetch attribute page `page_id` into `buf` (its length bounds the page)
    /// and optionally set one attribute in the same command.
    pub fn add_get_attr_page(
        &mut self,
        page_id: u32,
        buf: BytesMut,
        set_one: Option<&OsdAttr>,
    ) -> Result<()> {
        self.ensure_implemented()?;
        self.mode.check(AttributesMode::Page)?;
        if self.page.is_some() {
            return Err(OsdError::sequence("attribute page already requested"));
        }
        if buf.len() > u32::MAX as usize {
            return Err(OsdError::alloc("attribute page buffer exceeds 32-bit length"));
        }
        self.page = Some(PageRequest {
            page_id,
            buf: OwnedSegment::caller(buf),
            set_one: set_one.cloned(),
        });
        self.mode = AttributesMode::Page;
        Ok(())
    }

    /// Give up on the request before finalize and hand back the caller's
    /// buffers (read or list buffer, attribute page buffer).
    pub fn release(mut self) -> ReleasedBuffers {
        let data_in = self
            .data_in
            .take()
            .and_then(|(seg, _)| seg.release());
        let attr_page = self.page.take().and_then(|p| p.buf.release());
        ReleasedBuffers {
            data_in,
            attr_page,
            history: self.core.lifecycle.into_history(),
        }
    }

    /// Freeze lengths and offsets, apply `opts`, embed `cap` and sign with
    /// `key` (or mark NOSEC without one).
    ///
    /// Every fallible step runs before the request is taken apart, so on
    /// failure [`FinalizeError`] carries the request back unchanged.
    pub fn finalize(
        mut self,
        opts: ReqOptions,
        cap: &[u8],
        key: Option<&[u8]>,
    ) -> std::result::Result<FinalizedRequest, FinalizeError> {
        match self.prepare(opts, cap, key) {
            Ok(prepared) => Ok(self.commit(prepared)),
            Err(error) => {
                debug!(action = ?self.action, "finalize failed: {error}");
                Err(FinalizeError {
                    error,
                    request: Box::new(self),
                })
            },
        }
    }

    /// Compute the CDB and both layouts on the side. Leaves `self` untouched
    /// unless it succeeds, in which case only the lifecycle has advanced.
    fn prepare(&mut self, opts: ReqOptions, cap: &[u8], key: Option<&[u8]>) -> Result<Prepared> {
        self.ensure_implemented()?;
        let cap = validate_credentials(cap, key)?;

        let mut cdb = self.core.cdb.clone();
        cdb.apply_options(opts);
        cdb.set_cdb_format(self.mode.cdb_format());

        let mut out = OutboundBuilder::default();
        if let Some(data) = &self.data_out {
            out.push_data(data.clone());
        }
        let user_out = out.len as u64;
        let user_in_len = self
            .data_in
            .as_ref()
            .map_or(0, |(seg, _)| seg.capacity());

        let mut retrieved = None;
        let mut attrs_pad = 0;
        let (set_bytes, get_desc_bytes, retrieved_bytes) = match self.mode {
            AttributesMode::None => {
                cdb.attr_params.set_list(&ListParams::UNUSED);
                (0, 0, 0)
            },
            AttributesMode::List => {
                let mut params = ListParams::UNUSED;

                let set_bytes = self.set_attr.len();
                if set_bytes > 0 {
                    params.set_bytes = set_bytes as u32;
                    params.set_offset = out.push_aligned(self.set_attr.to_bytes())?;
                }

                let get_desc_bytes = self.enc_get_attr.len();
                let mut retrieved_bytes = 0;
                if get_desc_bytes > 0 {
                    params.get_desc_bytes = get_desc_bytes as u32;
                    params.get_desc_offset = out.push_aligned(self.enc_get_attr.to_bytes())?;

                    let alloc = ATTR_LIST_HEADER_LEN + self.get_attr_alloc;
                    let at = offset_for(user_in_len)?;
                    let seg =
                        OwnedSegment::zeroed(alloc, self.core.policy.max_attr_segment_bytes)?;
                    retrieved = Some(seg);
                    attrs_pad = at.padding;
                    params.get_alloc_length = alloc as u32;
                    params.retrieved_offset = at.raw;
                    retrieved_bytes = alloc;
                }
                cdb.attr_params.set_list(&params);
                (set_bytes, get_desc_bytes, retrieved_bytes)
            },
            AttributesMode::Page => {
                let page = self
                    .page
                    .as_ref()
                    .ok_or_else(|| OsdError::sequence("page mode without a page request"))?;
                let mut params = PageParams {
                    retrieved_offset: OSD_OFFSET_UNUSED,
                    set_offset: OSD_OFFSET_UNUSED,
                    ..PageParams::default()
                };

                let set_bytes = match &page.set_one {
                    Some(attr) => {
                        params.set_page = attr.attr_page;
                        params.set_id = attr.attr_id;
                        params.set_length = attr.val.len() as u32;
                        params.set_offset = out.push_aligned(attr.val.clone())?;
                        attr.val.len()
                    },
                    None => 0,
                };

                let retrieved_bytes = page.buf.capacity();
                let at = offset_for(user_in_len)?;
                params.get_page = page.page_id;
                params.get_alloc_length = retrieved_bytes as u32;
                params.retrieved_offset = at.raw;
                attrs_pad = at.padding;
                cdb.attr_params.set_page(&params);
                (set_bytes, 0, retrieved_bytes)
            },
        };

        let out_integrity = DataOutIntegrity {
            data_bytes: user_out,
            set_attributes_bytes: set_bytes as u64,
            get_attributes_bytes: get_desc_bytes as u64,
        };
        let in_integrity = DataInIntegrity {
            data_bytes: user_in_len as u64,
            retrieved_attributes_bytes: retrieved_bytes as u64,
        };
        let security = apply_security(&mut cdb, cap, key, &out_integrity, &in_integrity)?;

        self.core.lifecycle.advance(RequestState::Finalized)?;
        Ok(Prepared {
            cdb,
            out,
            retrieved,
            attrs_pad,
            security,
        })
    }

    /// Move the buffers into their final layout. Infallible.
    fn commit(mut self, prepared: Prepared) -> FinalizedRequest {
        let Prepared {
            cdb,
            out,
            retrieved,
            attrs_pad,
            security,
        } = prepared;
        self.core.cdb = cdb;

        let (user_in, kind) = match self.data_in.take() {
            Some((seg, kind)) => (Some(seg), Some(kind)),
            None => (None, None),
        };
        let mut inbound = Inbound::new(user_in, kind);
        if let Some(seg) = retrieved.or_else(|| self.page.take().map(|p| p.buf)) {
            inbound.attach_attrs(seg, attrs_pad);
        }

        debug!(
            action = ?self.action,
            mode = %self.mode,
            data_out = out.len,
            data_in = inbound.total_len(),
            ?security,
            "request finalized"
        );
        if self.core.retries > 0 {
            debug!(retries = self.core.retries, "retries are left to the transport");
        }

        FinalizedRequest::new(
            self.core,
            out.segments,
            out.len,
            inbound,
            security,
            self.mode,
        )
    }
}

/// Everything [`EncodedRequest::prepare`] computed.
struct Prepared {
    cdb: OsdCdb,
    out: OutboundBuilder,
    /// Request-owned retrieved-list buffer (list mode only).
    retrieved: Option<OwnedSegment>,
    /// Pad between user data-in and the retrieved attributes.
    attrs_pad: usize,
    security: SecurityMode,
}

/// A failed finalize. The request comes back as it was, caller buffers
/// included.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FinalizeError {
    error: OsdError,
    request: Box<EncodedRequest>,
}

impl FinalizeError {
    pub fn error(&self) -> &OsdError {
        &self.error
    }

    pub fn into_parts(self) -> (OsdError, EncodedRequest) {
        (self.error, *self.request)
    }

    pub fn into_request(self) -> EncodedRequest {
        *self.request
    }
}

impl From<FinalizeError> for OsdError {
    fn from(e: FinalizeError) -> Self {
        e.error
    }
}

fn offset_for(at: usize) -> Result<EncodedOffset> {
    encode_offset(at as u64).ok_or_else(|| {
        warn!(offset = at, "offset beyond the encodable range");
        OsdError::alloc(format!("offset {at} cannot be encoded"))
    })
}

/// Data-out scatter list under construction.
#[derive(Default)]
struct OutboundBuilder {
    segments: Vec<Bytes>,
    len: usize,
}

impl OutboundBuilder {
    fn push_data(&mut self, data: Bytes) {
        self.len += data.len();
        if !data.is_empty() {
            self.segments.push(data);
        }
    }

    /// Pad to the next encodable offset, then push `seg`. Returns the
    /// encoded offset of `seg`.
    fn push_aligned(&mut self, seg: Bytes) -> Result<u32> {
        let at = offset_for(self.len)?;
        if at.padding > 0 {
            self.push_data(pad_segment(at.padding)?);
        }
        self.push_data(seg);
        Ok(at.raw)
    }
}
