// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fresh requests and the one encoding call each of them accepts.
//!
//! Every encoding method consumes the [`OsdRequest`] and returns an
//! [`EncodedRequest`], so a second encoding is not expressible.

use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::{
    client::{device::AllocPolicy, transport::OsdTransport},
    control_block::{
        attributes::{build_get_attributes, build_reserved, build_set_attributes},
        cdb::{FlushScope, OsdCdb},
        collection::{build_flush_collection, build_list_collection_objects},
        device::{build_flush_osd, build_format, build_list_partitions},
        object::{
            build_create_object, build_flush_object, build_read, build_remove_object,
            build_write,
        },
        partition::{
            build_create_partition, build_flush_partition, build_list_collections,
            build_list_objects, build_remove_partition,
        },
        service_action::ServiceAction,
    },
    error::{OsdError, Result},
    models::{
        common::ObjId,
        object_list::{ListContinuation, ObjectIdList},
        segment::OwnedSegment,
    },
    state_machine::{
        common::Lifecycle,
        encoded::{EncodedRequest, InboundKind},
    },
};

/// What every lifecycle stage carries along.
#[derive(Debug)]
pub(crate) struct RequestCore {
    pub transport: Arc<dyn OsdTransport>,
    pub timeout: Duration,
    pub retries: u32,
    pub policy: AllocPolicy,
    pub lifecycle: Lifecycle,
    pub cdb: OsdCdb,
}

/// A request obtained from [`crate::client::device::OsdDevice::start_request`],
/// nothing encoded yet.
#[derive(Debug)]
pub struct OsdRequest {
    core: RequestCore,
}

impl OsdRequest {
    pub(crate) fn new(
        transport: Arc<dyn OsdTransport>,
        timeout: Duration,
        retries: u32,
        policy: AllocPolicy,
    ) -> Self {
        Self {
            core: RequestCore {
                transport,
                timeout,
                retries,
                policy,
                lifecycle: Lifecycle::new(),
                cdb: OsdCdb::new(ServiceAction::GetAttributes),
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.core.retries = retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.core.timeout
    }

    pub fn retries(&self) -> u32 {
        self.core.retries
    }

    fn encoded(self) -> EncodedRequest {
        debug!(
            action = ?self.core.cdb.service_action(),
            obj = %self.core.cdb.obj(),
            "request encoded"
        );
        EncodedRequest::new(self.core)
    }

    fn encode_with(mut self, build: impl FnOnce(&mut OsdCdb)) -> EncodedRequest {
        build(&mut self.core.cdb);
        self.encoded()
    }

    fn encode_list(
        mut self,
        buf: BytesMut,
        build: impl FnOnce(&mut OsdCdb, u64),
    ) -> Result<EncodedRequest> {
        if ObjectIdList::capacity_of(buf.len()) == 0 {
            return Err(OsdError::alloc(format!(
                "list buffer of {} bytes cannot hold one id (need {})",
                buf.len(),
                ObjectIdList::buffer_for(1)
            )));
        }
        build(&mut self.core.cdb, buf.len() as u64);
        Ok(self
            .encoded()
            .with_inbound(OwnedSegment::caller(buf), InboundKind::ObjectList))
    }

    /* ===== device ===== */

    /// FORMAT OSD with `tot_capacity` bytes.
    pub fn format(self, tot_capacity: u64) -> EncodedRequest {
        self.encode_with(|cdb| build_format(cdb, tot_capacity))
    }

    /// List partition ids into `buf`.
    pub fn list_dev_partitions(
        self,
        cont: &ListContinuation,
        buf: BytesMut,
    ) -> Result<EncodedRequest> {
        self.encode_list(buf, |cdb, alloc| build_list_partitions(cdb, cont, alloc))
    }

    pub fn flush_obsd(self, scope: FlushScope) -> EncodedRequest {
        self.encode_with(|cdb| build_flush_osd(cdb, scope))
    }

    /* ===== partition ===== */

    pub fn create_partition(self, partition: u64) -> EncodedRequest {
        self.encode_with(|cdb| build_create_partition(cdb, partition))
    }

    pub fn remove_partition(self, partition: u64) -> EncodedRequest {
        self.encode_with(|cdb| build_remove_partition(cdb, partition))
    }

    pub fn list_partition_collections(
        self,
        partition: u64,
        cont: &ListContinuation,
        buf: BytesMut,
    ) -> Result<EncodedRequest> {
        self.encode_list(buf, |cdb, alloc| {
            build_list_collections(cdb, partition, cont, alloc)
        })
    }

    pub fn list_partition_objects(
        self,
        partition: u64,
        cont: &ListContinuation,
        buf: BytesMut,
    ) -> Result<EncodedRequest> {
        self.encode_list(buf, |cdb, alloc| {
            build_list_objects(cdb, partition, cont, alloc)
        })
    }

    pub fn flush_partition(self, partition: u64, scope: FlushScope) -> EncodedRequest {
        self.encode_with(|cdb| build_flush_partition(cdb, partition, scope))
    }

    /* ===== collection ===== */

    pub fn list_collection_objects(
        self,
        obj: &ObjId,
        cont: &ListContinuation,
        buf: BytesMut,
    ) -> Result<EncodedRequest> {
        self.encode_list(buf, |cdb, alloc| {
            build_list_collection_objects(cdb, obj, cont, alloc)
        })
    }

    pub fn flush_collection(self, obj: &ObjId, scope: FlushScope) -> EncodedRequest {
        self.encode_with(|cdb| build_flush_collection(cdb, obj, scope))
    }

    /* ===== object ===== */

    pub fn create_object(self, obj: &ObjId) -> EncodedRequest {
        self.encode_with(|cdb| build_create_object(cdb, obj))
    }

    pub fn remove_object(self, obj: &ObjId) -> EncodedRequest {
        self.encode_with(|cdb| build_remove_object(cdb, obj))
    }

    /// Read `buf.len()` bytes of `obj` at `offset` into `buf`, which is
    /// handed back by release.
    pub fn read(self, obj: &ObjId, buf: BytesMut, offset: u64) -> EncodedRequest {
        let len = buf.len() as u64;
        self.encode_with(|cdb| build_read(cdb, obj, offset, len))
            .with_inbound(OwnedSegment::caller(buf), InboundKind::Data)
    }

    pub fn write(self, obj: &ObjId, data: Bytes, offset: u64) -> EncodedRequest {
        let len = data.len() as u64;
        self.encode_with(|cdb| build_write(cdb, obj, offset, len))
            .with_outbound(data)
    }

    /// Flush `obj`; `offset`/`len` are used only with [`FlushScope::RANGE`].
    pub fn flush_object(
        self,
        obj: &ObjId,
        scope: FlushScope,
        offset: u64,
        len: u64,
    ) -> EncodedRequest {
        self.encode_with(|cdb| build_flush_object(cdb, obj, scope, offset, len))
    }

    /* ===== attributes ===== */

    pub fn get_attributes(self, obj: &ObjId) -> EncodedRequest {
        self.encode_with(|cdb| build_get_attributes(cdb, obj))
    }

    pub fn set_attributes(self, obj: &ObjId) -> EncodedRequest {
        self.encode_with(|cdb| build_set_attributes(cdb, obj))
    }

    /* ===== reserved, not implemented ===== */

    fn reserved(self, action: ServiceAction, obj: &ObjId) -> EncodedRequest {
        self.encode_with(|cdb| build_reserved(cdb, action, obj))
    }

    pub fn set_master_seed_xchg(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::SetMasterKey, obj)
    }

    pub fn set_master_key(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::SetMasterKey, obj)
    }

    pub fn perform_scsi_command(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::PerformScsiCommand, obj)
    }

    pub fn task_management(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::PerformTaskManagement, obj)
    }

    pub fn set_partition_key(self, partition: u64) -> EncodedRequest {
        self.reserved(ServiceAction::SetKey, &ObjId::partition(partition))
    }

    pub fn create_collection(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::CreateCollection, obj)
    }

    pub fn remove_collection(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::RemoveCollection, obj)
    }

    pub fn query(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::Query, obj)
    }

    pub fn get_member_attrs(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::GetMemberAttributes, obj)
    }

    pub fn set_member_attrs(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::SetMemberAttributes, obj)
    }

    pub fn append(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::Append, obj)
    }

    pub fn create_write(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::CreateAndWrite, obj)
    }

    pub fn clear(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::Clear, obj)
    }

    pub fn punch(self, obj: &ObjId) -> EncodedRequest {
        self.reserved(ServiceAction::Punch, obj)
    }
}
