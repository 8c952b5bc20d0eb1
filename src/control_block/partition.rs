// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::{
        cdb::{FlushScope, OsdCdb},
        device::fill_list_fields,
        service_action::ServiceAction,
    },
    models::{common::ObjId, object_list::ListContinuation},
};

/// **CREATE PARTITION** `partition` (bytes 16..24), object id zero.
#[inline]
pub fn build_create_partition(cdb: &mut OsdCdb, partition: u64) {
    *cdb = OsdCdb::new(ServiceAction::CreatePartition);
    cdb.set_obj(&ObjId::partition(partition));
}

/// **REMOVE PARTITION** `partition`; the target refuses non-empty ones.
#[inline]
pub fn build_remove_partition(cdb: &mut OsdCdb, partition: u64) {
    *cdb = OsdCdb::new(ServiceAction::RemovePartition);
    cdb.set_obj(&ObjId::partition(partition));
}

/// **LIST COLLECTION** with collection id 0: enumerates the collections of
/// `partition`.
#[inline]
pub fn build_list_collections(
    cdb: &mut OsdCdb,
    partition: u64,
    cont: &ListContinuation,
    alloc_len: u64,
) {
    *cdb = OsdCdb::new(ServiceAction::ListCollection);
    cdb.set_obj(&ObjId::partition(partition));
    fill_list_fields(cdb, cont, alloc_len);
}

/// **LIST** of the user objects of `partition`.
#[inline]
pub fn build_list_objects(
    cdb: &mut OsdCdb,
    partition: u64,
    cont: &ListContinuation,
    alloc_len: u64,
) {
    *cdb = OsdCdb::new(ServiceAction::List);
    cdb.set_obj(&ObjId::partition(partition));
    fill_list_fields(cdb, cont, alloc_len);
}

/// **FLUSH PARTITION**
#[inline]
pub fn build_flush_partition(cdb: &mut OsdCdb, partition: u64, scope: FlushScope) {
    *cdb = OsdCdb::new(ServiceAction::FlushPartition);
    cdb.set_obj(&ObjId::partition(partition));
    cdb.set_cmd_specific(scope as u8);
}
