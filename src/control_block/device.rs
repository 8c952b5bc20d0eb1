// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Device-wide commands, addressed to the root object.

use crate::{
    control_block::{
        cdb::{FlushScope, OsdCdb},
        service_action::ServiceAction,
    },
    models::{common::ObjId, object_list::ListContinuation},
};

/// **FORMAT OSD**
///
/// - bytes 16..32 : root object (zero)
/// - bytes 36..44 : formatted capacity in bytes
#[inline]
pub fn build_format(cdb: &mut OsdCdb, tot_capacity: u64) {
    *cdb = OsdCdb::new(ServiceAction::FormatOsd);
    cdb.set_obj(&ObjId::ROOT);
    cdb.length.set(tot_capacity);
}

/// **LIST** on partition 0: enumerates partition ids.
///
/// - bytes 32..36 : list identifier from the previous call (0 first)
/// - bytes 36..44 : allocation length of the result buffer
/// - bytes 44..52 : initial id (exclusive)
#[inline]
pub fn build_list_partitions(cdb: &mut OsdCdb, cont: &ListContinuation, alloc_len: u64) {
    *cdb = OsdCdb::new(ServiceAction::List);
    cdb.set_obj(&ObjId::ROOT);
    fill_list_fields(cdb, cont, alloc_len);
}

/// **FLUSH OSD** with `scope` in the command-specific bits.
#[inline]
pub fn build_flush_osd(cdb: &mut OsdCdb, scope: FlushScope) {
    *cdb = OsdCdb::new(ServiceAction::FlushOsd);
    cdb.set_obj(&ObjId::ROOT);
    cdb.set_cmd_specific(scope as u8);
}

/// Continuation and allocation fields shared by LIST and LIST COLLECTION.
pub(crate) fn fill_list_fields(cdb: &mut OsdCdb, cont: &ListContinuation, alloc_len: u64) {
    cdb.list_identifier.set(cont.list_identifier);
    cdb.length.set(alloc_len);
    cdb.start_address.set(cont.initial_id);
}
