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

/// **LIST COLLECTION**: user objects that are members of collection `obj`.
#[inline]
pub fn build_list_collection_objects(
    cdb: &mut OsdCdb,
    obj: &ObjId,
    cont: &ListContinuation,
    alloc_len: u64,
) {
    *cdb = OsdCdb::new(ServiceAction::ListCollection);
    cdb.set_obj(obj);
    fill_list_fields(cdb, cont, alloc_len);
}

/// **FLUSH COLLECTION**
#[inline]
pub fn build_flush_collection(cdb: &mut OsdCdb, obj: &ObjId, scope: FlushScope) {
    *cdb = OsdCdb::new(ServiceAction::FlushCollection);
    cdb.set_obj(obj);
    cdb.set_cmd_specific(scope as u8);
}
