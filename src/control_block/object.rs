// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::{
        cdb::{FlushScope, OsdCdb},
        service_action::ServiceAction,
    },
    models::common::ObjId,
};

/// **CREATE** user object `obj`.
#[inline]
pub fn build_create_object(cdb: &mut OsdCdb, obj: &ObjId) {
    *cdb = OsdCdb::new(ServiceAction::Create);
    cdb.set_obj(obj);
}

/// **REMOVE** user object `obj`.
#[inline]
pub fn build_remove_object(cdb: &mut OsdCdb, obj: &ObjId) {
    *cdb = OsdCdb::new(ServiceAction::Remove);
    cdb.set_obj(obj);
}

/// **READ** `len` bytes of `obj` starting at byte `offset`.
///
/// - bytes 36..44 : length
/// - bytes 44..52 : starting byte address
#[inline]
pub fn build_read(cdb: &mut OsdCdb, obj: &ObjId, offset: u64, len: u64) {
    *cdb = OsdCdb::new(ServiceAction::Read);
    cdb.set_obj(obj);
    cdb.length.set(len);
    cdb.start_address.set(offset);
}

/// **WRITE** `len` bytes to `obj` at byte `offset`.
#[inline]
pub fn build_write(cdb: &mut OsdCdb, obj: &ObjId, offset: u64, len: u64) {
    *cdb = OsdCdb::new(ServiceAction::Write);
    cdb.set_obj(obj);
    cdb.length.set(len);
    cdb.start_address.set(offset);
}

/// **FLUSH** user object. With [`FlushScope::RANGE`] only
/// `[offset, offset + len)` is flushed; other scopes ignore the range.
#[inline]
pub fn build_flush_object(
    cdb: &mut OsdCdb,
    obj: &ObjId,
    scope: FlushScope,
    offset: u64,
    len: u64,
) {
    *cdb = OsdCdb::new(ServiceAction::Flush);
    cdb.set_obj(obj);
    cdb.set_cmd_specific(scope as u8);
    if scope == FlushScope::RANGE {
        cdb.length.set(len);
        cdb.start_address.set(offset);
    }
}
