// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::{cdb::OsdCdb, service_action::ServiceAction},
    models::common::ObjId,
};

/// **GET ATTRIBUTES** of `obj`. What is fetched comes from the attribute
/// parameters filled in at finalize.
#[inline]
pub fn build_get_attributes(cdb: &mut OsdCdb, obj: &ObjId) {
    *cdb = OsdCdb::new(ServiceAction::GetAttributes);
    cdb.set_obj(obj);
}

/// **SET ATTRIBUTES** of `obj`.
#[inline]
pub fn build_set_attributes(cdb: &mut OsdCdb, obj: &ObjId) {
    *cdb = OsdCdb::new(ServiceAction::SetAttributes);
    cdb.set_obj(obj);
}

/// Reserve `action` on `obj` without any further encoding. Used for actions
/// this initiator cannot finalize.
#[inline]
pub fn build_reserved(cdb: &mut OsdCdb, action: ServiceAction, obj: &ObjId) {
    *cdb = OsdCdb::new(action);
    cdb.set_obj(obj);
}
