// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OSDv1 capability, 80 bytes:
//!
//! ```text
//! [0]      format (0x01)          [1]      key version | integrity algorithm
//! [2]      security method        [4..10]  expiration time
//! [10..30] audit                  [30..42] discriminator
//! [42..48] object created time    [48]     object type
//! [49..54] permissions            [55]     object descriptor type
//! [56..60] allowed attributes     [64..72] allowed partition id
//! [72..80] allowed object id
//! ```

use core::fmt;

use crate::{
    error::{OsdError, Result},
    models::common::{OSD_CAP_LEN, ObjId},
};

pub const CAP_FORMAT_V1: u8 = 0x01;
pub const CAP_INTEGRITY_HMAC_SHA1: u8 = 0x01;

const SECURITY_METHOD_BYTE: usize = 2;
const OBJECT_TYPE_BYTE: usize = 48;
const PERMISSIONS: core::ops::Range<usize> = 49..54;
const OBJECT_DESCRIPTOR_TYPE_BYTE: usize = 55;
const ALLOWED_PARTITION: core::ops::Range<usize> = 64..72;
const ALLOWED_OBJECT: core::ops::Range<usize> = 72..80;

/// Security method, low nibble of capability byte 2.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityMethod {
    #[default]
    NoSec = 0,
    CapKey = 1,
    CmdRsp = 2,
    AllData = 3,
}

impl SecurityMethod {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v & 0x0F {
            0 => Some(Self::NoSec),
            1 => Some(Self::CapKey),
            2 => Some(Self::CmdRsp),
            3 => Some(Self::AllData),
            _ => None,
        }
    }
}

/// Capability bytes as embedded in CDB bytes 80..160.
#[derive(Clone, PartialEq, Eq)]
pub struct Capability([u8; OSD_CAP_LEN]);

impl Capability {
    /// Capability granting every permission on `obj` (partition and object
    /// id zero act as wildcards on the target side).
    pub fn new(method: SecurityMethod, obj: &ObjId) -> Self {
        let mut raw = [0u8; OSD_CAP_LEN];
        raw[0] = CAP_FORMAT_V1;
        raw[1] = CAP_INTEGRITY_HMAC_SHA1;
        raw[SECURITY_METHOD_BYTE] = method as u8;
        raw[OBJECT_TYPE_BYTE] = object_type(obj);
        raw[PERMISSIONS].fill(0xFF);
        raw[OBJECT_DESCRIPTOR_TYPE_BYTE] = 0x10;
        raw[ALLOWED_PARTITION].copy_from_slice(&obj.partition.to_be_bytes());
        raw[ALLOWED_OBJECT].copy_from_slice(&obj.id.to_be_bytes());
        Self(raw)
    }

    /// Copy caller bytes, which must be exactly [`OSD_CAP_LEN`] long.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let raw: [u8; OSD_CAP_LEN] = raw.try_into().map_err(|_| {
            OsdError::SigningFailure(format!(
                "capability must be {OSD_CAP_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; OSD_CAP_LEN] {
        &self.0
    }

    pub fn security_method(&self) -> Option<SecurityMethod> {
        SecurityMethod::from_u8(self.0[SECURITY_METHOD_BYTE])
    }

    pub fn set_security_method(&mut self, method: SecurityMethod) {
        let b = &mut self.0[SECURITY_METHOD_BYTE];
        *b = (*b & 0xF0) | method as u8;
    }

    pub fn allowed_obj(&self) -> ObjId {
        let be64 = |r: core::ops::Range<usize>| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&self.0[r]);
            u64::from_be_bytes(b)
        };
        ObjId::new(be64(ALLOWED_PARTITION), be64(ALLOWED_OBJECT))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("method", &self.security_method())
            .field("obj", &format_args!("{}", self.allowed_obj()))
            .finish()
    }
}

fn object_type(obj: &ObjId) -> u8 {
    match (obj.partition, obj.id) {
        (0, _) => 0x01, // root
        (_, 0) => 0x02, // partition
        _ => 0x80,      // user object
    }
}
