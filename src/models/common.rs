// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

/// Size of a capability embedded in an OSDv1 CDB.
pub const OSD_CAP_LEN: usize = 80;
/// Size of a secret key / integrity check value.
pub const OSD_CRYPTO_KEYID_SIZE: usize = 20;
pub const OSD_CRYPTO_NONCE_SIZE: usize = 12;
/// Upper bound of the sense buffer kept per request.
pub const OSD_MAX_SENSE_LEN: usize = 252;

/// Address of an OSD object: a partition plus an object (or collection) id.
///
/// `ObjId::ROOT` addresses the root object, `{ partition: p, id: 0 }` the
/// partition object itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    pub partition: u64,
    pub id: u64,
}

impl ObjId {
    pub const ROOT: ObjId = ObjId { partition: 0, id: 0 };

    pub const fn new(partition: u64, id: u64) -> Self {
        Self { partition, id }
    }

    pub const fn partition(partition: u64) -> Self {
        Self { partition, id: 0 }
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.partition, self.id)
    }
}

/// SCSI status byte returned with a command completion (SAM-5).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ScsiStatus {
    #[default]
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    /// Any other status code defined in SAM-x or reserved
    Other(u8),
}

impl From<u8> for ScsiStatus {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ScsiStatus::Good,
            0x02 => ScsiStatus::CheckCondition,
            0x04 => ScsiStatus::ConditionMet,
            0x08 => ScsiStatus::Busy,
            0x18 => ScsiStatus::ReservationConflict,
            0x28 => ScsiStatus::TaskSetFull,
            0x30 => ScsiStatus::AcaActive,
            0x40 => ScsiStatus::TaskAborted,
            other => ScsiStatus::Other(other),
        }
    }
}

impl From<ScsiStatus> for u8 {
    fn from(s: ScsiStatus) -> Self {
        match s {
            ScsiStatus::Good => 0x00,
            ScsiStatus::CheckCondition => 0x02,
            ScsiStatus::ConditionMet => 0x04,
            ScsiStatus::Busy => 0x08,
            ScsiStatus::ReservationConflict => 0x18,
            ScsiStatus::TaskSetFull => 0x28,
            ScsiStatus::AcaActive => 0x30,
            ScsiStatus::TaskAborted => 0x40,
            ScsiStatus::Other(v) => v,
        }
    }
}
