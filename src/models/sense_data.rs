// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sense data decoding for OSD completions.
//!
//! Both fixed (`0x70`/`0x71`) and descriptor (`0x72`/`0x73`) formats are
//! accepted. The OSD descriptors carried in descriptor format are:
//!
//! * `0x02` sense-key specific (field pointer into the CDB),
//! * `0x06` OSD object identification (failing object + command functions),
//! * `0x08` OSD attribute identification (failing attribute ids).

use std::fmt;

use crate::{
    error::{OsdError, Result},
    models::common::{OSD_MAX_SENSE_LEN, ObjId, ScsiStatus},
};

/// Sense data must be ≥ 18 bytes for fixed format.
pub const FIXED_MIN_LEN: usize = 18;
/// Descriptor-format header.
pub const DESC_HEADER_LEN: usize = 8;

pub const SENSE_FIXED_CURRENT: u8 = 0x70;
pub const SENSE_FIXED_DEFERRED: u8 = 0x71;
pub const SENSE_DESC_CURRENT: u8 = 0x72;
pub const SENSE_DESC_DEFERRED: u8 = 0x73;

pub const DESC_SENSE_KEY_SPECIFIC: u8 = 0x02;
pub const DESC_OSD_OBJECT_IDENTIFICATION: u8 = 0x06;
pub const DESC_OSD_ATTRIBUTE_IDENTIFICATION: u8 = 0x08;

/// Sense keys used by OSD targets.
pub mod sense_key {
    pub const NO_SENSE: u8 = 0x0;
    pub const RECOVERED_ERROR: u8 = 0x1;
    pub const NOT_READY: u8 = 0x2;
    pub const MEDIUM_ERROR: u8 = 0x3;
    pub const HARDWARE_ERROR: u8 = 0x4;
    pub const ILLEGAL_REQUEST: u8 = 0x5;
    pub const UNIT_ATTENTION: u8 = 0x6;
    pub const DATA_PROTECT: u8 = 0x7;
    pub const ABORTED_COMMAND: u8 = 0xB;
}

/// Combined `asc << 8 | ascq` codes with OSD meaning.
pub mod additional_code {
    pub const NO_ADDITIONAL_SENSE: u16 = 0x0000;
    pub const INVALID_FIELD_IN_CDB: u16 = 0x2400;
    pub const SECURITY_AUDIT_VALUE_FROZEN: u16 = 0x2404;
    pub const SECURITY_WORKING_KEY_FROZEN: u16 = 0x2405;
    pub const NONCE_NOT_UNIQUE: u16 = 0x2406;
    pub const NONCE_TIMESTAMP_OUT_OF_RANGE: u16 = 0x2407;
    pub const INVALID_FIELD_IN_PARAMETER_LIST: u16 = 0x2600;
    pub const INVALID_SECURITY_PARAMETERS: u16 = 0x260F;
    pub const PARTITION_OR_COLLECTION_NOT_EMPTY: u16 = 0x2C0A;
    pub const READ_PAST_END_OF_USER_OBJECT: u16 = 0x3B17;
    pub const QUOTA_ERROR: u16 = 0x5507;
}

/// CDB byte offsets a field pointer commonly names.
pub mod field_offset {
    pub const PARTITION_ID: u16 = 16;
    pub const OBJECT_ID: u16 = 24;
    pub const STARTING_BYTE: u16 = 44;
    pub const SECURITY_METHOD: u16 = 82;
    pub const PERMISSIONS: u16 = 129;
    pub const CAPABILITY: core::ops::Range<u16> = 80..160;
    pub const INTEGRITY_CHECK_VALUE: u16 = 160;
    pub const NONCE: u16 = 180;
}

/// SPC-4 fixed-format sense data.
#[repr(C)]
#[derive(Default, PartialEq)]
pub struct SenseData {
    pub valid: bool,        // bit7 of byte0
    pub response_code: u8,  // low-7 bits of byte0
    pub sense_key: u8,      // low-4 bits of byte2
    pub ili: bool,          // bit5 of byte2
    pub eom: bool,          // bit6 of byte2
    pub filemark: bool,     // bit7 of byte2
    pub information: u32,   // bytes 3-6
    pub additional_len: u8, // byte7
    pub cmd_specific: u32,  // bytes 8-11
    pub asc: u8,            // Additional Sense Code
    pub ascq: u8,           // Additional Sense Code Qualifier
    /// Bytes 15..18 when SKSV is set: CDB field pointer.
    pub field_pointer: Option<u16>,
}

impl SenseData {
    /// Parse *fixed-format* sense-data (SPC-4 § 4.5.3).
    ///
    /// The buffer must be at least 18 bytes long.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            return Err(OsdError::malformed(format!(
                "sense buffer too small: {} < {FIXED_MIN_LEN}",
                buf.len()
            )));
        }

        let sksv = buf[15] & 0x80 != 0;
        Ok(Self {
            valid: buf[0] & 0x80 != 0,
            response_code: buf[0] & 0x7F,
            sense_key: buf[2] & 0x0F,
            ili: buf[2] & 0x20 != 0,
            eom: buf[2] & 0x40 != 0,
            filemark: buf[2] & 0x80 != 0,
            information: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            additional_len: buf[7],
            cmd_specific: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            asc: buf[12],
            ascq: buf[13],
            field_pointer: sksv.then(|| u16::from_be_bytes([buf[16], buf[17]])),
        })
    }
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("valid", &self.valid)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &format_args!("{:#x}", self.sense_key))
            .field("information", &self.information)
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("field_pointer", &self.field_pointer)
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

/// Return the description for a given ASC/ASCQ pair.
///
/// * If the pair is not present in the table, returns `"UNSPECIFIED /
///   vendor specific"`.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    hot_table(asc, ascq).unwrap_or("UNSPECIFIED / vendor specific")
}

fn hot_table(asc: u8, ascq: u8) -> Option<&'static str> {
    Some(match (asc, ascq) {
        (0x00, 0x00) => "No additional sense information",
        (0x04, 0x01) => "Logical unit is in process of becoming ready",
        (0x0C, 0x00) => "Write error",
        (0x11, 0x00) => "Unrecovered read error",
        (0x1A, 0x00) => "Parameter list length error",
        (0x20, 0x00) => "Invalid command operation code",
        (0x24, 0x00) => "Invalid field in CDB",
        (0x24, 0x04) => "Security audit value frozen",
        (0x24, 0x05) => "Security working key frozen",
        (0x24, 0x06) => "Nonce not unique",
        (0x24, 0x07) => "Nonce timestamp out of range",
        (0x26, 0x00) => "Invalid field in parameter list",
        (0x26, 0x0F) => "Invalid security parameters",
        (0x2C, 0x0A) => "Partition or collection contains user objects",
        (0x3B, 0x17) => "Read past end of user object",
        (0x55, 0x07) => "Quota error",
        _ => return None,
    })
}

/// Failure classes, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorPriority {
    #[default]
    NoError,
    /// Read past the end of an object: the tail reads as zeros.
    ClearPages,
    Resource,
    BadCredentials,
    NoAccess,
    Unreachable,
    NotFound,
    NoSpace,
    Eio,
}

/// Decoded sense information of one completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdSenseInfo {
    /// False when the target returned no sense bytes.
    pub available: bool,
    pub response_code: u8,
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
    pub not_initiated_command_functions: u32,
    pub completed_command_functions: u32,
    pub obj: Option<ObjId>,
    pub attrs: Vec<(u32, u32)>,
    pub field_pointer: Option<u16>,
}

impl OsdSenseInfo {
    /// `asc << 8 | ascq`
    #[inline]
    pub fn additional_code(&self) -> u16 {
        u16::from_be_bytes([self.asc, self.ascq])
    }

    pub fn description(&self) -> &'static str {
        asc_ascq_to_str(self.asc, self.ascq)
    }

    fn is_security_code(code: u16) -> bool {
        matches!(
            code,
            additional_code::SECURITY_AUDIT_VALUE_FROZEN
                | additional_code::SECURITY_WORKING_KEY_FROZEN
                | additional_code::NONCE_NOT_UNIQUE
                | additional_code::NONCE_TIMESTAMP_OUT_OF_RANGE
                | additional_code::INVALID_SECURITY_PARAMETERS
        )
    }

    /// Classify the sense information alone.
    pub fn priority(&self) -> ErrorPriority {
        if !self.available {
            return ErrorPriority::NoError;
        }
        let code = self.additional_code();
        match self.key {
            // reported with RECOVERED ERROR; the bytes past the end are zeroed
            _ if code == additional_code::READ_PAST_END_OF_USER_OBJECT => {
                ErrorPriority::ClearPages
            },
            sense_key::NO_SENSE | sense_key::RECOVERED_ERROR => ErrorPriority::NoError,
            sense_key::NOT_READY | sense_key::UNIT_ATTENTION => ErrorPriority::Unreachable,
            sense_key::DATA_PROTECT => ErrorPriority::NoAccess,
            _ if code == additional_code::QUOTA_ERROR => ErrorPriority::NoSpace,
            _ if Self::is_security_code(code) => ErrorPriority::BadCredentials,
            sense_key::ILLEGAL_REQUEST if code == additional_code::INVALID_FIELD_IN_CDB => {
                match self.field_pointer {
                    Some(field_offset::STARTING_BYTE) => ErrorPriority::ClearPages,
                    Some(field_offset::OBJECT_ID | field_offset::PARTITION_ID) => {
                        ErrorPriority::NotFound
                    },
                    Some(field_offset::PERMISSIONS) => ErrorPriority::NoAccess,
                    Some(
                        field_offset::INTEGRITY_CHECK_VALUE | field_offset::NONCE,
                    ) => ErrorPriority::BadCredentials,
                    Some(fp) if field_offset::CAPABILITY.contains(&fp) => {
                        ErrorPriority::BadCredentials
                    },
                    _ => ErrorPriority::Eio,
                }
            },
            _ if self.asc == 0x55 => ErrorPriority::Resource,
            _ => ErrorPriority::Eio,
        }
    }

    /// Serialize as descriptor-format sense (used by targets).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; DESC_HEADER_LEN];
        out[0] = SENSE_DESC_CURRENT;
        out[1] = self.key & 0x0F;
        out[2] = self.asc;
        out[3] = self.ascq;

        if let Some(fp) = self.field_pointer {
            // SKSV | C/D (error in CDB)
            out.extend_from_slice(&[DESC_SENSE_KEY_SPECIFIC, 0x06, 0, 0, 0xC0]);
            out.extend_from_slice(&fp.to_be_bytes());
            out.push(0);
        }
        if let Some(obj) = self.obj {
            out.extend_from_slice(&[DESC_OSD_OBJECT_IDENTIFICATION, 0x1E, 0, 0, 0, 0, 0, 0]);
            out.extend_from_slice(&self.not_initiated_command_functions.to_be_bytes());
            out.extend_from_slice(&self.completed_command_functions.to_be_bytes());
            out.extend_from_slice(&obj.partition.to_be_bytes());
            out.extend_from_slice(&obj.id.to_be_bytes());
        }
        if !self.attrs.is_empty() {
            let max_attrs = (u8::MAX as usize - 2) / 8;
            let attrs = &self.attrs[..self.attrs.len().min(max_attrs)];
            out.extend_from_slice(&[
                DESC_OSD_ATTRIBUTE_IDENTIFICATION,
                (2 + attrs.len() * 8) as u8,
                0,
                0,
            ]);
            for (page, id) in attrs {
                out.extend_from_slice(&page.to_be_bytes());
                out.extend_from_slice(&id.to_be_bytes());
            }
        }

        out.truncate(OSD_MAX_SENSE_LEN);
        out[7] = (out.len() - DESC_HEADER_LEN) as u8;
        out
    }
}

impl fmt::Display for OsdSenseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.available {
            return write!(f, "no sense data");
        }
        write!(
            f,
            "key={:#x} asc/ascq={:#06x} ({})",
            self.key,
            self.additional_code(),
            self.description()
        )?;
        if let Some(obj) = self.obj {
            write!(f, " obj={obj}")?;
        }
        if let Some(fp) = self.field_pointer {
            write!(f, " field={fp}")?;
        }
        Ok(())
    }
}

/// Decode a sense buffer. Never fails and never reads past `buf`, the
/// declared additional length, or [`OSD_MAX_SENSE_LEN`].
pub fn decode_sense(buf: &[u8]) -> OsdSenseInfo {
    let buf = &buf[..buf.len().min(OSD_MAX_SENSE_LEN)];
    let Some(&first) = buf.first() else {
        return OsdSenseInfo::default();
    };

    let response_code = first & 0x7F;
    match response_code {
        SENSE_DESC_CURRENT | SENSE_DESC_DEFERRED => decode_descriptor(buf, response_code),
        SENSE_FIXED_CURRENT | SENSE_FIXED_DEFERRED => decode_fixed(buf, response_code),
        _ => OsdSenseInfo {
            available: true,
            response_code,
            ..Default::default()
        },
    }
}

fn decode_fixed(buf: &[u8], response_code: u8) -> OsdSenseInfo {
    if let Ok(sd) = SenseData::parse(buf) {
        return OsdSenseInfo {
            available: true,
            response_code,
            key: sd.sense_key,
            asc: sd.asc,
            ascq: sd.ascq,
            field_pointer: sd.field_pointer,
            ..Default::default()
        };
    }
    // short fixed sense: take whatever fields are present
    OsdSenseInfo {
        available: true,
        response_code,
        key: buf.get(2).map_or(0, |b| b & 0x0F),
        asc: buf.get(12).copied().unwrap_or(0),
        ascq: buf.get(13).copied().unwrap_or(0),
        ..Default::default()
    }
}

fn decode_descriptor(buf: &[u8], response_code: u8) -> OsdSenseInfo {
    let mut info = OsdSenseInfo {
        available: true,
        response_code,
        key: buf.get(1).map_or(0, |b| b & 0x0F),
        asc: buf.get(2).copied().unwrap_or(0),
        ascq: buf.get(3).copied().unwrap_or(0),
        ..Default::default()
    };
    if buf.len() < DESC_HEADER_LEN {
        return info;
    }

    let end = (DESC_HEADER_LEN + buf[7] as usize).min(buf.len());
    let mut pos = DESC_HEADER_LEN;
    while pos + 2 <= end {
        let desc_type = buf[pos];
        let desc_end = pos + 2 + buf[pos + 1] as usize;
        if desc_end > end {
            break;
        }
        let body = &buf[pos + 2..desc_end];

        match desc_type {
            DESC_SENSE_KEY_SPECIFIC if body.len() >= 5 && body[2] & 0x80 != 0 => {
                info.field_pointer = Some(u16::from_be_bytes([body[3], body[4]]));
            },
            DESC_OSD_OBJECT_IDENTIFICATION if body.len() >= 30 => {
                info.not_initiated_command_functions =
                    u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
                info.completed_command_functions =
                    u32::from_be_bytes([body[10], body[11], body[12], body[13]]);
                let be64 = |s: &[u8]| {
                    u64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
                };
                info.obj = Some(ObjId::new(be64(&body[14..22]), be64(&body[22..30])));
            },
            DESC_OSD_ATTRIBUTE_IDENTIFICATION if body.len() >= 2 => {
                info.attrs.extend(body[2..].chunks_exact(8).map(|c| {
                    (
                        u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                        u32::from_be_bytes([c[4], c[5], c[6], c[7]]),
                    )
                }));
            },
            _ => {},
        }
        pos = desc_end;
    }
    info
}

/// Priority of a completion, combining the status byte with its sense.
pub fn classify(status: ScsiStatus, sense: &OsdSenseInfo) -> ErrorPriority {
    match status {
        ScsiStatus::Good | ScsiStatus::ConditionMet => ErrorPriority::NoError,
        ScsiStatus::Busy | ScsiStatus::TaskSetFull => ErrorPriority::Resource,
        ScsiStatus::ReservationConflict => ErrorPriority::NoAccess,
        ScsiStatus::CheckCondition if sense.available => match sense.priority() {
            ErrorPriority::NoError => ErrorPriority::Eio,
            p => p,
        },
        _ => ErrorPriority::Eio,
    }
}
