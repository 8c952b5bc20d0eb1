// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, U16, U32, U64,
};

use crate::{
    control_block::{offset::OSD_OFFSET_UNUSED, service_action::ServiceAction},
    error::{OsdError, Result},
    models::common::{OSD_CAP_LEN, OSD_CRYPTO_KEYID_SIZE, OSD_CRYPTO_NONCE_SIZE, ObjId},
};

/// Variable-length CDB operation code.
pub const OSD_VARLEN_OPCODE: u8 = 0x7F;
pub const OSD_CDB_LEN: usize = 200;
/// Bytes following byte 7 of the CDB.
pub const OSD_ADDITIONAL_CDB_LEN: u8 = (OSD_CDB_LEN - 8) as u8;

/// GET/SET CDBFMT values (byte 11, bits 5:4).
pub const CDB_FMT_MASK: u8 = 0x30;
pub const CDB_FMT_PAGE: u8 = 0x20;
pub const CDB_FMT_LIST: u8 = 0x30;
/// Command-specific options (byte 11, bits 3:0).
pub const CMD_SPECIFIC_MASK: u8 = 0x0F;

/// Timestamp control value that bypasses attribute timestamp updates.
pub const TIMESTAMP_BYPASS: u8 = 0x7F;

bitflags::bitflags! {
    /// Per-request options applied at finalize.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ReqOptions: u8 {
        /// Force unit access (byte 10)
        const FUA = 0x08;
        /// Disable page out (byte 10)
        const DPO = 0x10;
        /// Timestamp control = bypass (byte 12)
        const BYPASS_TIMESTAMPS = 0x80;
    }
}

impl ReqOptions {
    /// Bits that live in CDB byte 10.
    pub const CDB_OPTIONS: ReqOptions = ReqOptions::FUA.union(ReqOptions::DPO);
}

/// Flush scope, command-specific bits 3:0.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    #[default]
    All = 0,
    AttributesOnly = 1,
    AllRecursive = 2,
}

impl FlushScope {
    /// For user objects scope 2 flushes the byte range in length/start.
    pub const RANGE: FlushScope = FlushScope::AllRecursive;

    pub fn from_u8(v: u8) -> Option<Self> {
        match v & CMD_SPECIFIC_MASK {
            0 => Some(Self::All),
            1 => Some(Self::AttributesOnly),
            2 => Some(Self::AllRecursive),
            _ => None,
        }
    }
}

/// List-mode view of the attribute parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListParams {
    pub get_desc_bytes: u32,
    /// OSD offset into data-out
    pub get_desc_offset: u32,
    pub get_alloc_length: u32,
    /// OSD offset into data-in
    pub retrieved_offset: u32,
    pub set_bytes: u32,
    /// OSD offset into data-out
    pub set_offset: u32,
}

impl ListParams {
    pub const UNUSED: ListParams = ListParams {
        get_desc_bytes: 0,
        get_desc_offset: OSD_OFFSET_UNUSED,
        get_alloc_length: 0,
        retrieved_offset: OSD_OFFSET_UNUSED,
        set_bytes: 0,
        set_offset: OSD_OFFSET_UNUSED,
    };
}

/// Page-mode view of the attribute parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageParams {
    pub get_page: u32,
    pub get_alloc_length: u32,
    /// OSD offset into data-in
    pub retrieved_offset: u32,
    pub set_page: u32,
    pub set_id: u32,
    pub set_length: u32,
    /// OSD offset into data-out
    pub set_offset: u32,
}

/// CDB bytes 52..80: seven big-endian words whose meaning depends on CDBFMT.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AttrParams(pub [U32<BigEndian>; 7]);

impl AttrParams {
    pub fn list(&self) -> ListParams {
        let w = &self.0;
        ListParams {
            get_desc_bytes: w[0].get(),
            get_desc_offset: w[1].get(),
            get_alloc_length: w[2].get(),
            retrieved_offset: w[3].get(),
            set_bytes: w[4].get(),
            set_offset: w[5].get(),
        }
    }

    pub fn set_list(&mut self, p: &ListParams) {
        let words = [
            p.get_desc_bytes,
            p.get_desc_offset,
            p.get_alloc_length,
            p.retrieved_offset,
            p.set_bytes,
            p.set_offset,
            0,
        ];
        for (dst, v) in self.0.iter_mut().zip(words) {
            dst.set(v);
        }
    }

    pub fn page(&self) -> PageParams {
        let w = &self.0;
        PageParams {
            get_page: w[0].get(),
            get_alloc_length: w[1].get(),
            retrieved_offset: w[2].get(),
            set_page: w[3].get(),
            set_id: w[4].get(),
            set_length: w[5].get(),
            set_offset: w[6].get(),
        }
    }

    pub fn set_page(&mut self, p: &PageParams) {
        let words = [
            p.get_page,
            p.get_alloc_length,
            p.retrieved_offset,
            p.set_page,
            p.set_id,
            p.set_length,
            p.set_offset,
        ];
        for (dst, v) in self.0.iter_mut().zip(words) {
            dst.set(v);
        }
    }
}

/// OSDv1 CDB, 200 bytes.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct OsdCdb {
    pub opcode: u8,                                     // byte 0: 0x7F
    pub control: u8,                                    // byte 1
    reserved0: [u8; 5],                                 // bytes 2..7
    pub additional_cdb_length: u8,                      // byte 7: 192
    pub service_action: U16<BigEndian>,                 // bytes 8..10
    pub options: u8,                                    // byte 10: DPO/FUA
    pub fmt_cmd_specific: u8,                           // byte 11
    pub timestamp_control: u8,                          // byte 12
    reserved1: [u8; 3],                                 // bytes 13..16
    pub partition: U64<BigEndian>,                      // bytes 16..24
    pub object: U64<BigEndian>,                         // bytes 24..32
    pub list_identifier: U32<BigEndian>,                // bytes 32..36
    pub length: U64<BigEndian>,                         // bytes 36..44
    pub start_address: U64<BigEndian>,                  // bytes 44..52
    pub attr_params: AttrParams,                        // bytes 52..80
    pub capability: [u8; OSD_CAP_LEN],                  // bytes 80..160
    pub integrity_check_value: [u8; OSD_CRYPTO_KEYID_SIZE], // bytes 160..180
    pub nonce: [u8; OSD_CRYPTO_NONCE_SIZE],             // bytes 180..192
    pub data_in_integrity_offset: U32<BigEndian>,       // bytes 192..196
    pub data_out_integrity_offset: U32<BigEndian>,      // bytes 196..200
}

const _: () = assert!(size_of::<OsdCdb>() == OSD_CDB_LEN);

/// CDB byte offset of the integrity check value.
pub const ICV_OFFSET: usize = 160;

impl OsdCdb {
    /// Zeroed CDB carrying only the header and `action`.
    pub fn new(action: ServiceAction) -> Self {
        let mut cdb = Self::new_zeroed();
        cdb.opcode = OSD_VARLEN_OPCODE;
        cdb.additional_cdb_length = OSD_ADDITIONAL_CDB_LEN;
        cdb.service_action.set(action.code());
        cdb.data_in_integrity_offset.set(OSD_OFFSET_UNUSED);
        cdb.data_out_integrity_offset.set(OSD_OFFSET_UNUSED);
        cdb
    }

    /// View a received 200-byte CDB.
    pub fn parse(buf: &[u8]) -> Result<&Self> {
        let cdb = Self::ref_from_bytes(buf).map_err(|_| {
            OsdError::malformed(format!(
                "OSD CDB must be {OSD_CDB_LEN} bytes, got {}",
                buf.len()
            ))
        })?;
        if cdb.opcode != OSD_VARLEN_OPCODE || cdb.additional_cdb_length != OSD_ADDITIONAL_CDB_LEN
        {
            return Err(OsdError::malformed(format!(
                "not an OSDv1 CDB: opcode={:#04x} additional length={}",
                cdb.opcode, cdb.additional_cdb_length
            )));
        }
        Ok(cdb)
    }

    #[inline]
    pub fn service_action(&self) -> Option<ServiceAction> {
        ServiceAction::from_u16(self.service_action.get())
    }

    #[inline]
    pub fn obj(&self) -> ObjId {
        ObjId::new(self.partition.get(), self.object.get())
    }

    pub fn set_obj(&mut self, obj: &ObjId) {
        self.partition.set(obj.partition);
        self.object.set(obj.id);
    }

    #[inline]
    pub fn cdb_format(&self) -> u8 {
        self.fmt_cmd_specific & CDB_FMT_MASK
    }

    pub fn set_cdb_format(&mut self, fmt: u8) {
        self.fmt_cmd_specific = (self.fmt_cmd_specific & !CDB_FMT_MASK) | (fmt & CDB_FMT_MASK);
    }

    #[inline]
    pub fn cmd_specific(&self) -> u8 {
        self.fmt_cmd_specific & CMD_SPECIFIC_MASK
    }

    pub fn set_cmd_specific(&mut self, bits: u8) {
        self.fmt_cmd_specific =
            (self.fmt_cmd_specific & !CMD_SPECIFIC_MASK) | (bits & CMD_SPECIFIC_MASK);
    }

    pub fn apply_options(&mut self, opts: ReqOptions) {
        self.options |= (opts & ReqOptions::CDB_OPTIONS).bits();
        if opts.contains(ReqOptions::BYPASS_TIMESTAMPS) {
            self.timestamp_control = TIMESTAMP_BYPASS;
        }
    }

    pub fn req_options(&self) -> ReqOptions {
        let mut opts = ReqOptions::from_bits_truncate(self.options) & ReqOptions::CDB_OPTIONS;
        if self.timestamp_control == TIMESTAMP_BYPASS {
            opts |= ReqOptions::BYPASS_TIMESTAMPS;
        }
        opts
    }

    /// Raw bytes with the integrity check value zeroed (the signed form).
    pub fn signing_bytes(&self) -> [u8; OSD_CDB_LEN] {
        let mut out = [0u8; OSD_CDB_LEN];
        out.copy_from_slice(self.as_bytes());
        out[ICV_OFFSET..ICV_OFFSET + OSD_CRYPTO_KEYID_SIZE].fill(0);
        out
    }
}
