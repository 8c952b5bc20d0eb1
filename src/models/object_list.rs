// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::error::{OsdError, Result};

pub const OBJ_ID_LIST_HEADER_LEN: usize = 24;
pub const OBJ_ID_LEN: usize = 8;

/// Set in `root_lstchg` when the listing describes partitions.
pub const OBJ_ID_LIST_PAR: u8 = 0x01;
/// Set in `root_lstchg` when the list changed since the listing started.
pub const OBJ_ID_LIST_LSTCHG: u8 = 0x02;

/// Header of LIST / LIST COLLECTION parameter data.
#[repr(C)]
#[derive(Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ObjIdListHeader {
    /// Bytes following this field.
    pub list_bytes: U64<BigEndian>,
    pub continuation_id: U64<BigEndian>,
    pub list_identifier: U32<BigEndian>,
    pub pad: [u8; 3],
    pub root_lstchg: u8,
}

/// Where a listing starts. `initial_id` is exclusive: only ids above it are
/// returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListContinuation {
    pub initial_id: u64,
    pub list_identifier: u32,
}

impl ListContinuation {
    pub const fn start() -> Self {
        Self {
            initial_id: 0,
            list_identifier: 0,
        }
    }
}

/// Decoded object id list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectIdList {
    pub ids: Vec<u64>,
    /// 0 when the listing is complete, otherwise the id to resume after.
    pub continuation_id: u64,
    pub list_identifier: u32,
    pub list_changed: bool,
    pub partitions: bool,
}

impl ObjectIdList {
    /// Buffer size able to carry `nelem` ids.
    pub const fn buffer_for(nelem: usize) -> usize {
        OBJ_ID_LIST_HEADER_LEN + nelem * OBJ_ID_LEN
    }

    /// Number of ids a buffer of `len` bytes can carry.
    pub const fn capacity_of(len: usize) -> usize {
        len.saturating_sub(OBJ_ID_LIST_HEADER_LEN) / OBJ_ID_LEN
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (hdr, rest) = ObjIdListHeader::ref_from_prefix(buf).map_err(|_| {
            OsdError::malformed(format!(
                "object id list: need ≥ {OBJ_ID_LIST_HEADER_LEN} bytes, got {}",
                buf.len()
            ))
        })?;

        let declared = hdr
            .list_bytes
            .get()
            .saturating_sub((OBJ_ID_LIST_HEADER_LEN - 8) as u64);
        let nelem = (declared / OBJ_ID_LEN as u64).min((rest.len() / OBJ_ID_LEN) as u64);

        let ids = rest
            .chunks_exact(OBJ_ID_LEN)
            .take(nelem as usize)
            .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();

        Ok(Self {
            ids,
            continuation_id: hdr.continuation_id.get(),
            list_identifier: hdr.list_identifier.get(),
            list_changed: hdr.root_lstchg & OBJ_ID_LIST_LSTCHG != 0,
            partitions: hdr.root_lstchg & OBJ_ID_LIST_PAR != 0,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let hdr = ObjIdListHeader {
            list_bytes: U64::new(
                ((OBJ_ID_LIST_HEADER_LEN - 8) + self.ids.len() * OBJ_ID_LEN) as u64,
            ),
            continuation_id: U64::new(self.continuation_id),
            list_identifier: U32::new(self.list_identifier),
            pad: [0; 3],
            root_lstchg: (if self.list_changed { OBJ_ID_LIST_LSTCHG } else { 0 })
                | (if self.partitions { OBJ_ID_LIST_PAR } else { 0 }),
        };
        let mut out = Vec::with_capacity(Self::buffer_for(self.ids.len()));
        out.extend_from_slice(hdr.as_bytes());
        for id in &self.ids {
            out.extend_from_slice(&id.to_be_bytes());
        }
        out
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.continuation_id == 0
    }

    /// Continuation for the next call, `None` once the listing is complete.
    pub fn next_continuation(&self) -> Option<ListContinuation> {
        (!self.is_done()).then_some(ListContinuation {
            initial_id: self.continuation_id,
            list_identifier: self.list_identifier,
        })
    }
}
