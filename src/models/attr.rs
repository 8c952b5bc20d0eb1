// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OSD attribute sub-protocol: list mode and page mode.
//!
//! List layout (all integers big-endian):
//!
//! ```text
//! header   : [0] type (low nibble) | [1] reserved | [2..4] list bytes
//! get elem : [0..4] page | [4..8] number
//! set elem : [0..4] page | [4..8] number | [8..10] length | value | pad to 8
//! ```
//!
//! A retrieved element with length `0xFFFF` names an undefined attribute.
//!
//! Page layout: `[0..4] page id | [4..8] page length | page bytes`.

use bytes::Bytes;

use crate::{
    error::{OsdError, Result},
    models::segment::OwnedSegment,
    utils::align_up,
};

/// List of attribute ids to retrieve.
pub const ATTR_LIST_GET: u8 = 0x01;
/// List of (id, value) elements, for set and for retrieved attributes.
pub const ATTR_LIST_SET_RETRIEVE: u8 = 0x09;

pub const ATTR_LIST_HEADER_LEN: usize = 4;
pub const ATTR_GET_ELEM_LEN: usize = 8;
pub const ATTR_ELEM_HEADER_LEN: usize = 10;
pub const ATTR_ELEM_ALIGN: usize = 8;
pub const ATTR_UNDEFINED_LEN: u16 = 0xFFFF;
/// Largest list a 16-bit length field can describe, header included.
pub const ATTR_LIST_MAX_BYTES: usize = ATTR_LIST_HEADER_LEN + u16::MAX as usize;

pub const ATTR_PAGE_HEADER_LEN: usize = 8;

/// User object information page.
pub const ATTR_PAGE_OBJECT_INFO: u32 = 0x1;
/// Logical length of a user object (8 bytes, big-endian), in
/// [`ATTR_PAGE_OBJECT_INFO`].
pub const ATTR_OI_LOGICAL_LENGTH: u32 = 0x82;

/// One attribute: `(page, number)` plus a value, or an expected length when
/// used in a get list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsdAttr {
    pub attr_page: u32,
    pub attr_id: u32,
    pub len: u16,
    pub val: Bytes,
}

impl OsdAttr {
    /// Attribute carrying a value (set lists, decoded results).
    pub fn new(attr_page: u32, attr_id: u32, val: impl Into<Bytes>) -> Self {
        let val = val.into();
        Self {
            attr_page,
            attr_id,
            len: val.len().min(u16::MAX as usize) as u16,
            val,
        }
    }

    /// Attribute to retrieve; `expected_len` sizes the receive buffer.
    pub fn request(attr_page: u32, attr_id: u32, expected_len: u16) -> Self {
        Self {
            attr_page,
            attr_id,
            len: expected_len,
            val: Bytes::new(),
        }
    }

    pub fn undefined(attr_page: u32, attr_id: u32) -> Self {
        Self {
            attr_page,
            attr_id,
            len: ATTR_UNDEFINED_LEN,
            val: Bytes::new(),
        }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.len != ATTR_UNDEFINED_LEN
    }

    #[inline]
    pub fn key(&self) -> (u32, u32) {
        (self.attr_page, self.attr_id)
    }

    /// Value as a big-endian u64 (e.g. logical length), if 8 bytes long.
    pub fn as_u64(&self) -> Option<u64> {
        let raw: [u8; 8] = self.val.as_ref().try_into().ok()?;
        Some(u64::from_be_bytes(raw))
    }
}

/// Bytes occupied by a set/retrieved element carrying `len` value bytes.
#[inline]
pub const fn attr_elem_size(len: usize) -> usize {
    align_up(ATTR_ELEM_HEADER_LEN + len, ATTR_ELEM_ALIGN)
}

/// Receive-buffer size needed to retrieve `attrs` in list mode.
pub fn retrieved_list_size(attrs: &[OsdAttr]) -> usize {
    ATTR_LIST_HEADER_LEN
        + attrs
            .iter()
            .map(|a| attr_elem_size(a.len as usize))
            .sum::<usize>()
}

fn encode_elem(attr: &OsdAttr, out: &mut Vec<u8>) -> Result<()> {
    if attr.val.len() >= ATTR_UNDEFINED_LEN as usize {
        return Err(OsdError::alloc(format!(
            "attribute {:#x}/{:#x}: {} value bytes do not fit a list element",
            attr.attr_page,
            attr.attr_id,
            attr.val.len()
        )));
    }
    let start = out.len();
    out.extend_from_slice(&attr.attr_page.to_be_bytes());
    out.extend_from_slice(&attr.attr_id.to_be_bytes());
    out.extend_from_slice(&(attr.val.len() as u16).to_be_bytes());
    out.extend_from_slice(&attr.val);
    out.resize(start + attr_elem_size(attr.val.len()), 0);
    Ok(())
}

/// Append `chunk` to a list segment, writing the header on first use and
/// refreshing the list length. All-or-nothing.
fn append_to_list(seg: &mut OwnedSegment, list_type: u8, body: Vec<u8>) -> Result<()> {
    let mut chunk = Vec::with_capacity(ATTR_LIST_HEADER_LEN + body.len());
    if seg.is_empty() {
        chunk.extend_from_slice(&[list_type, 0, 0, 0]);
    }
    chunk.extend_from_slice(&body);

    let total = seg.len() + chunk.len();
    if total > ATTR_LIST_MAX_BYTES {
        return Err(OsdError::alloc(format!(
            "attribute list of {total} bytes exceeds {ATTR_LIST_MAX_BYTES}"
        )));
    }
    seg.append(&chunk)?;
    seg.patch(2, &((total - ATTR_LIST_HEADER_LEN) as u16).to_be_bytes());
    Ok(())
}

/// Append `(page, number, value)` elements to a set list.
pub fn append_set_attr_list(seg: &mut OwnedSegment, attrs: &[OsdAttr]) -> Result<()> {
    let mut body = Vec::new();
    for a in attrs {
        encode_elem(a, &mut body)?;
    }
    append_to_list(seg, ATTR_LIST_SET_RETRIEVE, body)
}

/// Append `(page, number)` ids to a get list.
pub fn append_get_attr_list(seg: &mut OwnedSegment, attrs: &[OsdAttr]) -> Result<()> {
    let mut body = Vec::with_capacity(attrs.len() * ATTR_GET_ELEM_LEN);
    for a in attrs {
        body.extend_from_slice(&a.attr_page.to_be_bytes());
        body.extend_from_slice(&a.attr_id.to_be_bytes());
    }
    append_to_list(seg, ATTR_LIST_GET, body)
}

/// Encode a complete retrieved list, dropping elements that would not fit
/// into `max_bytes`.
pub fn encode_retrieved_attr_list(attrs: &[OsdAttr], max_bytes: usize) -> Vec<u8> {
    let mut out = vec![ATTR_LIST_SET_RETRIEVE, 0, 0, 0];
    if max_bytes < ATTR_LIST_HEADER_LEN {
        return Vec::new();
    }
    let limit = max_bytes.min(ATTR_LIST_MAX_BYTES);
    for a in attrs {
        let start = out.len();
        let value = if a.is_defined() { a.val.as_ref() } else { &[] };
        let size = attr_elem_size(value.len());
        if start + size > limit || value.len() >= ATTR_UNDEFINED_LEN as usize {
            break;
        }
        out.extend_from_slice(&a.attr_page.to_be_bytes());
        out.extend_from_slice(&a.attr_id.to_be_bytes());
        out.extend_from_slice(&a.len.to_be_bytes());
        out.extend_from_slice(value);
        out.resize(start + size, 0);
    }
    let list_bytes = (out.len() - ATTR_LIST_HEADER_LEN) as u16;
    out[2..4].copy_from_slice(&list_bytes.to_be_bytes());
    out
}

/// Decode a get list (ids only).
pub fn decode_get_attr_list(buf: &[u8]) -> Result<Vec<(u32, u32)>> {
    let body = list_body(buf, ATTR_LIST_GET)?;
    Ok(body
        .chunks_exact(ATTR_GET_ELEM_LEN)
        .map(|c| {
            (
                u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                u32::from_be_bytes([c[4], c[5], c[6], c[7]]),
            )
        })
        .collect())
}

/// Header check + body slice bounded by both the declared length and the
/// buffer.
fn list_body(buf: &[u8], expected_type: u8) -> Result<&[u8]> {
    if buf.len() < ATTR_LIST_HEADER_LEN {
        return Err(OsdError::malformed(format!(
            "attribute list needs a {ATTR_LIST_HEADER_LEN}-byte header, got {}",
            buf.len()
        )));
    }
    let list_type = buf[0] & 0x0F;
    if list_type != expected_type {
        return Err(OsdError::malformed(format!(
            "attribute list type {list_type:#x}, expected {expected_type:#x}"
        )));
    }
    let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let end = (ATTR_LIST_HEADER_LEN + declared).min(buf.len());
    Ok(&buf[ATTR_LIST_HEADER_LEN..end])
}

/// Position inside a retrieved attribute list, preserved by the caller
/// between successive decode calls.
#[derive(Debug, Clone, Default)]
pub struct AttrCursor {
    pos: usize,
    end: Option<usize>,
    done: bool,
}

impl AttrCursor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Decode up to `max` elements of a set/retrieved list, advancing `cursor`.
///
/// Returns an empty vector once the declared list length is exhausted.
pub fn decode_attr_list(
    buf: &[u8],
    cursor: &mut AttrCursor,
    max: usize,
) -> Result<Vec<OsdAttr>> {
    if cursor.done {
        return Ok(Vec::new());
    }
    let end = match cursor.end {
        Some(end) => end,
        None => {
            if buf.is_empty() {
                cursor.done = true;
                return Ok(Vec::new());
            }
            let body = list_body(buf, ATTR_LIST_SET_RETRIEVE)?;
            let end = ATTR_LIST_HEADER_LEN + body.len();
            cursor.pos = ATTR_LIST_HEADER_LEN;
            cursor.end = Some(end);
            end
        },
    };

    let mut out = Vec::new();
    while out.len() < max && cursor.pos + ATTR_ELEM_HEADER_LEN <= end {
        let p = cursor.pos;
        let attr_page = u32::from_be_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]]);
        let attr_id = u32::from_be_bytes([buf[p + 4], buf[p + 5], buf[p + 6], buf[p + 7]]);
        let len = u16::from_be_bytes([buf[p + 8], buf[p + 9]]);

        if len == ATTR_UNDEFINED_LEN {
            out.push(OsdAttr::undefined(attr_page, attr_id));
            cursor.pos = (p + attr_elem_size(0)).min(end);
            continue;
        }

        let val_start = p + ATTR_ELEM_HEADER_LEN;
        let val_end = val_start + len as usize;
        if val_end > end {
            cursor.done = true;
            return Err(OsdError::malformed(format!(
                "attribute {attr_page:#x}/{attr_id:#x} claims {len} bytes past the list end"
            )));
        }
        out.push(OsdAttr {
            attr_page,
            attr_id,
            len,
            val: Bytes::copy_from_slice(&buf[val_start..val_end]),
        });
        cursor.pos = (p + attr_elem_size(len as usize)).min(end);
    }

    if cursor.pos + ATTR_ELEM_HEADER_LEN > end {
        cursor.done = true;
    }
    Ok(out)
}

/// Decode every element of a set/retrieved list.
pub fn decode_attr_list_all(buf: &[u8]) -> Result<Vec<OsdAttr>> {
    let mut cursor = AttrCursor::new();
    decode_attr_list(buf, &mut cursor, usize::MAX)
}

/// A full attribute page as returned in page mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrPage<'a> {
    pub page_id: u32,
    /// Declared page length (may exceed `data.len()` when truncated).
    pub page_len: u32,
    pub data: &'a [u8],
}

impl AttrPage<'_> {
    #[inline]
    pub fn is_truncated(&self) -> bool {
        (self.data.len() as u64) < self.page_len as u64
    }
}

pub fn decode_attr_page(buf: &[u8]) -> Result<AttrPage<'_>> {
    if buf.len() < ATTR_PAGE_HEADER_LEN {
        return Err(OsdError::malformed(format!(
            "attribute page needs an {ATTR_PAGE_HEADER_LEN}-byte header, got {}",
            buf.len()
        )));
    }
    let page_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let page_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let end = ATTR_PAGE_HEADER_LEN.saturating_add(page_len as usize).min(buf.len());
    Ok(AttrPage {
        page_id,
        page_len,
        data: &buf[ATTR_PAGE_HEADER_LEN..end],
    })
}

pub fn encode_attr_page(page_id: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ATTR_PAGE_HEADER_LEN + data.len());
    out.extend_from_slice(&page_id.to_be_bytes());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}
