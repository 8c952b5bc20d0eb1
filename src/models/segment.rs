// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One reusable byte-segment type for the set-attr, get-attr-descriptor and
//! get-attr buffers of a request.

use bytes::{Bytes, BytesMut};

use crate::error::{OsdError, Result};

/// Who frees the buffer of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Allocated by the request, dropped on release.
    Request,
    /// Supplied by the caller, handed back on release.
    Caller,
}

/// Buffer + capacity + logical length + ownership flag.
///
/// Outbound segments grow through [`OwnedSegment::append`] and their logical
/// length equals the buffer length. Inbound segments are sized up front and
/// the logical length records how many bytes the target actually returned.
#[derive(Debug)]
pub struct OwnedSegment {
    buf: Vec<u8>,
    total_bytes: usize,
    limit: usize,
    ownership: Ownership,
}

impl OwnedSegment {
    /// Empty request-owned segment that may grow up to `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            total_bytes: 0,
            limit,
            ownership: Ownership::Request,
        }
    }

    /// Request-owned inbound segment of `len` zero bytes.
    pub fn zeroed(len: usize, limit: usize) -> Result<Self> {
        if len > limit {
            return Err(OsdError::alloc(format!(
                "segment of {len} bytes exceeds the {limit}-byte limit"
            )));
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|e| OsdError::alloc(e.to_string()))?;
        buf.resize(len, 0);
        Ok(Self {
            buf,
            total_bytes: 0,
            limit,
            ownership: Ownership::Request,
        })
    }

    /// Attach a caller buffer; its length is the capacity of the segment.
    pub fn caller(buf: BytesMut) -> Self {
        let buf = Vec::from(buf);
        let limit = buf.len();
        Self {
            buf,
            total_bytes: 0,
            limit,
            ownership: Ownership::Caller,
        }
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Logical length.
    #[inline]
    pub fn len(&self) -> usize {
        self.total_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Bytes available to an inbound transfer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The logically valid bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.total_bytes]
    }

    /// Append bytes to an outbound, request-owned segment.
    ///
    /// Either all of `bytes` is appended or the segment is left untouched.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.ownership == Ownership::Caller {
            return Err(OsdError::sequence("cannot append to a caller-owned segment"));
        }
        let new_len = self
            .buf
            .len()
            .checked_add(bytes.len())
            .ok_or_else(|| OsdError::alloc("segment length overflow"))?;
        if new_len > self.limit {
            return Err(OsdError::alloc(format!(
                "segment would grow to {new_len} bytes, limit is {}",
                self.limit
            )));
        }
        self.buf
            .try_reserve(bytes.len())
            .map_err(|e| OsdError::alloc(e.to_string()))?;
        self.buf.extend_from_slice(bytes);
        self.total_bytes = self.buf.len();
        Ok(())
    }

    /// Overwrite already appended bytes (list headers).
    pub(crate) fn patch(&mut self, at: usize, bytes: &[u8]) {
        if let Some(dst) = self.buf.get_mut(at..at + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    }

    /// Copy inbound bytes into the segment, bounded by its capacity.
    /// Returns the number of bytes stored.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.buf.len());
        self.buf[..n].copy_from_slice(&src[..n]);
        self.total_bytes = n;
        n
    }

    /// Freeze an outbound segment into a data-out scatter entry.
    pub(crate) fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }

    /// Release: request-owned memory is dropped, caller memory is returned.
    pub fn release(self) -> Option<BytesMut> {
        match self.ownership {
            Ownership::Caller => Some(BytesMut::from(Bytes::from(self.buf))),
            Ownership::Request => None,
        }
    }
}

/// Zero-filled pad used to align the next data segment.
pub(crate) fn pad_segment(len: usize) -> Result<Bytes> {
    let mut pad = Vec::new();
    pad.try_reserve_exact(len)
        .map_err(|e| OsdError::alloc(e.to_string()))?;
    pad.resize(len, 0);
    Ok(Bytes::from(pad))
}
