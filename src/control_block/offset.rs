// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OSD offsets: 32-bit `[exponent:4 | mantissa:28]`, value =
//! `mantissa << (exponent + 8)`.

/// Marks an offset field as unused.
pub const OSD_OFFSET_UNUSED: u32 = 0xFFFF_FFFF;

const MANTISSA_BITS: u32 = 28;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;
const MIN_SHIFT: u32 = 8;
/// Exponent 0xF would collide with [`OSD_OFFSET_UNUSED`].
const MAX_EXPONENT: u32 = 0xE;

/// Encoded offset plus the zero bytes that must precede the segment so that
/// it really starts at the encoded position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedOffset {
    pub raw: u32,
    pub padding: usize,
}

/// Encode `offset`, rounding up to the coarsest representable step.
/// Returns `None` when the offset is beyond the encodable range.
pub fn encode_offset(offset: u64) -> Option<EncodedOffset> {
    if offset == 0 {
        return Some(EncodedOffset { raw: 0, padding: 0 });
    }

    for exponent in 0..=MAX_EXPONENT {
        let shift = exponent + MIN_SHIFT;
        let align = 1u64 << shift;
        let mut mantissa = offset >> shift;
        let rem = offset & (align - 1);
        if rem != 0 {
            mantissa += 1;
        }
        if mantissa <= MANTISSA_MASK as u64 {
            let padding = if rem != 0 { (align - rem) as usize } else { 0 };
            return Some(EncodedOffset {
                raw: (exponent << MANTISSA_BITS) | mantissa as u32,
                padding,
            });
        }
    }
    None
}

/// Decode an offset field; `None` for [`OSD_OFFSET_UNUSED`].
pub fn decode_offset(raw: u32) -> Option<u64> {
    if raw == OSD_OFFSET_UNUSED {
        return None;
    }
    let exponent = raw >> MANTISSA_BITS;
    let mantissa = (raw & MANTISSA_MASK) as u64;
    Some(mantissa << (exponent + MIN_SHIFT))
}
