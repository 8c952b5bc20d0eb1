// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

use crate::models::common::OSD_CRYPTO_NONCE_SIZE;

/// Number of leading nonce bytes holding the millisecond timestamp.
const NONCE_TIMESTAMP_LEN: usize = 6;

/// Generates a request nonce:
/// - bytes 0..6  : low 48 bits of the current UNIX time in milliseconds (BE)
/// - bytes 6..12 : random
pub fn generate_nonce() -> [u8; OSD_CRYPTO_NONCE_SIZE] {
    let mut nonce = [0u8; OSD_CRYPTO_NONCE_SIZE];

    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    nonce[..NONCE_TIMESTAMP_LEN].copy_from_slice(&millis.to_be_bytes()[2..]);

    rand::rng().fill(&mut nonce[NONCE_TIMESTAMP_LEN..]);

    nonce
}

/// Rounds `v` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}
