// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod capability;
pub mod signer;

use tracing::debug;

use crate::{
    control_block::cdb::OsdCdb,
    error::{OsdError, Result},
    models::common::OSD_CRYPTO_KEYID_SIZE,
    security::{
        capability::{Capability, SecurityMethod},
        signer::{DataInIntegrity, DataOutIntegrity, sign_request},
    },
};

/// How a finalized request is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// No key: NOSEC capability, zero ICV.
    NoSec,
    /// Nonce + HMAC-SHA1 ICV.
    CapKey,
}

/// Check caller credentials without touching any request state.
pub fn validate_credentials(cap: &[u8], key: Option<&[u8]>) -> Result<Capability> {
    let cap = Capability::from_slice(cap)?;
    match key {
        Some(key) if key.len() != OSD_CRYPTO_KEYID_SIZE => {
            return Err(OsdError::SigningFailure(format!(
                "key must be {OSD_CRYPTO_KEYID_SIZE} bytes, got {}",
                key.len()
            )));
        },
        _ => {},
    }
    Ok(cap)
}

/// Embed `cap` and, when a key is given, sign the CDB. Must run after every
/// other CDB field is frozen.
pub fn apply_security(
    cdb: &mut OsdCdb,
    mut cap: Capability,
    key: Option<&[u8]>,
    out: &DataOutIntegrity,
    inn: &DataInIntegrity,
) -> Result<SecurityMode> {
    match key {
        None => {
            cap.set_security_method(SecurityMethod::NoSec);
            cdb.capability = *cap.as_bytes();
            cdb.integrity_check_value = [0; OSD_CRYPTO_KEYID_SIZE];
            debug!(action = ?cdb.service_action(), "request left unsigned (NOSEC)");
            Ok(SecurityMode::NoSec)
        },
        Some(key) => {
            let stronger = cap
                .security_method()
                .is_some_and(|m| m > SecurityMethod::CapKey);
            if !stronger {
                cap.set_security_method(SecurityMethod::CapKey);
            }
            cdb.capability = *cap.as_bytes();
            sign_request(cdb, key, out, inn)?;
            debug!(action = ?cdb.service_action(), "request signed (CAPKEY)");
            Ok(SecurityMode::CapKey)
        },
    }
}
