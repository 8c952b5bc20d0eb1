// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request integrity check value (ICV).
//!
//! ICV = HMAC-SHA1(key, CDB with zeroed ICV ‖ data-out integrity ‖ data-in
//! integrity). The integrity blocks carry the exact segment sizes so any
//! change of a data length invalidates the signature.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::{
    control_block::{
        cdb::{CDB_FMT_LIST, CDB_FMT_PAGE, OsdCdb},
        service_action::ServiceAction,
    },
    error::{OsdError, Result},
    models::common::OSD_CRYPTO_KEYID_SIZE,
    utils::generate_nonce,
};

type HmacSha1 = Hmac<Sha1>;

/// Sizes of the data-out segments covered by the signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataOutIntegrity {
    pub data_bytes: u64,
    pub set_attributes_bytes: u64,
    pub get_attributes_bytes: u64,
}

impl DataOutIntegrity {
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out[0..8].copy_from_slice(&self.data_bytes.to_be_bytes());
        out[8..16].copy_from_slice(&self.set_attributes_bytes.to_be_bytes());
        out[16..24].copy_from_slice(&self.get_attributes_bytes.to_be_bytes());
        out
    }
}

/// Sizes of the data-in segments covered by the signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataInIntegrity {
    pub data_bytes: u64,
    pub retrieved_attributes_bytes: u64,
}

impl DataInIntegrity {
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.data_bytes.to_be_bytes());
        out[8..16].copy_from_slice(&self.retrieved_attributes_bytes.to_be_bytes());
        out
    }
}

fn mac_for(
    key: &[u8],
    cdb: &OsdCdb,
    out: &DataOutIntegrity,
    inn: &DataInIntegrity,
) -> Result<HmacSha1> {
    if key.len() != OSD_CRYPTO_KEYID_SIZE {
        return Err(OsdError::SigningFailure(format!(
            "key must be {OSD_CRYPTO_KEYID_SIZE} bytes, got {}",
            key.len()
        )));
    }
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| OsdError::SigningFailure(e.to_string()))?;
    mac.update(&cdb.signing_bytes());
    mac.update(&out.to_bytes());
    mac.update(&inn.to_bytes());
    Ok(mac)
}

/// Compute the ICV over the current CDB contents.
pub fn compute_icv(
    key: &[u8],
    cdb: &OsdCdb,
    out: &DataOutIntegrity,
    inn: &DataInIntegrity,
) -> Result<[u8; OSD_CRYPTO_KEYID_SIZE]> {
    let tag = mac_for(key, cdb, out, inn)?.finalize().into_bytes();
    let mut icv = [0u8; OSD_CRYPTO_KEYID_SIZE];
    icv.copy_from_slice(&tag);
    Ok(icv)
}

/// Write a fresh nonce and the ICV into a CDB whose other fields are final.
pub fn sign_request(
    cdb: &mut OsdCdb,
    key: &[u8],
    out: &DataOutIntegrity,
    inn: &DataInIntegrity,
) -> Result<()> {
    cdb.nonce = generate_nonce();
    cdb.integrity_check_value = compute_icv(key, cdb, out, inn)?;
    Ok(())
}

/// Recompute the ICV of a received CDB and compare in constant time.
pub fn verify_request(
    cdb: &OsdCdb,
    key: &[u8],
    out: &DataOutIntegrity,
    inn: &DataInIntegrity,
) -> Result<bool> {
    Ok(mac_for(key, cdb, out, inn)?
        .verify_slice(&cdb.integrity_check_value)
        .is_ok())
}

/// Integrity sizes a target derives from a CDB alone.
pub fn expected_integrity(cdb: &OsdCdb) -> (DataOutIntegrity, DataInIntegrity) {
    let mut out = DataOutIntegrity::default();
    let mut inn = DataInIntegrity::default();

    match cdb.service_action() {
        Some(ServiceAction::Write) => out.data_bytes = cdb.length.get(),
        Some(ServiceAction::Read | ServiceAction::List | ServiceAction::ListCollection) => {
            inn.data_bytes = cdb.length.get();
        },
        _ => {},
    }

    match cdb.cdb_format() {
        CDB_FMT_LIST => {
            let p = cdb.attr_params.list();
            out.set_attributes_bytes = p.set_bytes as u64;
            out.get_attributes_bytes = p.get_desc_bytes as u64;
            inn.retrieved_attributes_bytes = p.get_alloc_length as u64;
        },
        CDB_FMT_PAGE => {
            let p = cdb.attr_params.page();
            out.set_attributes_bytes = p.set_length as u64;
            inn.retrieved_attributes_bytes = p.get_alloc_length as u64;
        },
        _ => {},
    }
    (out, inn)
}
