// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::RequestOption,
    client::device::{DEFAULT_MAX_ATTR_SEGMENT_BYTES, DEFAULT_RETRIES, DEFAULT_TIMEOUT},
    control_block::cdb::ReqOptions,
    models::{
        attr::ATTR_LIST_HEADER_LEN,
        common::{OSD_CAP_LEN, OSD_CRYPTO_KEYID_SIZE},
    },
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Defaults applied to every request started from the device.
    pub device: DeviceConfig,
    /// Options applied at finalize.
    #[serde(default)]
    pub request: RequestConfig,
    /// Credentials used to sign requests.
    pub security: SecurityConfig,
}

/// Device-wide defaults.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "DefaultTimeout", with = "serde_secs")]
    /// Advisory per-command timeout handed to the transport.
    pub default_timeout: Duration,

    #[serde(rename = "Retries")]
    /// Retry count handed to the transport.
    pub retries: u32,

    #[serde(
        rename = "MaxAttrSegmentBytes",
        default = "default_max_attr_segment_bytes"
    )]
    /// Upper bound of a request-owned attribute segment.
    pub max_attr_segment_bytes: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            max_attr_segment_bytes: DEFAULT_MAX_ATTR_SEGMENT_BYTES,
        }
    }
}

fn default_max_attr_segment_bytes() -> usize {
    DEFAULT_MAX_ATTR_SEGMENT_BYTES
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
/// Request options (FUA / DPO / timestamp bypass).
pub struct RequestConfig {
    #[serde(default, rename = "Options")]
    pub options: Vec<RequestOption>,
}

impl RequestConfig {
    pub fn req_options(&self) -> ReqOptions {
        self.options
            .iter()
            .fold(ReqOptions::empty(), |acc, o| acc | ReqOptions::from(*o))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Capability and optional signing key, both hex encoded.
pub struct SecurityConfig {
    #[serde(rename = "Capability", with = "hex::serde")]
    /// 80-byte capability embedded in every CDB.
    pub capability: Vec<u8>,

    #[serde(default, rename = "Key", with = "serde_hex_opt")]
    /// 20-byte capability key. Requests go out NOSEC without one.
    pub key: Option<Vec<u8>>,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.security.capability.len() == OSD_CAP_LEN,
            "Capability must be {OSD_CAP_LEN} bytes, got {}",
            self.security.capability.len()
        );
        if let Some(key) = &self.security.key {
            ensure!(
                key.len() == OSD_CRYPTO_KEYID_SIZE,
                "Key must be {OSD_CRYPTO_KEYID_SIZE} bytes, got {}",
                key.len()
            );
        }

        // A retrieved list needs room for its header at least.
        ensure!(
            self.device.max_attr_segment_bytes > ATTR_LIST_HEADER_LEN,
            "MaxAttrSegmentBytes must be > {ATTR_LIST_HEADER_LEN}"
        );

        // Duplicate options are harmless; keep one of each.
        self.request.options.sort_unstable();
        self.request.options.dedup();

        Ok(())
    }

    /// Signing key as a slice, as `finalize` expects it.
    pub fn key(&self) -> Option<&[u8]> {
        self.security.key.as_deref()
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helpers for an optional hex string.
mod serde_hex_opt {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s.trim()).map_err(D::Error::custom))
            .transpose()
    }
}
