// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    cfg::config::DeviceConfig, client::transport::OsdTransport,
    state_machine::request::OsdRequest,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRIES: u32 = 1;
/// Default upper bound of a single request-owned attribute segment.
pub const DEFAULT_MAX_ATTR_SEGMENT_BYTES: usize = 64 * 1024;

/// Limits applied to request-owned buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocPolicy {
    pub max_attr_segment_bytes: usize,
}

impl Default for AllocPolicy {
    fn default() -> Self {
        Self {
            max_attr_segment_bytes: DEFAULT_MAX_ATTR_SEGMENT_BYTES,
        }
    }
}

/// Handle on one OSD target reached through `transport`.
///
/// Cheap to clone and read-only once initialized; requests started from
/// clones share the transport.
#[derive(Debug, Clone)]
pub struct OsdDevice {
    transport: Arc<dyn OsdTransport>,
    def_timeout: Duration,
    def_retries: u32,
    policy: AllocPolicy,
}

impl OsdDevice {
    /// Device with default timeout, retries and allocation limits.
    pub fn new(transport: Arc<dyn OsdTransport>) -> Self {
        Self {
            transport,
            def_timeout: DEFAULT_TIMEOUT,
            def_retries: DEFAULT_RETRIES,
            policy: AllocPolicy::default(),
        }
    }

    pub fn init(transport: Arc<dyn OsdTransport>, cfg: &DeviceConfig) -> Self {
        let dev = Self {
            transport,
            def_timeout: cfg.default_timeout,
            def_retries: cfg.retries,
            policy: AllocPolicy {
                max_attr_segment_bytes: cfg.max_attr_segment_bytes,
            },
        };
        info!(
            timeout = ?dev.def_timeout,
            retries = dev.def_retries,
            max_attr_segment_bytes = dev.policy.max_attr_segment_bytes,
            "osd device initialized"
        );
        dev
    }

    pub fn fini(self) {
        debug!(
            handles = Arc::strong_count(&self.transport),
            "osd device released"
        );
    }

    #[inline]
    pub fn default_timeout(&self) -> Duration {
        self.def_timeout
    }

    #[inline]
    pub fn default_retries(&self) -> u32 {
        self.def_retries
    }

    #[inline]
    pub fn alloc_policy(&self) -> AllocPolicy {
        self.policy
    }

    /// Fresh request carrying this device's defaults.
    pub fn start_request(&self) -> OsdRequest {
        OsdRequest::new(
            Arc::clone(&self.transport),
            self.def_timeout,
            self.def_retries,
            self.policy,
        )
    }
}
