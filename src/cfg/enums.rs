// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::control_block::cdb::ReqOptions;

/// Request option enumeration with string serialization support
///
/// Each value maps onto one [`ReqOptions`] bit applied at finalize.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RequestOption {
    #[serde(rename = "FUA", alias = "fua", alias = "Fua")]
    Fua,
    #[serde(rename = "DPO", alias = "dpo", alias = "Dpo")]
    Dpo,
    #[serde(
        rename = "BypassTimestamps",
        alias = "bypass_timestamps",
        alias = "BYPASS_TIMESTAMPS"
    )]
    BypassTimestamps,
}

impl fmt::Display for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestOption::Fua => "FUA",
            RequestOption::Dpo => "DPO",
            RequestOption::BypassTimestamps => "BypassTimestamps",
        })
    }
}

impl From<RequestOption> for ReqOptions {
    fn from(o: RequestOption) -> Self {
        match o {
            RequestOption::Fua => ReqOptions::FUA,
            RequestOption::Dpo => ReqOptions::DPO,
            RequestOption::BypassTimestamps => ReqOptions::BYPASS_TIMESTAMPS,
        }
    }
}
