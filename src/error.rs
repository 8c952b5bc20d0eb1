// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed errors returned by every OSD request operation.

use thiserror::Error;

use crate::{
    models::{common::ScsiStatus, sense_data::OsdSenseInfo},
    state_machine::common::AttributesMode,
};

/// Submission-level failure reported by a transport. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OsdError {
    /// A lifecycle call was made in the wrong state.
    #[error("invalid request sequence: {0}")]
    InvalidSequence(String),

    /// List-mode and page-mode attribute calls were mixed on one request.
    #[error("attribute mode conflict: {requested} requested while {active} is active")]
    ModeConflict {
        active: AttributesMode,
        requested: AttributesMode,
    },

    /// A reserved service action without a wire encoding was invoked.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Capability or key rejected before signing.
    #[error("signing failure: {0}")]
    SigningFailure(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The target completed the command with a non-GOOD status.
    #[error("target error: status={status:?}, {sense}")]
    Target {
        status: ScsiStatus,
        sense: Box<OsdSenseInfo>,
    },

    /// A buffer returned by the target does not parse.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl OsdError {
    pub(crate) fn sequence(msg: impl Into<String>) -> Self {
        Self::InvalidSequence(msg.into())
    }

    pub(crate) fn alloc(msg: impl Into<String>) -> Self {
        Self::AllocationFailure(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}

pub type Result<T, E = OsdError> = std::result::Result<T, E>;
