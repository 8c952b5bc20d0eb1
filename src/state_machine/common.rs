// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use crate::{
    control_block::cdb::{CDB_FMT_LIST, CDB_FMT_PAGE},
    error::{OsdError, Result},
};

/// Lifecycle states of one OSD request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Built,
    Finalized,
    Executing,
    Completed,
    Released,
}

impl RequestState {
    /// The only state that may follow `self`.
    pub fn successor(self) -> Option<Self> {
        use RequestState::*;
        match self {
            Built => Some(Finalized),
            Finalized => Some(Executing),
            Executing => Some(Completed),
            Completed => Some(Released),
            Released => None,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestState::Built => "Built",
            RequestState::Finalized => "Finalized",
            RequestState::Executing => "Executing",
            RequestState::Completed => "Completed",
            RequestState::Released => "Released",
        })
    }
}

/// Which attribute sub-protocol a request uses. Fixed by the first
/// attribute call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AttributesMode {
    #[default]
    None,
    List,
    Page,
}

impl AttributesMode {
    /// GET/SET CDBFMT value written at finalize. Requests without
    /// attributes use the list format with empty parameters.
    pub fn cdb_format(self) -> u8 {
        match self {
            AttributesMode::None | AttributesMode::List => CDB_FMT_LIST,
            AttributesMode::Page => CDB_FMT_PAGE,
        }
    }

    /// Fix the mode to `requested`, or report the conflict.
    pub(crate) fn check(self, requested: AttributesMode) -> Result<()> {
        match self {
            AttributesMode::None => Ok(()),
            active if active == requested => Ok(()),
            active => Err(OsdError::ModeConflict { active, requested }),
        }
    }
}

impl fmt::Display for AttributesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributesMode::None => "none",
            AttributesMode::List => "list mode",
            AttributesMode::Page => "page mode",
        })
    }
}

/// Runtime record of the states a request went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    history: Vec<RequestState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![RequestState::Built],
        }
    }

    pub fn state(&self) -> RequestState {
        self.history
            .last()
            .copied()
            .unwrap_or(RequestState::Built)
    }

    /// Move to `next`, which must be the immediate successor.
    pub fn advance(&mut self, next: RequestState) -> Result<()> {
        let current = self.state();
        if current.successor() != Some(next) {
            return Err(OsdError::sequence(format!(
                "cannot move from {current} to {next}"
            )));
        }
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub(crate) fn into_history(self) -> Vec<RequestState> {
        self.history
    }
}
