//! This module builds the OSDv1 command descriptor block for every service
//! action.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// GET / SET ATTRIBUTES and the reserved service actions.
pub mod attributes;
/// CDB layout, options and attribute parameter views.
pub mod cdb;
/// Collection-level commands.
pub mod collection;
/// Device-level commands (root object).
pub mod device;
/// User object commands.
pub mod object;
/// OSD offset encoding.
pub mod offset;
/// Partition-level commands.
pub mod partition;
/// Service action codes.
pub mod service_action;
