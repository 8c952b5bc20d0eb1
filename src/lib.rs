//! This crate provides an initiator-side implementation of the T10 OSD
//! (object-based storage device) command set.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, config path resolution, and logging.
pub mod cfg;
/// Device handle, transport seam and the in-memory target.
pub mod client;
/// Builds OSD command descriptor blocks.
pub mod control_block;
/// Library error types.
pub mod error;
/// Defines attribute, listing, segment and sense data structures.
pub mod models;
/// Capabilities and request signing.
pub mod security;
/// Contains the request lifecycle, from encoding to release.
pub mod state_machine;
/// Provides utility functions used throughout the crate.
pub mod utils;
