//! This module holds the device handle, the transport seam and an in-memory
//! target.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Device handle: defaults, allocation limits and request creation.
pub mod device;
/// In-memory OSD target implementing the transport trait.
pub mod loopback;
/// Commands, completions and the transport trait.
pub mod transport;
