//! This module defines the data structures exchanged with an OSD target.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Attribute lists and pages.
pub mod attr;
/// Identifiers, sizes and the SCSI status byte.
pub mod common;
/// Object id lists returned by LIST and LIST COLLECTION.
pub mod object_list;
/// Growable segments with caller or request ownership.
pub mod segment;
/// Sense data decoding and error classification.
pub mod sense_data;
