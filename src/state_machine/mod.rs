// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request lifecycle: `Built → Finalized → Executing → Completed → Released`.
//!
//! Each stage is its own type; the transition methods consume the previous
//! stage. A [`common::Lifecycle`] travels along and records the states.

/// Lifecycle states, attribute mode and the runtime tracker.
pub mod common;
/// Completed requests and their decoders.
pub mod completed;
/// Encoded requests: attribute segments and finalize.
pub mod encoded;
/// Finalized and pending requests: blocking and async execution.
pub mod execute;
/// Fresh requests and the encoding operations.
pub mod request;
