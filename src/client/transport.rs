// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, time::Duration};

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    control_block::cdb::OsdCdb,
    error::TransportError,
    models::common::ScsiStatus,
};

/// A finalized, self-contained command handed to a transport.
#[derive(Debug, Clone)]
pub struct OsdCommand {
    pub cdb: OsdCdb,
    /// Scatter list, already in wire order (data, pads, attribute lists).
    pub data_out: Vec<Bytes>,
    pub data_out_len: usize,
    /// Bytes the initiator expects back (data, pad, attributes).
    pub data_in_len: usize,
    /// Advisory.
    pub timeout: Duration,
    /// Carried for the transport; the core never retries.
    pub retries: u32,
}

impl OsdCommand {
    /// Gather the data-out scatter list into one buffer.
    pub fn data_out_bytes(&self) -> Bytes {
        match self.data_out.as_slice() {
            [] => Bytes::new(),
            [one] => one.clone(),
            many => {
                let mut buf = BytesMut::with_capacity(self.data_out_len);
                for seg in many {
                    buf.extend_from_slice(seg);
                }
                buf.freeze()
            },
        }
    }
}

/// Raw completion reported by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub status: ScsiStatus,
    pub sense: Bytes,
    pub data_in: Bytes,
}

impl Completion {
    pub fn good(data_in: impl Into<Bytes>) -> Self {
        Self {
            status: ScsiStatus::Good,
            sense: Bytes::new(),
            data_in: data_in.into(),
        }
    }

    pub fn check_condition(sense: impl Into<Bytes>, data_in: impl Into<Bytes>) -> Self {
        Self {
            status: ScsiStatus::CheckCondition,
            sense: sense.into(),
            data_in: data_in.into(),
        }
    }
}

pub type CompletionResult = Result<Completion, TransportError>;

/// Delivers the completion of one asynchronously submitted command.
/// `complete` consumes the notifier, so it can fire only once; it may be
/// called from any thread.
pub struct CompletionNotifier {
    tx: oneshot::Sender<CompletionResult>,
}

impl CompletionNotifier {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<CompletionResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self, result: CompletionResult) {
        if self.tx.send(result).is_err() {
            debug!("completion dropped: request handle no longer waiting");
        }
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Command executor behind an [`crate::client::device::OsdDevice`].
pub trait OsdTransport: Send + Sync + fmt::Debug {
    /// Submit and block until the command completes.
    fn submit_blocking(&self, cmd: &OsdCommand) -> CompletionResult;

    /// Queue the command and return. `notifier` must be completed exactly
    /// once, from any thread. An `Err` means the command was not queued and
    /// the notifier has been dropped.
    fn submit_async(
        &self,
        cmd: OsdCommand,
        notifier: CompletionNotifier,
    ) -> Result<(), TransportError>;
}
