// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! Fixed-size buffers registered with the driver for long messages.

use std::fmt;

use derive_more::{Display, From};

use crate::message::SYSEX_BUFFER_SIZE;


/// Identifies a buffer within its pool, for diagnostics only.
///
/// Transient buffers allocated outside the pool share a single
/// reserved id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From)]
pub struct BufferId(usize);

impl BufferId {
    pub const TRANSIENT: Self = Self(usize::MAX);
}

/// A fixed 512-byte region plus its driver-visible bookkeeping.
///
/// While handed to the driver a buffer counts as "prepared" and is
/// owned by the driver; it only travels back to the session inside a
/// long-data event and is re-submitted once its payload has been
/// copied out. Buffers are recycled for the lifetime of the session,
/// never deallocated while the input device is open.
pub struct SysexBuffer {
    id: BufferId,
    data: Box<[u8; SYSEX_BUFFER_SIZE]>,
    bytes_recorded: usize,
    prepared: bool,
}

impl fmt::Debug for SysexBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysexBuffer")
            .field("id", &self.id)
            .field("bytes_recorded", &self.bytes_recorded)
            .field("prepared", &self.prepared)
            .finish_non_exhaustive()
    }
}

impl SysexBuffer {
    fn new(id: BufferId) -> Self {
        Self {
            id,
            data: Box::new([0; SYSEX_BUFFER_SIZE]),
            bytes_recorded: 0,
            prepared: false,
        }
    }

    /// Allocates a buffer outside any pool, for a single long send.
    #[must_use]
    pub fn transient() -> Self {
        Self::new(BufferId::TRANSIENT)
    }

    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// The payload recorded by the driver or by [`Self::record`].
    #[must_use]
    pub fn recorded(&self) -> &[u8] {
        &self.data[..self.bytes_recorded]
    }

    /// Copies a payload into the buffer and records its byte count.
    ///
    /// The payload must not exceed [`SYSEX_BUFFER_SIZE`]; excess bytes
    /// are discarded.
    pub fn record(&mut self, payload: &[u8]) {
        debug_assert!(payload.len() <= SYSEX_BUFFER_SIZE);
        let len = payload.len().min(SYSEX_BUFFER_SIZE);
        self.data[..len].copy_from_slice(&payload[..len]);
        self.bytes_recorded = len;
    }

    pub fn clear(&mut self) {
        self.bytes_recorded = 0;
    }

    /// Whether the buffer is currently registered with the driver.
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Toggles the registration state. Intended for driver
    /// implementations only.
    pub fn mark_prepared(&mut self, prepared: bool) {
        self.prepared = prepared;
    }
}

/// The session's supply of input buffers.
///
/// Buffers leave the pool when submitted to the driver and return on
/// close or after a failed re-submission. Everything that is not idle
/// counts as prepared.
#[derive(Debug)]
pub struct BufferPool {
    idle: Vec<SysexBuffer>,
    total: usize,
}

impl BufferPool {
    #[must_use]
    pub fn new(total: usize) -> Self {
        let idle = (0..total).map(|id| SysexBuffer::new(id.into())).collect();
        Self { idle, total }
    }

    /// Takes an idle buffer out of the pool for submission.
    pub fn take(&mut self) -> Option<SysexBuffer> {
        self.idle.pop()
    }

    /// Returns a buffer to the idle set, clearing its payload.
    pub fn restore(&mut self, mut buffer: SysexBuffer) {
        debug_assert!(self.idle.len() < self.total);
        buffer.clear();
        buffer.mark_prepared(false);
        self.idle.push(buffer);
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Number of buffers currently handed out, i.e. registered with
    /// the driver or riding in a not-yet-dispatched event.
    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.total - self.idle.len()
    }
}
