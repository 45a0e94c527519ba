// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! The seam between the session and the OS multimedia driver.

use std::{borrow::Cow, sync::mpsc::Sender};

use derive_more::{Display, From};
use thiserror::Error;

use crate::{buffer::SysexBuffer, message::PackedShortMessage};

#[cfg(test)]
pub(crate) mod fake;

#[cfg(feature = "midir")]
pub(crate) mod midir;

/// Zero-based index of a MIDI device as enumerated by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, From)]
pub struct DeviceIndex(pub usize);

/// Failure reported by the underlying multimedia driver.
///
/// Backends that expose numeric driver status codes attach them;
/// others report message-only errors.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{msg} (driver status {code})")]
    Status { code: u32, msg: Cow<'static, str> },
    #[error("{msg}")]
    Other { msg: Cow<'static, str> },
}

impl DriverError {
    pub fn status(code: u32, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Status {
            code,
            msg: msg.into(),
        }
    }

    pub fn other(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Other { msg: msg.into() }
    }

    #[must_use]
    pub const fn code(&self) -> Option<u32> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Other { .. } => None,
        }
    }
}

/// Notification demultiplexed from the input driver's callback stream.
#[derive(Debug)]
pub enum InboundEvent {
    /// The input device finished opening. Bookkeeping only.
    DeviceOpened,
    /// The input device vanished or was closed from outside. Fatal for
    /// the session.
    DeviceClosed,
    /// A complete 1–3 byte message.
    ShortData(PackedShortMessage),
    /// A long message delivered through a pool buffer. The buffer must
    /// be re-submitted after its payload has been copied out.
    LongData(SysexBuffer),
    /// A malformed short message reported by the driver.
    ShortError(PackedShortMessage),
    /// A malformed long message. The buffer still needs re-submission.
    LongError(SysexBuffer),
}

/// Producer half of the single-consumer channel that bridges driver
/// notifications back onto the control thread.
pub type InboundEventSender = Sender<InboundEvent>;

/// Low-level interface to the multimedia driver.
///
/// All methods block until the driver has accepted or rejected the
/// call. Input notifications are delivered asynchronously through the
/// sender passed to [`Self::open_input`], from a context the
/// application does not control; implementations must never require
/// the consumer to react inside that context.
pub trait MidiDriver {
    /// Handle of an open input device.
    type Input;
    /// Handle of an open output device.
    type Output;

    fn input_device_count(&self) -> usize;
    fn output_device_count(&self) -> usize;

    fn input_device_name(&self, device: DeviceIndex) -> Result<String, DriverError>;
    fn output_device_name(&self, device: DeviceIndex) -> Result<String, DriverError>;

    /// Opens an input device in notification mode.
    ///
    /// No data events may be delivered before [`Self::start_input`]
    /// succeeds.
    fn open_input(
        &mut self,
        device: DeviceIndex,
        events: InboundEventSender,
    ) -> Result<Self::Input, DriverError>;

    /// Registers a buffer with the driver and hands it over for
    /// receiving long messages.
    ///
    /// On failure the rejected buffer travels back to the caller.
    fn submit_input_buffer(
        &mut self,
        input: &mut Self::Input,
        buffer: SysexBuffer,
    ) -> Result<(), (SysexBuffer, DriverError)>;

    /// Starts input streaming.
    fn start_input(&mut self, input: &mut Self::Input) -> Result<(), DriverError>;

    /// Deregisters and returns every buffer still held by the driver.
    ///
    /// Best-effort per buffer: a failing deregistration is logged by
    /// the implementation and must not keep the remaining buffers from
    /// being reclaimed. Buffers riding in undispatched events are not
    /// included; they return through the event channel.
    fn reclaim_input_buffers(&mut self, input: &mut Self::Input) -> Vec<SysexBuffer>;

    /// Closes the input device. The handle is consumed even when the
    /// driver reports a failure.
    fn close_input(&mut self, input: Self::Input) -> Result<(), DriverError>;

    fn open_output(&mut self, device: DeviceIndex) -> Result<Self::Output, DriverError>;

    /// Closes the output device. The handle is consumed even when the
    /// driver reports a failure.
    fn close_output(&mut self, output: Self::Output) -> Result<(), DriverError>;

    /// Sends a packed 1–3 byte message.
    fn send_short(
        &mut self,
        output: &mut Self::Output,
        message: PackedShortMessage,
    ) -> Result<(), DriverError>;

    /// Registers a scratch buffer with the driver for one long send.
    fn prepare_output_buffer(
        &mut self,
        output: &mut Self::Output,
        buffer: &mut SysexBuffer,
    ) -> Result<(), DriverError>;

    /// Transmits the recorded payload of a prepared buffer, blocking
    /// until the driver confirms submission.
    fn send_long(
        &mut self,
        output: &mut Self::Output,
        buffer: &SysexBuffer,
    ) -> Result<(), DriverError>;

    /// Deregisters a previously prepared output buffer. Best-effort.
    fn unprepare_output_buffer(&mut self, output: &mut Self::Output, buffer: &mut SysexBuffer);
}
