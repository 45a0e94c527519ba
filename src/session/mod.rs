// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! The device session: owner of the open input/output devices, their
//! registered buffers, and the output configuration.

use thiserror::Error;

use crate::{
    buffer::BufferPool,
    driver::{DeviceIndex, DriverError, InboundEventSender, MidiDriver},
};

mod input;
mod output;


pub use self::input::{DispatchOutcome, MidiMessageSink};

/// Number of buffers registered with the driver while an input device
/// is open. Bounds how many long messages can be in flight at once.
pub const INPUT_BUFFER_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The device index is outside the range enumerated by the driver.
    #[error("invalid MIDI device id: {0}")]
    InvalidDeviceId(DeviceIndex),
    #[error("failed to open MIDI device: {0}")]
    DeviceOpenFailed(DriverError),
    #[error("failed to close MIDI device: {0}")]
    DeviceCloseFailed(DriverError),
    /// Buffer registration failed while opening the input device. The
    /// whole open has been rolled back.
    #[error("failed to register sysex buffer: {0}")]
    BufferPrepareFailed(DriverError),
    #[error("failed to send MIDI message: {0}")]
    SendFailed(DriverError),
}

struct OpenInput<H> {
    device: DeviceIndex,
    handle: H,
}

struct OpenOutput<H> {
    device: DeviceIndex,
    handle: H,
}

/// Owns the MIDI devices of one bridging session.
///
/// At most one input and one output device are open at a time. A
/// device handle exists iff the corresponding device is selected;
/// exactly the buffers handed to the driver of an open input device
/// are prepared at any time.
///
/// All methods are meant to be called from a single control thread;
/// the driver delivers notifications through the event channel passed
/// to [`Self::new`], to be fed into
/// [`handle_event`](Self::handle_event) between calls.
#[allow(missing_debug_implementations)]
pub struct DeviceSession<D: MidiDriver> {
    driver: D,
    events: InboundEventSender,
    input: Option<OpenInput<D::Input>>,
    output: Option<OpenOutput<D::Output>>,
    pool: BufferPool,
    instrument: u8,
    transpose: i32,
}

impl<D: MidiDriver> DeviceSession<D> {
    #[must_use]
    pub fn new(driver: D, events: InboundEventSender) -> Self {
        Self {
            driver,
            events,
            input: None,
            output: None,
            pool: BufferPool::new(INPUT_BUFFER_COUNT),
            instrument: 0,
            transpose: 0,
        }
    }

    #[must_use]
    pub fn input_device(&self) -> Option<DeviceIndex> {
        self.input.as_ref().map(|open| open.device)
    }

    #[must_use]
    pub fn output_device(&self) -> Option<DeviceIndex> {
        self.output.as_ref().map(|open| open.device)
    }

    /// The instrument program applied to newly opened output devices.
    #[must_use]
    pub const fn instrument(&self) -> u8 {
        self.instrument
    }

    #[must_use]
    pub const fn transpose(&self) -> i32 {
        self.transpose
    }

    /// Sets the note offset applied by the outbound encoder. Pure
    /// state update, takes effect from the next message on.
    pub fn set_transpose(&mut self, transpose: i32) {
        self.transpose = transpose;
    }

    /// Number of buffers currently registered with the input driver.
    #[must_use]
    pub fn prepared_buffer_count(&self) -> usize {
        self.pool.prepared_count()
    }

    /// Display names of all input devices, index-aligned with the
    /// driver's device ids.
    ///
    /// A failed name lookup yields a placeholder embedding the error
    /// instead of failing the whole listing.
    #[must_use]
    pub fn input_device_names(&self) -> Vec<String> {
        (0..self.driver.input_device_count())
            .map(|index| device_name(self.driver.input_device_name(DeviceIndex(index))))
            .collect()
    }

    /// Display names of all output devices, index-aligned with the
    /// driver's device ids.
    #[must_use]
    pub fn output_device_names(&self) -> Vec<String> {
        (0..self.driver.output_device_count())
            .map(|index| device_name(self.driver.output_device_name(DeviceIndex(index))))
            .collect()
    }

    /// Opens an input device and starts streaming.
    ///
    /// Any previously open input device is closed first. All pool
    /// buffers are registered with the driver before streaming starts;
    /// when any step fails the partially opened device is rolled back
    /// and the failure returned. Inbound events begin arriving only
    /// after a successful return.
    pub fn open_input(&mut self, device: DeviceIndex) -> Result<(), SessionError> {
        if let Err(err) = self.close_input() {
            log::warn!("Closing the previous input device failed: {err}");
        }
        if device.0 >= self.driver.input_device_count() {
            return Err(SessionError::InvalidDeviceId(device));
        }
        let mut handle = self
            .driver
            .open_input(device, self.events.clone())
            .map_err(SessionError::DeviceOpenFailed)?;
        while let Some(buffer) = self.pool.take() {
            if let Err((buffer, err)) = self.driver.submit_input_buffer(&mut handle, buffer) {
                self.pool.restore(buffer);
                self.abort_open_input(handle);
                return Err(SessionError::BufferPrepareFailed(err));
            }
        }
        if let Err(err) = self.driver.start_input(&mut handle) {
            self.abort_open_input(handle);
            return Err(SessionError::DeviceOpenFailed(err));
        }
        log::debug!("Opened MIDI input device {device}");
        self.input = Some(OpenInput { device, handle });
        Ok(())
    }

    fn abort_open_input(&mut self, mut handle: D::Input) {
        for buffer in self.driver.reclaim_input_buffers(&mut handle) {
            self.pool.restore(buffer);
        }
        if let Err(err) = self.driver.close_input(handle) {
            log::warn!("Closing the partially opened input device failed: {err}");
        }
    }

    /// Closes the input device. Idempotent.
    ///
    /// Buffer reclamation is best-effort; only a failing close of the
    /// device itself is reported.
    pub fn close_input(&mut self) -> Result<(), SessionError> {
        let Some(OpenInput { device, mut handle }) = self.input.take() else {
            return Ok(());
        };
        for buffer in self.driver.reclaim_input_buffers(&mut handle) {
            self.pool.restore(buffer);
        }
        log::debug!("Closing MIDI input device {device}");
        self.driver
            .close_input(handle)
            .map_err(SessionError::DeviceCloseFailed)
    }

    /// Opens an output device and re-applies the configured instrument
    /// program, so the device state is consistent across switches.
    ///
    /// Any previously open output device is closed first.
    pub fn open_output(&mut self, device: DeviceIndex) -> Result<(), SessionError> {
        if let Err(err) = self.close_output() {
            log::warn!("Closing the previous output device failed: {err}");
        }
        if device.0 >= self.driver.output_device_count() {
            return Err(SessionError::InvalidDeviceId(device));
        }
        let handle = self
            .driver
            .open_output(device)
            .map_err(SessionError::DeviceOpenFailed)?;
        log::debug!("Opened MIDI output device {device}");
        self.output = Some(OpenOutput { device, handle });
        self.set_instrument(self.instrument)
    }

    /// Closes the output device. Idempotent.
    ///
    /// Sends the all-notes-off failsafe burst first (best-effort) so
    /// no notes keep sounding when the device is switched or closed
    /// mid-performance.
    pub fn close_output(&mut self) -> Result<(), SessionError> {
        let Some(OpenOutput { device, mut handle }) = self.output.take() else {
            return Ok(());
        };
        if let Err(err) = Self::burst_all_note_off(&mut self.driver, &mut handle) {
            log::warn!("All-notes-off failsafe failed: {err}");
        }
        log::debug!("Closing MIDI output device {device}");
        self.driver
            .close_output(handle)
            .map_err(SessionError::DeviceCloseFailed)
    }
}

impl<D: MidiDriver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close_input() {
            log::warn!("Closing the input device failed: {err}");
        }
        if let Err(err) = self.close_output() {
            log::warn!("Closing the output device failed: {err}");
        }
    }
}

fn device_name(looked_up: Result<String, DriverError>) -> String {
    looked_up.unwrap_or_else(|err| format!("(Error: {err})"))
}
