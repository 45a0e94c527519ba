// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! Driver backend on top of [`midir`].
//!
//! `midir` delivers input callbacks on a thread the application does
//! not control. The backend therefore never touches session state:
//! every notification is bridged into the session's event channel and
//! handled on the control thread.
//!
//! `midir` reports neither malformed-message notifications nor
//! unsolicited device closure, so [`InboundEvent::ShortError`],
//! [`InboundEvent::LongError`], and [`InboundEvent::DeviceClosed`]
//! never originate here.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use super::{DeviceIndex, DriverError, InboundEvent, InboundEventSender, MidiDriver};
use crate::{
    buffer::SysexBuffer,
    message::{short_message_len, PackedShortMessage, SYSEX_BUFFER_SIZE},
};

const CLIENT_NAME: &str = "gamio";

/// Buffers handed over for long-message reception, shared between the
/// control thread and the driver-owned callback.
type SubmittedBuffers = Arc<Mutex<VecDeque<SysexBuffer>>>;

struct InputContext {
    events: InboundEventSender,
    submitted: SubmittedBuffers,
    started: Arc<AtomicBool>,
}

/// Open input session driven by `midir`.
#[allow(missing_debug_implementations)]
pub struct MidirInput {
    connection: MidiInputConnection<InputContext>,
    submitted: SubmittedBuffers,
    started: Arc<AtomicBool>,
}

/// Open output session driven by `midir`.
#[allow(missing_debug_implementations)]
pub struct MidirOutput {
    connection: MidiOutputConnection,
}

/// [`MidiDriver`] implementation on top of `midir`.
///
/// Keeps a pair of client instances alive for device enumeration;
/// each open creates a fresh client for the connection itself.
#[allow(missing_debug_implementations)]
pub struct MidirDriver {
    watch_input: MidiInput,
    watch_output: MidiOutput,
}

impl MidirDriver {
    pub fn new() -> Result<Self, DriverError> {
        let mut watch_input =
            MidiInput::new(CLIENT_NAME).map_err(|err| DriverError::other(err.to_string()))?;
        watch_input.ignore(Ignore::None);
        let watch_output =
            MidiOutput::new(CLIENT_NAME).map_err(|err| DriverError::other(err.to_string()))?;
        Ok(Self {
            watch_input,
            watch_output,
        })
    }
}

fn forward_raw_input(bytes: &[u8], context: &InputContext) {
    if !context.started.load(Ordering::Acquire) {
        log::trace!("Dropping MIDI input received before start: {bytes:02x?}");
        return;
    }
    let event = match *bytes {
        [] => return,
        [status] => InboundEvent::ShortData(PackedShortMessage::new(status, 0, 0)),
        [status, data1] => InboundEvent::ShortData(PackedShortMessage::new(status, data1, 0)),
        [status, data1, data2] => {
            InboundEvent::ShortData(PackedShortMessage::new(status, data1, data2))
        }
        _ => {
            let Ok(mut submitted) = context.submitted.lock() else {
                return;
            };
            let Some(mut buffer) = submitted.pop_front() else {
                log::warn!(
                    "No sysex buffer registered, dropping {len} byte message",
                    len = bytes.len()
                );
                return;
            };
            drop(submitted);
            if bytes.len() > SYSEX_BUFFER_SIZE {
                log::warn!(
                    "Truncating {len} byte message to the {SYSEX_BUFFER_SIZE} byte buffer capacity",
                    len = bytes.len()
                );
            }
            buffer.record(&bytes[..bytes.len().min(SYSEX_BUFFER_SIZE)]);
            InboundEvent::LongData(buffer)
        }
    };
    if context.events.send(event).is_err() {
        log::trace!("Dropping MIDI input: event receiver is gone");
    }
}

impl MidiDriver for MidirDriver {
    type Input = MidirInput;
    type Output = MidirOutput;

    fn input_device_count(&self) -> usize {
        self.watch_input.port_count()
    }

    fn output_device_count(&self) -> usize {
        self.watch_output.port_count()
    }

    fn input_device_name(&self, device: DeviceIndex) -> Result<String, DriverError> {
        let ports = self.watch_input.ports();
        let port = ports
            .get(device.0)
            .ok_or_else(|| DriverError::other(format!("no input device {device}")))?;
        self.watch_input
            .port_name(port)
            .map_err(|err| DriverError::other(err.to_string()))
    }

    fn output_device_name(&self, device: DeviceIndex) -> Result<String, DriverError> {
        let ports = self.watch_output.ports();
        let port = ports
            .get(device.0)
            .ok_or_else(|| DriverError::other(format!("no output device {device}")))?;
        self.watch_output
            .port_name(port)
            .map_err(|err| DriverError::other(err.to_string()))
    }

    fn open_input(
        &mut self,
        device: DeviceIndex,
        events: InboundEventSender,
    ) -> Result<Self::Input, DriverError> {
        let mut input =
            MidiInput::new(CLIENT_NAME).map_err(|err| DriverError::other(err.to_string()))?;
        input.ignore(Ignore::None);
        let ports = input.ports();
        let port = ports
            .get(device.0)
            .ok_or_else(|| DriverError::other(format!("input device {device} disappeared")))?;
        let submitted = SubmittedBuffers::default();
        let started = Arc::new(AtomicBool::new(false));
        let context = InputContext {
            events: events.clone(),
            submitted: Arc::clone(&submitted),
            started: Arc::clone(&started),
        };
        let connection = input
            .connect(
                port,
                CLIENT_NAME,
                |_stamp, bytes, context| forward_raw_input(bytes, context),
                context,
            )
            .map_err(|err| DriverError::other(err.to_string()))?;
        if events.send(InboundEvent::DeviceOpened).is_err() {
            log::trace!("Event receiver is gone already");
        }
        Ok(MidirInput {
            connection,
            submitted,
            started,
        })
    }

    fn submit_input_buffer(
        &mut self,
        input: &mut Self::Input,
        mut buffer: SysexBuffer,
    ) -> Result<(), (SysexBuffer, DriverError)> {
        let Ok(mut submitted) = input.submitted.lock() else {
            return Err((buffer, DriverError::other("input callback panicked")));
        };
        buffer.mark_prepared(true);
        submitted.push_back(buffer);
        Ok(())
    }

    fn start_input(&mut self, input: &mut Self::Input) -> Result<(), DriverError> {
        input.started.store(true, Ordering::Release);
        Ok(())
    }

    fn reclaim_input_buffers(&mut self, input: &mut Self::Input) -> Vec<SysexBuffer> {
        input.started.store(false, Ordering::Release);
        let Ok(mut submitted) = input.submitted.lock() else {
            log::warn!("Cannot reclaim sysex buffers: input callback panicked");
            return Vec::new();
        };
        submitted.drain(..).collect()
    }

    fn close_input(&mut self, input: Self::Input) -> Result<(), DriverError> {
        let MidirInput { connection, .. } = input;
        connection.close();
        Ok(())
    }

    fn open_output(&mut self, device: DeviceIndex) -> Result<Self::Output, DriverError> {
        let output =
            MidiOutput::new(CLIENT_NAME).map_err(|err| DriverError::other(err.to_string()))?;
        let ports = output.ports();
        let port = ports
            .get(device.0)
            .ok_or_else(|| DriverError::other(format!("output device {device} disappeared")))?;
        let connection = output
            .connect(port, CLIENT_NAME)
            .map_err(|err| DriverError::other(err.to_string()))?;
        Ok(MidirOutput { connection })
    }

    fn close_output(&mut self, output: Self::Output) -> Result<(), DriverError> {
        let MidirOutput { connection } = output;
        connection.close();
        Ok(())
    }

    fn send_short(
        &mut self,
        output: &mut Self::Output,
        message: PackedShortMessage,
    ) -> Result<(), DriverError> {
        let bytes = message.to_bytes();
        let len = short_message_len(message.status());
        output
            .connection
            .send(&bytes[..len])
            .map_err(|err| DriverError::other(err.to_string()))
    }

    fn prepare_output_buffer(
        &mut self,
        _output: &mut Self::Output,
        buffer: &mut SysexBuffer,
    ) -> Result<(), DriverError> {
        // No registration step exists in midir; only the bookkeeping
        // state changes.
        buffer.mark_prepared(true);
        Ok(())
    }

    fn send_long(
        &mut self,
        output: &mut Self::Output,
        buffer: &SysexBuffer,
    ) -> Result<(), DriverError> {
        debug_assert!(buffer.is_prepared());
        output
            .connection
            .send(buffer.recorded())
            .map_err(|err| DriverError::other(err.to_string()))
    }

    fn unprepare_output_buffer(&mut self, _output: &mut Self::Output, buffer: &mut SysexBuffer) {
        buffer.mark_prepared(false);
    }
}
