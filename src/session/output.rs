// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! Outbound encoding: logical messages into driver calls.

use crate::{
    buffer::SysexBuffer,
    driver::{DriverError, MidiDriver},
    message::{MidiMessage, PackedShortMessage, StatusKind},
    session::{DeviceSession, SessionError},
};

/// The transposed note, unless it left the valid data byte range.
fn transpose_note(note: u8, offset: i32) -> Option<u8> {
    let transposed = i32::from(note) + offset;
    u8::try_from(transposed).ok().filter(|note| *note <= 0x7f)
}

impl<D: MidiDriver> DeviceSession<D> {
    /// Selects the output instrument sound.
    ///
    /// Sends bank select MSB (controller 0), bank select LSB
    /// (controller 32), and the program change, then records the
    /// program. The program is recorded only when every send
    /// succeeded. With no output device open, the program is recorded
    /// without any driver call and applied when a device is opened.
    pub fn set_instrument(&mut self, program: u8) -> Result<(), SessionError> {
        if let Some(output) = &mut self.output {
            let program = u32::from(program);
            let setup = [
                0x0000_00b0 | ((program << 8) & 0x007f_0000),
                0x0000_20b0 | ((program << 1) & 0x007f_0000),
                0x0000_00c0 | ((program << 8) & 0x0000_7f00),
            ];
            for word in setup {
                self.driver
                    .send_short(&mut output.handle, PackedShortMessage::from_raw(word))
                    .map_err(SessionError::SendFailed)?;
            }
        }
        self.instrument = program;
        Ok(())
    }

    /// Encodes and transmits one message on the output device.
    ///
    /// With no output device open the message is silently dropped;
    /// deliberately not an error, so routing upstream does not have to
    /// track whether an output device is selected.
    ///
    /// Note-on/note-off/poly-aftertouch messages have the session's
    /// transpose offset added to their note byte; when the transposed
    /// note leaves the range [0, 127] the whole message is dropped
    /// rather than sent with a wrapped value. Messages longer than
    /// 3 bytes go out through a transient driver-registered buffer
    /// that is deregistered on every exit path.
    pub fn send_message(&mut self, message: &MidiMessage) -> Result<(), SessionError> {
        let Some(output) = &mut self.output else {
            return Ok(());
        };
        let sent = match message.bytes() {
            &[status] => self
                .driver
                .send_short(&mut output.handle, PackedShortMessage::new(status, 0, 0)),
            &[status, data1] => self
                .driver
                .send_short(&mut output.handle, PackedShortMessage::new(status, data1, 0)),
            &[status, data1, data2] => {
                let data1 = if StatusKind::of(status).is_transposable() {
                    let Some(note) = transpose_note(data1, self.transpose) else {
                        log::debug!(
                            "Dropping {kind} message: transposed note out of range",
                            kind = StatusKind::of(status)
                        );
                        return Ok(());
                    };
                    note
                } else {
                    data1
                };
                self.driver.send_short(
                    &mut output.handle,
                    PackedShortMessage::new(status, data1, data2),
                )
            }
            bytes => {
                let mut buffer = SysexBuffer::transient();
                self.driver
                    .prepare_output_buffer(&mut output.handle, &mut buffer)
                    .map_err(SessionError::SendFailed)?;
                buffer.record(bytes);
                let sent = self.driver.send_long(&mut output.handle, &buffer);
                self.driver
                    .unprepare_output_buffer(&mut output.handle, &mut buffer);
                sent
            }
        };
        sent.map_err(SessionError::SendFailed)
    }

    /// Sends the all-notes-off controller on every MIDI channel.
    ///
    /// Succeeds with zero driver calls when no output device is open.
    /// Stops at the first failure, so later channels may stay
    /// unsilenced when the device errors out mid-sequence.
    pub fn send_all_note_off(&mut self) -> Result<(), SessionError> {
        let Some(output) = &mut self.output else {
            return Ok(());
        };
        Self::burst_all_note_off(&mut self.driver, &mut output.handle)
            .map_err(SessionError::SendFailed)
    }

    /// Controller 123 (all notes off), value 0, on channels 0..=15.
    pub(super) fn burst_all_note_off(
        driver: &mut D,
        output: &mut D::Output,
    ) -> Result<(), DriverError> {
        for word in 0x0000_7bb0..=0x0000_7bbf {
            driver.send_short(output, PackedShortMessage::from_raw(word))?;
        }
        Ok(())
    }
}
