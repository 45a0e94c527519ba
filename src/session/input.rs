// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! Inbound dispatch: raw driver notifications into normalized
//! messages.

use crate::{
    buffer::SysexBuffer,
    driver::{InboundEvent, MidiDriver},
    message::MidiMessage,
    session::DeviceSession,
};

/// Consumer of the normalized messages produced by the dispatcher,
/// e.g. a game-key mapper.
pub trait MidiMessageSink {
    fn receive_midi_message(&mut self, message: MidiMessage);
}

impl<F> MidiMessageSink for F
where
    F: FnMut(MidiMessage),
{
    fn receive_midi_message(&mut self, message: MidiMessage) {
        self(message);
    }
}

/// Verdict of [`DeviceSession::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum DispatchOutcome {
    /// Keep consuming events.
    Continue,
    /// The input device is gone. The session cannot recover; the run
    /// loop owning the event channel must terminate.
    Disconnected,
}

impl<D: MidiDriver> DeviceSession<D> {
    /// Demultiplexes one driver notification.
    ///
    /// Data events are forwarded to `sink` as owned messages; error
    /// events are logged and dropped. Long-message buffers are
    /// re-submitted to the driver after their payload has been copied
    /// out, never before. A failed re-submission shrinks the usable
    /// buffer supply and is only logged.
    pub fn handle_event<S>(&mut self, event: InboundEvent, sink: &mut S) -> DispatchOutcome
    where
        S: MidiMessageSink + ?Sized,
    {
        match event {
            InboundEvent::DeviceOpened => {
                log::debug!("MIDI input device opened");
            }
            InboundEvent::DeviceClosed => {
                log::warn!("MIDI input device disconnected");
                return DispatchOutcome::Disconnected;
            }
            InboundEvent::ShortData(packed) => {
                log::trace!("Received MIDI input: {packed}");
                sink.receive_midi_message(MidiMessage::from(packed));
            }
            InboundEvent::LongData(buffer) => {
                match MidiMessage::try_from(buffer.recorded().to_vec()) {
                    Ok(message) => sink.receive_midi_message(message),
                    // Zero-length delivery, nothing to forward.
                    Err(err) => log::warn!("Discarding long message: {err}"),
                }
                self.resubmit(buffer);
            }
            InboundEvent::ShortError(packed) => {
                log::warn!("Invalid MIDI message: {:02x?}", packed.to_bytes());
            }
            InboundEvent::LongError(buffer) => {
                log::warn!("Invalid MIDI message: {:02x?}", buffer.recorded());
                self.resubmit(buffer);
            }
        }
        DispatchOutcome::Continue
    }

    /// Hands a delivered buffer back to the driver for reuse.
    fn resubmit(&mut self, buffer: SysexBuffer) {
        let Some(open) = &mut self.input else {
            // The delivery raced with a close; the buffer rejoins the
            // idle pool unprepared.
            self.pool.restore(buffer);
            return;
        };
        if let Err((buffer, err)) = self.driver.submit_input_buffer(&mut open.handle, buffer) {
            log::warn!(
                "Failed to re-submit sysex buffer {id}: {err}",
                id = buffer.id()
            );
            self.pool.restore(buffer);
        }
    }
}
