// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! MIDI message representations shared by the input and output paths.

use derive_more::{Deref, Display};
use thiserror::Error;


/// Capacity in bytes of a driver-registered system-exclusive buffer.
///
/// Also the upper bound on the length of a [`MidiMessage`]: longer
/// messages cannot travel through a single buffer.
pub const SYSEX_BUFFER_SIZE: usize = 512;

/// A short MIDI message packed little-endian into a 24-bit word.
///
/// Byte 0 carries the status, bytes 1 and 2 the data bytes. Data bytes
/// that the status does not define are zero. This is the wire format
/// the multimedia driver expects for all 1–3 byte messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{_0:06x}")]
pub struct PackedShortMessage(u32);

impl PackedShortMessage {
    #[must_use]
    pub const fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self(status as u32 | (data1 as u32) << 8 | (data2 as u32) << 16)
    }

    /// Reinterprets a raw driver word, discarding bits above the
    /// 24-bit message range.
    #[must_use]
    pub const fn from_raw(word: u32) -> Self {
        Self(word & 0x00ff_ffff)
    }

    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn status(self) -> u8 {
        self.0 as u8
    }

    #[must_use]
    pub const fn data1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[must_use]
    pub const fn data2(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.status(), self.data1(), self.data2()]
    }
}

/// Coarse message classification by the high nibble of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StatusKind {
    NoteOff,
    NoteOn,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    System,
}

impl StatusKind {
    #[must_use]
    pub const fn of(status: u8) -> Self {
        match status & 0xf0 {
            0x80 => Self::NoteOff,
            0x90 => Self::NoteOn,
            0xa0 => Self::PolyAftertouch,
            0xb0 => Self::ControlChange,
            0xc0 => Self::ProgramChange,
            0xd0 => Self::ChannelAftertouch,
            0xe0 => Self::PitchBend,
            _ => Self::System,
        }
    }

    /// Whether messages of this kind carry a note number in their
    /// first data byte that is subject to transposition.
    #[must_use]
    pub const fn is_transposable(self) -> bool {
        matches!(self, Self::NoteOff | Self::NoteOn | Self::PolyAftertouch)
    }
}

/// Number of bytes of a short message as defined by its status byte.
#[must_use]
pub const fn short_message_len(status: u8) -> usize {
    match StatusKind::of(status) {
        StatusKind::ProgramChange | StatusKind::ChannelAftertouch => 2,
        StatusKind::System => match status {
            // MTC quarter frame, song select
            0xf1 | 0xf3 => 2,
            // Song position pointer
            0xf2 => 3,
            // Tune request and all real-time messages
            _ => 1,
        },
        _ => 3,
    }
}

#[derive(Debug, Error)]
pub enum MidiMessageError {
    #[error("empty MIDI message")]
    Empty,
    #[error("MIDI message of {0} bytes exceeds the buffer capacity")]
    TooLong(usize),
}

/// An owned MIDI message of 1 to [`SYSEX_BUFFER_SIZE`] bytes.
///
/// Messages of up to 3 bytes travel as a single packed word, anything
/// longer requires a driver-registered buffer.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct MidiMessage(Vec<u8>);

impl MidiMessage {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub fn kind(&self) -> StatusKind {
        StatusKind::of(self.status())
    }

    /// Whether the message needs a buffer instead of a packed word.
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.0.len() > 3
    }
}

impl TryFrom<Vec<u8>> for MidiMessage {
    type Error = MidiMessageError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.is_empty() {
            return Err(MidiMessageError::Empty);
        }
        if bytes.len() > SYSEX_BUFFER_SIZE {
            return Err(MidiMessageError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }
}

impl From<PackedShortMessage> for MidiMessage {
    /// All three packed bytes are retained, even when the status
    /// defines a shorter message. Consumers distinguish the effective
    /// length by the status byte.
    fn from(packed: PackedShortMessage) -> Self {
        Self(packed.to_bytes().to_vec())
    }
}
