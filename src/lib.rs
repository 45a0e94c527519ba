// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

#![doc = include_str!("../README.md")]

mod buffer;
mod driver;
mod message;
mod session;

pub use self::{
    buffer::{BufferId, BufferPool, SysexBuffer},
    driver::{DeviceIndex, DriverError, InboundEvent, InboundEventSender, MidiDriver},
    message::{
        short_message_len, MidiMessage, MidiMessageError, PackedShortMessage, StatusKind,
        SYSEX_BUFFER_SIZE,
    },
    session::{
        DeviceSession, DispatchOutcome, MidiMessageSink, SessionError, INPUT_BUFFER_COUNT,
    },
};

#[cfg(feature = "midir")]
pub use self::driver::midir::{MidirDriver, MidirInput, MidirOutput};
