// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! In-memory driver double for exercising session logic in tests.
//!
//! Cloning shares the underlying state, so tests keep one handle for
//! inspection and failure injection while the session owns another.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{DeviceIndex, DriverError, InboundEvent, InboundEventSender, MidiDriver};
use crate::{buffer::SysexBuffer, message::PackedShortMessage};

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeDriver {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    input_names: Vec<Result<String, u32>>,
    output_names: Vec<Result<String, u32>>,

    events: Option<InboundEventSender>,
    submitted: VecDeque<SysexBuffer>,
    input_open: bool,
    input_started: bool,
    output_open: bool,

    short_words: Vec<u32>,
    short_attempts: usize,
    long_payloads: Vec<Vec<u8>>,
    prepared_output_buffers: usize,

    fail_open_input: bool,
    fail_open_output: bool,
    fail_start: bool,
    fail_submits_after: Option<usize>,
    submit_count: usize,
    fail_short_sends_after: Option<usize>,
    fail_long_send: bool,
}

const FAKE_FAILURE_CODE: u32 = 11;

fn injected_failure(what: &'static str) -> DriverError {
    DriverError::status(FAKE_FAILURE_CODE, what)
}

impl FakeDriver {
    pub(crate) fn with_devices(inputs: usize, outputs: usize) -> Self {
        let inner = Inner {
            input_names: (0..inputs).map(|i| Ok(format!("Fake In {i}"))).collect(),
            output_names: (0..outputs).map(|i| Ok(format!("Fake Out {i}"))).collect(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake driver state")
    }

    // -- failure injection ------------------------------------------------

    pub(crate) fn fail_open_input(&self) {
        self.lock().fail_open_input = true;
    }

    pub(crate) fn fail_open_output(&self) {
        self.lock().fail_open_output = true;
    }

    pub(crate) fn fail_start(&self) {
        self.lock().fail_start = true;
    }

    /// Lets `n` buffer submissions succeed, then fails the rest.
    pub(crate) fn fail_submits_after(&self, n: usize) {
        let mut inner = self.lock();
        inner.fail_submits_after = Some(inner.submit_count + n);
    }

    /// Lets `n` further short sends succeed, then fails the rest.
    pub(crate) fn fail_short_sends_after(&self, n: usize) {
        let mut inner = self.lock();
        inner.fail_short_sends_after = Some(inner.short_attempts + n);
    }

    pub(crate) fn fail_long_send(&self) {
        self.lock().fail_long_send = true;
    }

    pub(crate) fn break_input_name(&self, index: usize, code: u32) {
        self.lock().input_names[index] = Err(code);
    }

    // -- inspection -------------------------------------------------------

    pub(crate) fn short_words(&self) -> Vec<u32> {
        self.lock().short_words.clone()
    }

    pub(crate) fn clear_short_words(&self) {
        self.lock().short_words.clear();
    }

    pub(crate) fn long_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().long_payloads.clone()
    }

    pub(crate) fn submitted_buffers(&self) -> usize {
        self.lock().submitted.len()
    }

    pub(crate) fn input_open(&self) -> bool {
        self.lock().input_open
    }

    pub(crate) fn input_started(&self) -> bool {
        self.lock().input_started
    }

    pub(crate) fn output_open(&self) -> bool {
        self.lock().output_open
    }

    pub(crate) fn prepared_output_buffers(&self) -> usize {
        self.lock().prepared_output_buffers
    }

    // -- event delivery (the driver side of the notification stream) ------

    pub(crate) fn deliver(&self, event: InboundEvent) {
        let events = self
            .lock()
            .events
            .clone()
            .expect("input device is not open");
        events.send(event).expect("event receiver is gone");
    }

    pub(crate) fn deliver_short(&self, bytes: [u8; 3]) {
        self.deliver(InboundEvent::ShortData(PackedShortMessage::new(
            bytes[0], bytes[1], bytes[2],
        )));
    }

    pub(crate) fn deliver_short_error(&self, bytes: [u8; 3]) {
        self.deliver(InboundEvent::ShortError(PackedShortMessage::new(
            bytes[0], bytes[1], bytes[2],
        )));
    }

    fn take_submitted(&self, payload: &[u8]) -> (InboundEventSender, SysexBuffer) {
        let mut inner = self.lock();
        let events = inner.events.clone().expect("input device is not open");
        let mut buffer = inner.submitted.pop_front().expect("no buffer submitted");
        buffer.record(payload);
        (events, buffer)
    }

    pub(crate) fn deliver_long(&self, payload: &[u8]) {
        let (events, buffer) = self.take_submitted(payload);
        events
            .send(InboundEvent::LongData(buffer))
            .expect("event receiver is gone");
    }

    pub(crate) fn deliver_long_error(&self, payload: &[u8]) {
        let (events, buffer) = self.take_submitted(payload);
        events
            .send(InboundEvent::LongError(buffer))
            .expect("event receiver is gone");
    }

    pub(crate) fn deliver_closed(&self) {
        self.deliver(InboundEvent::DeviceClosed);
    }
}

fn fake_name(entry: &Result<String, u32>) -> Result<String, DriverError> {
    match entry {
        Ok(name) => Ok(name.clone()),
        Err(code) => Err(DriverError::status(*code, "name lookup failed")),
    }
}

impl MidiDriver for FakeDriver {
    type Input = ();
    type Output = ();

    fn input_device_count(&self) -> usize {
        self.lock().input_names.len()
    }

    fn output_device_count(&self) -> usize {
        self.lock().output_names.len()
    }

    fn input_device_name(&self, device: DeviceIndex) -> Result<String, DriverError> {
        fake_name(&self.lock().input_names[device.0])
    }

    fn output_device_name(&self, device: DeviceIndex) -> Result<String, DriverError> {
        fake_name(&self.lock().output_names[device.0])
    }

    fn open_input(
        &mut self,
        _device: DeviceIndex,
        events: InboundEventSender,
    ) -> Result<Self::Input, DriverError> {
        let mut inner = self.lock();
        if inner.fail_open_input {
            return Err(injected_failure("open input failed"));
        }
        assert!(!inner.input_open, "input device already open");
        inner.input_open = true;
        inner.events = Some(events);
        Ok(())
    }

    fn submit_input_buffer(
        &mut self,
        _input: &mut Self::Input,
        buffer: SysexBuffer,
    ) -> Result<(), (SysexBuffer, DriverError)> {
        let mut inner = self.lock();
        if matches!(inner.fail_submits_after, Some(n) if inner.submit_count >= n) {
            return Err((buffer, injected_failure("buffer registration failed")));
        }
        inner.submit_count += 1;
        inner.submitted.push_back(buffer);
        Ok(())
    }

    fn start_input(&mut self, _input: &mut Self::Input) -> Result<(), DriverError> {
        let mut inner = self.lock();
        if inner.fail_start {
            return Err(injected_failure("start failed"));
        }
        inner.input_started = true;
        Ok(())
    }

    fn reclaim_input_buffers(&mut self, _input: &mut Self::Input) -> Vec<SysexBuffer> {
        self.lock().submitted.drain(..).collect()
    }

    fn close_input(&mut self, _input: Self::Input) -> Result<(), DriverError> {
        let mut inner = self.lock();
        inner.input_open = false;
        inner.input_started = false;
        inner.events = None;
        Ok(())
    }

    fn open_output(&mut self, _device: DeviceIndex) -> Result<Self::Output, DriverError> {
        let mut inner = self.lock();
        if inner.fail_open_output {
            return Err(injected_failure("open output failed"));
        }
        assert!(!inner.output_open, "output device already open");
        inner.output_open = true;
        Ok(())
    }

    fn close_output(&mut self, _output: Self::Output) -> Result<(), DriverError> {
        self.lock().output_open = false;
        Ok(())
    }

    fn send_short(
        &mut self,
        _output: &mut Self::Output,
        message: PackedShortMessage,
    ) -> Result<(), DriverError> {
        let mut inner = self.lock();
        let attempt = inner.short_attempts;
        inner.short_attempts += 1;
        if matches!(inner.fail_short_sends_after, Some(n) if attempt >= n) {
            return Err(injected_failure("short send failed"));
        }
        inner.short_words.push(message.to_raw());
        Ok(())
    }

    fn prepare_output_buffer(
        &mut self,
        _output: &mut Self::Output,
        buffer: &mut SysexBuffer,
    ) -> Result<(), DriverError> {
        buffer.mark_prepared(true);
        self.lock().prepared_output_buffers += 1;
        Ok(())
    }

    fn send_long(
        &mut self,
        _output: &mut Self::Output,
        buffer: &SysexBuffer,
    ) -> Result<(), DriverError> {
        assert!(buffer.is_prepared(), "long send on unprepared buffer");
        let mut inner = self.lock();
        if inner.fail_long_send {
            return Err(injected_failure("long send failed"));
        }
        inner.long_payloads.push(buffer.recorded().to_vec());
        Ok(())
    }

    fn unprepare_output_buffer(&mut self, _output: &mut Self::Output, buffer: &mut SysexBuffer) {
        assert!(buffer.is_prepared(), "unprepare on unprepared buffer");
        buffer.mark_prepared(false);
        self.lock().prepared_output_buffers -= 1;
    }
}
