// SPDX-FileCopyrightText: The gamio authors
// SPDX-License-Identifier: MPL-2.0

//! Bridges a MIDI input device to a MIDI output device, transposing
//! notes on the way. Pass the transpose offset in semitones as the
//! first argument (default 0).

use std::{
    io::{stdin, stdout, Write as _},
    sync::mpsc::channel,
};

use gamio::{DeviceIndex, DeviceSession, DispatchOutcome, MidirDriver};

fn main() {
    match run() {
        Ok(()) => (),
        Err(err) => eprintln!("Error: {err}"),
    }
}

fn select_device(prompt: &str, names: &[String]) -> anyhow::Result<DeviceIndex> {
    if names.is_empty() {
        anyhow::bail!("No MIDI devices found");
    }
    println!("\n{prompt}:");
    for (index, name) in names.iter().enumerate() {
        println!("{index}: {name}");
    }
    print!("Please select a device: ");
    stdout().flush()?;
    let mut input = String::new();
    stdin().read_line(&mut input)?;
    let index = input.trim().parse::<usize>()?;
    if index >= names.len() {
        anyhow::bail!("Unknown device number {index}");
    }
    Ok(DeviceIndex(index))
}

fn run() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let transpose = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<i32>())
        .transpose()?
        .unwrap_or(0);

    let driver = MidirDriver::new()?;
    let (events, inbound) = channel();
    let mut session = DeviceSession::new(driver, events);
    session.set_transpose(transpose);

    let input = select_device("Available MIDI input devices", &session.input_device_names())?;
    let output = select_device(
        "Available MIDI output devices",
        &session.output_device_names(),
    )?;
    session.open_input(input)?;
    session.open_output(output)?;

    println!("Bridging with transpose {transpose:+}, press CTRL-C to exit...");
    for event in inbound {
        let mut pending = Vec::new();
        let outcome = session.handle_event(event, &mut |message| pending.push(message));
        for message in &pending {
            if let Err(err) = session.send_message(message) {
                log::warn!("Failed to forward message: {err}");
            }
        }
        if outcome == DispatchOutcome::Disconnected {
            anyhow::bail!("MIDI input device disconnected");
        }
    }
    Ok(())
}
