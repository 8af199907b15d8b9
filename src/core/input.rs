// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key listener: any key event on an input device cancels a running
//! countdown.

use std::{
    fs::{self, File},
    io::{ErrorKind, Read},
    mem,
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use rustix::{
    event::{PollFd, PollFlags, poll},
    io::Errno,
};

use super::{context::EngineContext, countdown::disable_autoboot};

const EV_KEY: u16 = 0x01;

const EVENT_SIZE: usize = mem::size_of::<libc::input_event>();

const TYPE_OFFSET: usize = mem::size_of::<libc::timeval>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]

pub struct InputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

/// Splits a read from an evdev node into events, ignoring a trailing
/// partial record.
pub fn parse_events(buf: &[u8]) -> Vec<InputEvent> {
    buf.chunks_exact(EVENT_SIZE)
        .map(|raw| {
            let at = TYPE_OFFSET;
            InputEvent {
                kind: u16::from_ne_bytes([raw[at], raw[at + 1]]),
                code: u16::from_ne_bytes([raw[at + 2], raw[at + 3]]),
                value: i32::from_ne_bytes([raw[at + 4], raw[at + 5], raw[at + 6], raw[at + 7]]),
            }
        })
        .collect()
}

pub fn handle_events(ctx: &EngineContext, events: &[InputEvent]) {
    for event in events {
        log::trace!("input: type {} code {} value {}", event.kind, event.code, event.value);

        if event.kind == EV_KEY {
            disable_autoboot(ctx);
        }
    }
}

fn open_input_devices(dir: &Path) -> Result<Vec<File>> {
    let mut devices = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(devices),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("event") {
            continue;
        }

        match File::open(entry.path()) {
            Ok(file) => {
                log::debug!("Listening on {}", entry.path().display());
                devices.push(file);
            }
            Err(e) => log::warn!("open {}: {}", entry.path().display(), e),
        }
    }

    Ok(devices)
}

fn listen(ctx: &EngineContext, devices: Vec<File>) {
    let mut buf = vec![0u8; EVENT_SIZE * 16];

    loop {
        let mut fds: Vec<PollFd<'_>> = devices
            .iter()
            .map(|file| PollFd::new(file, PollFlags::IN))
            .collect();

        match poll(&mut fds, -1) {
            Ok(_) => {}
            Err(Errno::INTR) => continue,
            Err(e) => {
                log::error!("poll on input devices failed: {}", e);
                return;
            }
        }

        let ready: Vec<usize> = fds
            .iter()
            .enumerate()
            .filter(|(_, fd)| fd.revents().contains(PollFlags::IN))
            .map(|(i, _)| i)
            .collect();

        for i in ready {
            match (&devices[i]).read(&mut buf) {
                Ok(n) => handle_events(ctx, &parse_events(&buf[..n])),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => log::warn!("read input event: {}", e),
            }
        }
    }
}

/// Starts the listener thread. Returns `None` when the device has no
/// input nodes.
pub fn spawn_listener(ctx: Arc<EngineContext>) -> Result<Option<JoinHandle<()>>> {
    let devices = open_input_devices(&ctx.config.paths.input_dir)?;

    if devices.is_empty() {
        log::warn!("No input devices found, countdowns cannot be cancelled");
        return Ok(None);
    }

    let handle = thread::Builder::new()
        .name("input".to_string())
        .spawn(move || listen(&ctx, devices))
        .context("Failed to spawn input listener")?;

    Ok(Some(handle))
}
