// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fastboot framing over a pair of byte streams: one command per read,
//! replies as single packets of at most 64 bytes.

use std::io::{self, ErrorKind, Read, Write};

use anyhow::{Context, Result};

use crate::core::{
    context::EngineContext,
    dispatch::{Dispatcher, ReplyKind, ReplySink},
};

const MAX_COMMAND: usize = 64;

const MAX_PACKET: usize = 64;

/// Back-to-back I/O failures after which the endpoint is considered gone.
const MAX_CONSECUTIVE_ERRORS: u32 = 8;

fn write_packet<W: Write>(tx: &mut W, prefix: &str, message: &str) -> io::Result<()> {
    let mut packet = Vec::with_capacity(MAX_PACKET);
    packet.extend_from_slice(prefix.as_bytes());

    let room = MAX_PACKET - packet.len();
    let body = message.as_bytes();
    packet.extend_from_slice(&body[..body.len().min(room)]);

    tx.write_all(&packet)?;
    tx.flush()
}

struct PacketSink<'a, W: Write> {
    tx: &'a mut W,
}

impl<W: Write> ReplySink for PacketSink<'_, W> {
    fn send(&mut self, kind: ReplyKind, message: &str) -> io::Result<()> {
        write_packet(&mut *self.tx, kind.prefix(), message)
    }
}

/// Host session. `download:` and `getvar:` are handled here; everything
/// else goes to the dispatcher with the last downloaded payload.
pub struct Session<R, W> {
    rx: R,
    tx: W,
    download: Vec<u8>,
    max_download: usize,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(rx: R, tx: W, max_download: usize) -> Self {
        Self {
            rx,
            tx,
            download: Vec::new(),
            max_download,
        }
    }

    /// Serves commands until the host side closes or the endpoint keeps
    /// failing. A single I/O error only costs the command it happened in.
    pub fn serve(&mut self, ctx: &EngineContext, dispatcher: &Dispatcher) {
        let mut failures = 0;

        loop {
            let result = match self.read_command() {
                Ok(Some(command)) => self.handle(ctx, dispatcher, &command),
                Ok(None) => {
                    log::info!("fastboot: host closed the connection");
                    return;
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    log::warn!("fastboot: {:#}", e);

                    if failures >= MAX_CONSECUTIVE_ERRORS {
                        log::error!("fastboot: endpoint keeps failing, closing session");
                        return;
                    }
                }
            }
        }
    }

    fn read_command(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; MAX_COMMAND];

        let n = loop {
            match self.rx.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read command"),
            }
        };

        if n == 0 {
            return Ok(None);
        }

        let command = String::from_utf8_lossy(&buf[..n]);
        Ok(Some(command.trim_end_matches(['\0', '\r', '\n']).to_string()))
    }

    pub fn handle(
        &mut self,
        ctx: &EngineContext,
        dispatcher: &Dispatcher,
        command: &str,
    ) -> Result<()> {
        log::info!("fastboot: {}", command);

        if let Some(size) = command.strip_prefix("download:") {
            return self.receive(size);
        }

        if let Some(key) = command.strip_prefix("getvar:") {
            let value = dispatcher.variable(key).unwrap_or("");
            return self.reply("OKAY", value);
        }

        let mut sink = PacketSink { tx: &mut self.tx };
        dispatcher.dispatch(ctx, command, &self.download, &mut sink);

        Ok(())
    }

    fn receive(&mut self, size: &str) -> Result<()> {
        let Ok(len) = usize::from_str_radix(size, 16) else {
            return self.reply("FAIL", "invalid data size");
        };

        if len > self.max_download {
            return self.reply("FAIL", "data too large");
        }

        self.reply("DATA", &format!("{:08x}", len))?;

        self.download.clear();
        self.download.resize(len, 0);

        if let Err(e) = self.rx.read_exact(&mut self.download) {
            self.download.clear();
            return Err(e).with_context(|| format!("Failed to receive {} bytes", len));
        }

        log::debug!("fastboot: received {} bytes", len);

        self.reply("OKAY", "")
    }

    fn reply(&mut self, prefix: &str, message: &str) -> Result<()> {
        write_packet(&mut self.tx, prefix, message).context("Failed to send reply")
    }
}
