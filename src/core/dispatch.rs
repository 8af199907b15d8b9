// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{collections::BTreeMap, io};

use super::{context::EngineContext, error::CommandError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]

pub enum ReplyKind {
    Okay,
    Fail,
    Info,
}

impl ReplyKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ReplyKind::Okay => "OKAY",
            ReplyKind::Fail => "FAIL",
            ReplyKind::Info => "INFO",
        }
    }
}

pub trait ReplySink {
    fn send(&mut self, kind: ReplyKind, message: &str) -> io::Result<()>;
}

/// Reply channel handed to a handler. The first `okay` or `fail` is the
/// terminal reply; later ones are dropped.
pub struct Reply<'a> {
    sink: &'a mut dyn ReplySink,
    done: bool,
}

impl<'a> Reply<'a> {
    pub fn new(sink: &'a mut dyn ReplySink) -> Self {
        Self { sink, done: false }
    }

    pub fn info(&mut self, message: &str) {
        if self.done {
            log::warn!("INFO after terminal reply dropped: {}", message);
            return;
        }
        self.send(ReplyKind::Info, message);
    }

    pub fn okay(&mut self, message: &str) {
        self.terminal(ReplyKind::Okay, message);
    }

    pub fn fail(&mut self, reason: &str) {
        self.terminal(ReplyKind::Fail, reason);
    }

    pub fn result(&mut self, result: Result<(), CommandError>) {
        match result {
            Ok(()) => self.okay(""),
            Err(e) => self.fail(&e.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn terminal(&mut self, kind: ReplyKind, message: &str) {
        if self.done {
            log::warn!("Second terminal reply dropped: {} {}", kind.prefix(), message);
            return;
        }
        self.done = true;
        self.send(kind, message);
    }

    fn send(&mut self, kind: ReplyKind, message: &str) {
        if kind == ReplyKind::Fail {
            log::error!("FAIL: {}", message);
        }
        if let Err(e) = self.sink.send(kind, message) {
            log::error!("Failed to send {} reply: {}", kind.prefix(), e);
        }
    }
}

pub type Handler = Box<dyn Fn(&EngineContext, &str, &[u8], &mut Reply<'_>) + Send + Sync>;

/// Keyword table for protocol commands plus the published variables.
#[derive(Default)]

pub struct Dispatcher {
    commands: Vec<(String, Handler)>,
    variables: BTreeMap<String, String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, keyword: &str, handler: F)
    where
        F: Fn(&EngineContext, &str, &[u8], &mut Reply<'_>) + Send + Sync + 'static,
    {
        self.commands.push((keyword.to_string(), Box::new(handler)));
    }

    pub fn publish(&mut self, key: &str, value: &str) {
        self.variables.insert(key.to_string(), value.to_string());
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Longest registered keyword that prefixes `command`, and the rest of
    /// the command as the argument.
    fn lookup<'c>(&self, command: &'c str) -> Option<(&Handler, &'c str)> {
        self.commands
            .iter()
            .filter(|(keyword, _)| command.starts_with(keyword.as_str()))
            .max_by_key(|(keyword, _)| keyword.len())
            .map(|(keyword, handler)| (handler, &command[keyword.len()..]))
    }

    /// Runs the matching handler under the storage lock.
    pub fn dispatch(
        &self,
        ctx: &EngineContext,
        command: &str,
        payload: &[u8],
        sink: &mut dyn ReplySink,
    ) {
        let Some((handler, arg)) = self.lookup(command) else {
            log::warn!("unknown command: {}", command);
            if let Err(e) = sink.send(ReplyKind::Fail, "unknown command") {
                log::error!("Failed to send FAIL reply: {}", e);
            }
            return;
        };

        let _guard = ctx.lock_storage();
        let mut reply = Reply::new(sink);

        handler(ctx, arg, payload, &mut reply);

        if !reply.is_done() {
            log::warn!("{} returned without a terminal reply", command);
        }
    }
}
