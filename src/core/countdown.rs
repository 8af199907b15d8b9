// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use super::{context::EngineContext, platform::Progress};

/// Granularity at which a pending cancellation is observed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Armed while a countdown runs; any key press disarms it.
#[derive(Debug, Clone, Default)]

pub struct CancelToken {
    armed: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Returns whether the token was armed before the call.
    pub fn disarm(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

pub fn disable_autoboot(ctx: &EngineContext) {
    if ctx.autoboot.disarm() {
        log::info!("Countdown disabled.");
    }
}

/// `true` if the countdown ran to completion, `false` if cancelled.
pub fn countdown(ctx: &EngineContext, action: &str, seconds: u32) -> bool {
    run(
        &ctx.autoboot,
        ctx.platform.progress.as_ref(),
        seconds,
        POLL_INTERVAL,
        |remaining| log::info!("Automatic {} in {} seconds", action, remaining),
    )
}

pub fn run(
    token: &CancelToken,
    progress: &dyn Progress,
    seconds: u32,
    interval: Duration,
    mut tick: impl FnMut(u32),
) -> bool {
    token.arm();
    progress.show_progress(1.0, seconds);
    log::info!("Press a button to cancel this countdown");

    let mut remaining = seconds;

    while remaining > 0 && token.is_armed() {
        tick(remaining);
        thread::sleep(interval);
        remaining -= 1;
    }

    progress.reset();
    token.disarm()
}
