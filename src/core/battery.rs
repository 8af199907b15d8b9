// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::Path, thread, time::Duration};

use anyhow::Result;

use super::platform::Power;

const CHARGE_POLL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]

pub enum Verdict {
    Proceed,
    /// Below threshold but on external power.
    WaitForCharge,
    PowerOff,
}

pub fn capacity(dir: &Path) -> Option<u32> {
    fs::read_to_string(dir.join("capacity"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn is_charging(dir: &Path) -> bool {
    fs::read_to_string(dir.join("status"))
        .map(|s| matches!(s.trim(), "Charging" | "Full"))
        .unwrap_or(false)
}

/// An unreadable gauge never blocks boot.
pub fn evaluate(capacity: Option<u32>, charging: bool, minimum: u32) -> Verdict {
    match capacity {
        Some(level) if level < minimum => {
            if charging {
                Verdict::WaitForCharge
            } else {
                Verdict::PowerOff
            }
        }
        _ => Verdict::Proceed,
    }
}

/// Blocks until the battery holds `minimum` percent, or powers off when it
/// cannot get there.
pub fn enforce_minimum(dir: &Path, minimum: u32, power: &dyn Power) -> Result<()> {
    loop {
        let level = capacity(dir);

        match evaluate(level, is_charging(dir), minimum) {
            Verdict::Proceed => return Ok(()),
            Verdict::WaitForCharge => {
                log::info!("Battery at {:?}%, charging to {}%...", level, minimum);
                thread::sleep(CHARGE_POLL);
            }
            Verdict::PowerOff => {
                log::error!("Battery too low ({:?}%), powering off", level);
                let Err(e) = power.power_off();
                return Err(e);
            }
        }
    }
}
