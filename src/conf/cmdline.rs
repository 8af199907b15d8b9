// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ingestion of `droidboot.<name>=<value>` boot parameters.

use std::{fs, path::Path};

use anyhow::{Context, Result};

use super::config::Config;

const PARAM_PREFIX: &str = "droidboot";

pub fn load_kernel_cmdline<P: AsRef<Path>>(config: &mut Config, path: P) -> Result<()> {
    let path = path.as_ref();
    let cmdline = fs::read_to_string(path)
        .with_context(|| format!("Failed to read kernel command line: {}", path.display()))?;

    apply_cmdline(config, &cmdline);

    Ok(())
}

pub fn apply_cmdline(config: &mut Config, cmdline: &str) {
    for token in cmdline.split_whitespace() {
        apply_option(config, token);
    }
}

fn apply_option(config: &mut Config, token: &str) {
    let Some((name, value)) = token.split_once('=') else {
        return;
    };

    if name.is_empty() || !name.starts_with(PARAM_PREFIX) {
        return;
    }

    log::info!("Got parameter {} = {}", name, value);

    match name {
        "droidboot.bootloader" => config.autoboot = atoi(value) != 0,
        "droidboot.delay" => set_u32(&mut config.autoboot_delay_secs, name, value),
        "droidboot.scratch" => set_u32(&mut config.scratch_mb, name, value),
        "droidboot.minbatt" => set_u32(&mut config.min_battery, name, value),
        "droidboot.bootpart" => config.second_stage.partition = value.to_string(),
        "droidboot.bootdir" => config.second_stage.directory = value.to_string(),
        "droidboot.updatepause" => config.update_pause = atoi(value) != 0,
        _ => log::error!("Unknown parameter {}, ignoring", name),
    }
}

fn set_u32(field: &mut u32, name: &str, value: &str) {
    match u32::try_from(atoi(value)) {
        Ok(v) => *field = v,
        Err(_) => log::error!("Parameter {} out of range: {}, ignoring", name, value),
    }
}

/// Leading sign and digits, anything else yields 0.
pub fn atoi(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut number: i64 = 0;

    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        number = number.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    if negative { -number } else { number }
}
