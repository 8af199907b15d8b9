// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Platform backends for a running device.

use std::{
    convert::Infallible,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use anyhow::Result;

use super::{
    boot::KexecLoader,
    executor::SystemRunner,
    flash::NoStitchedImages,
    platform::{DeviceAccess, DeviceFile, Platform, Power, Progress, RebootMode},
    provision::RecoveryApplier,
};
use crate::utils;

#[derive(Debug, Default, Clone, Copy)]

pub struct SystemDevices;

impl DeviceAccess for SystemDevices {
    fn is_valid(&self, node: &Path) -> bool {
        utils::is_block_device(node)
    }

    fn open_write(&self, node: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(OpenOptions::new().write(true).open(node)?))
    }

    fn open_read(&self, node: &Path) -> io::Result<Box<dyn DeviceFile>> {
        Ok(Box::new(File::open(node)?))
    }

    fn sync(&self) {
        utils::sync();
    }

    fn reread_partition_table(&self, node: &Path) -> Result<()> {
        utils::reread_partition_table(node)
    }

    fn mount(&self, device: &Path, fs_type: &str, target: &Path) -> Result<()> {
        utils::mount_device(device, fs_type, target)
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        utils::unmount_target(target)
    }
}

#[derive(Debug, Default, Clone, Copy)]

pub struct SystemPower;

impl Power for SystemPower {
    fn restart(&self, mode: RebootMode) -> Result<Infallible> {
        log::info!("Restarting ({:?})", mode);
        utils::reboot(mode.restart_arg())
    }

    fn power_off(&self) -> Result<Infallible> {
        log::info!("Powering off");
        utils::power_off()
    }
}

/// Progress reporting for headless devices: the log is the only display.
#[derive(Debug, Default, Clone, Copy)]

pub struct LogProgress;

impl Progress for LogProgress {
    fn show_progress(&self, portion: f32, seconds: u32) {
        log::debug!("progress: {:.0}% over {}s", portion * 100.0, seconds);
    }

    fn show_indeterminate(&self) {
        log::debug!("progress: working");
    }

    fn reset(&self) {}

    fn show_text(&self, _visible: bool) {}
}

pub fn platform() -> Platform {
    Platform {
        runner: Arc::new(SystemRunner),
        devices: Arc::new(SystemDevices),
        power: Arc::new(SystemPower),
        progress: Arc::new(LogProgress),
        loader: Arc::new(KexecLoader),
        applier: Arc::new(RecoveryApplier),
        stitcher: Arc::new(NoStitchedImages),
        provision_hook: None,
    }
}
