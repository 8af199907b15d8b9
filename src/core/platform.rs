// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Seams to the collaborators the engine drives but does not implement:
//! block devices, power control, the progress UI, the kernel loader, the
//! update applier and the stitched-image updater.

use std::{
    convert::Infallible,
    io::{self, Read, Seek, Write},
    path::Path,
    sync::Arc,
};

use anyhow::Result;

use super::{context::EngineContext, executor::CommandRunner};

pub trait DeviceFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> DeviceFile for T {}

pub trait DeviceAccess: Send + Sync {
    /// True when `node` is a block device that can take an image.
    fn is_valid(&self, node: &Path) -> bool;

    fn open_write(&self, node: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn open_read(&self, node: &Path) -> io::Result<Box<dyn DeviceFile>>;

    fn sync(&self);

    fn reread_partition_table(&self, node: &Path) -> Result<()>;

    fn mount(&self, device: &Path, fs_type: &str, target: &Path) -> Result<()>;

    fn unmount(&self, target: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]

pub enum RebootMode {
    Restart,
    /// Vendor restart that makes firmware start the primary OS again.
    Android,
    Recovery,
}

impl RebootMode {
    pub fn restart_arg(self) -> Option<&'static str> {
        match self {
            RebootMode::Restart => None,
            RebootMode::Android => Some("android"),
            RebootMode::Recovery => Some("recovery"),
        }
    }
}

pub trait Power: Send + Sync {
    fn restart(&self, mode: RebootMode) -> Result<Infallible>;

    fn power_off(&self) -> Result<Infallible>;
}

pub trait Progress: Send + Sync {
    fn show_progress(&self, portion: f32, seconds: u32);

    fn show_indeterminate(&self);

    fn reset(&self);

    fn show_text(&self, visible: bool);
}

/// Hands control to a staged kernel. Only returns on failure.
pub trait KernelLoader: Send + Sync {
    fn exec(&self, ctx: &EngineContext, base: &Path) -> Result<Infallible>;
}

pub trait UpdateApplier: Send + Sync {
    fn apply(&self, ctx: &EngineContext, package: &str) -> Result<()>;
}

pub trait StitchUpdater: Send + Sync {
    fn write_stitch_image(&self, data: &[u8], index: u32) -> Result<()>;
}

pub type ProvisionHook = Box<dyn Fn() -> Result<()> + Send + Sync>;

pub struct Platform {
    pub runner: Arc<dyn CommandRunner>,
    pub devices: Arc<dyn DeviceAccess>,
    pub power: Arc<dyn Power>,
    pub progress: Arc<dyn Progress>,
    pub loader: Arc<dyn KernelLoader>,
    pub applier: Arc<dyn UpdateApplier>,
    pub stitcher: Arc<dyn StitchUpdater>,
    pub provision_hook: Option<ProvisionHook>,
}
