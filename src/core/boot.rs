// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    convert::Infallible,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};

use super::{context::EngineContext, countdown, platform::KernelLoader};
use crate::{defs, storage::PartitionRecord};

/// Mounts a layout partition at its scratch mountpoint. The filesystem type
/// comes from the volume table, falling back to the partition type.
pub fn mount_partition(ctx: &EngineContext, record: &PartitionRecord) -> Result<PathBuf> {
    let fs_type = ctx
        .volumes
        .volume_for_device(&record.device)
        .map(|v| v.fs_type.as_str())
        .or_else(|| record.part_type.fs_type())
        .with_context(|| format!("No filesystem type known for {}", record.name))?;

    let target = ctx.mount_point(&record.name);

    fs::create_dir_all(&target)
        .with_context(|| format!("Failed to create mountpoint {}", target.display()))?;

    ctx.platform
        .devices
        .mount(&record.device, fs_type, &target)
        .with_context(|| {
            format!("Failed to mount {} on {}", record.device.display(), target.display())
        })?;

    Ok(target)
}

/// Mounts the second-stage partition and hands the staged kernel to the
/// loader. Only returns on failure.
pub fn start_default_kernel(ctx: &EngineContext) -> Result<Infallible> {
    let second_stage = &ctx.config.second_stage;

    let record = ctx
        .disk
        .find_partition(&second_stage.partition)
        .with_context(|| {
            format!("Second-stage partition {} not in disk layout", second_stage.partition)
        })?;

    let mount_point = mount_partition(ctx, record)
        .with_context(|| format!("Can't mount second-stage boot partition ({})", record.name))?;

    let base = mount_point.join(&second_stage.directory);

    log::info!("Booting second-stage kernel from {}", base.display());

    ctx.platform
        .loader
        .exec(ctx, &base)
        .context("Second-stage kernel failed to start")
}

/// Countdown, then boot. A cancelled countdown leaves the engine in
/// fastboot mode.
pub fn autoboot(ctx: &EngineContext) {
    if !countdown::countdown(ctx, "boot", ctx.config.autoboot_delay_secs) {
        log::info!("Autoboot cancelled, staying in fastboot");
        return;
    }

    ctx.platform.progress.reset();
    ctx.platform.progress.show_text(true);

    let Err(e) = start_default_kernel(ctx);
    log::error!("Unable to boot default kernel: {:#}", e);
}

/// `kexec -l` the staged kernel, ramdisk and command line, then `kexec -e`.
#[derive(Debug, Default, Clone, Copy)]

pub struct KexecLoader;

fn staged_cmdline(base: &Path) -> Result<String> {
    let path = base.join("cmdline");

    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

impl KernelLoader for KexecLoader {
    fn exec(&self, ctx: &EngineContext, base: &Path) -> Result<Infallible> {
        let kernel = base.join("kernel");
        let ramdisk = base.join("ramdisk.img");

        if !kernel.is_file() {
            bail!("No kernel at {}", kernel.display());
        }

        let kexec = ctx.config.tool(defs::KEXEC);
        let kernel_arg = kernel.to_string_lossy();
        let append = format!("--append={}", staged_cmdline(base)?);
        let initrd = format!("--initrd={}", ramdisk.display());

        let mut argv = vec![kexec.as_str(), "-l", &*kernel_arg];
        if ramdisk.is_file() {
            argv.push(&initrd);
        }
        argv.push(&append);

        let runner = ctx.platform.runner.as_ref();

        let status = runner.run(&argv)?;
        if status != 0 {
            bail!("kexec -l returned {}", status);
        }

        ctx.platform.devices.sync();

        let status = runner.run(&[kexec.as_str(), "-e"])?;
        bail!("kexec -e returned {}", status)
    }
}
