// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Automatic software update from removable media: detect a package on
//! the card, prepare cache and data, then hand the package to recovery.

use std::{fs, io::ErrorKind};

use anyhow::{Context, Result, anyhow};

use super::{
    boot,
    context::EngineContext,
    countdown, ext4,
    platform::{RebootMode, UpdateApplier},
};
use crate::{defs, storage::volume::VolumeDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]

pub enum UpdateOutcome {
    /// An update was already stashed this boot; storage was not touched.
    AlreadyPending,
    NotFound,
    Cancelled,
    /// Stashed for a later `continue`.
    Deferred,
    Applied,
}

/// Looks for `<device_name>.auto-ota.zip` at the root of `vol`. Returns the
/// path the package will have once recovery mounts the volume.
pub fn detect_sw_update(ctx: &EngineContext, vol: &VolumeDescriptor) -> Option<String> {
    let devices = ctx.platform.devices.as_ref();
    let mount_point = ctx.mount_point(&vol.mount_point);
    let file_name = ctx.config.auto_update_file_name();

    if let Err(e) = fs::create_dir_all(&mount_point) {
        log::debug!("mkdir {}: {}", mount_point.display(), e);
        return None;
    }

    let mounted = devices
        .mount(&vol.device, &vol.fs_type, &mount_point)
        .or_else(|e| match &vol.device2 {
            Some(device2) => {
                log::debug!("{:#}, trying {}", e, device2.display());
                devices.mount(device2, &vol.fs_type, &mount_point)
            }
            None => Err(e),
        });

    let found = match mounted {
        Ok(()) => {
            let candidate = mount_point.join(&file_name);
            log::debug!("Looking for {}...", candidate.display());

            match fs::metadata(&candidate) {
                Ok(_) => {
                    log::info!("OTA Update package found: {}", file_name);
                    Some(format!("{}/{}", vol.mount_point.trim_end_matches('/'), file_name))
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("No update package on {}", vol.mount_point);
                    None
                }
                Err(e) => {
                    log::warn!("stat {}: {}", candidate.display(), e);
                    None
                }
            }
        }
        Err(e) => {
            log::debug!("Couldn't mount {}: {:#}", vol.mount_point, e);
            None
        }
    };

    if let Err(e) = devices.unmount(&mount_point) {
        log::debug!("umount {}: {:#}", mount_point.display(), e);
    }

    found
}

/// Checks a partition in place when it backs the update source, otherwise
/// quick-formats it.
fn provision_partition(ctx: &EngineContext, name: &str, source: &VolumeDescriptor) -> Result<()> {
    let record = ctx
        .disk
        .find_partition(name)
        .with_context(|| format!("Couldn't find {} partition. Is your disk layout valid?", name))?;

    if record.device == source.device {
        log::info!("{} holds the update package, checking in place", name);
        ext4::filesystem_checks(ctx, &record.device)
            .map_err(|e| anyhow!("{} filesystem corrupted: {}", name, e))
    } else {
        ext4::format(ctx, record).map_err(|e| anyhow!("Couldn't format {} partition: {}", name, e))
    }
}

pub fn provisioning_checks(ctx: &EngineContext, source: &VolumeDescriptor) -> Result<()> {
    log::debug!("Preparing device for provisioning...");

    if let Some(hook) = &ctx.platform.provision_hook {
        hook().context("Platform-specific provision function failed")?;
    }

    provision_partition(ctx, defs::CACHE_PTN, source)?;
    provision_partition(ctx, defs::DATA_PTN, source)?;

    Ok(())
}

fn provision_and_apply(
    ctx: &EngineContext,
    vol: &VolumeDescriptor,
    package: String,
) -> Result<UpdateOutcome> {
    if ctx.pending_update().is_some() {
        return Ok(UpdateOutcome::AlreadyPending);
    }

    provisioning_checks(ctx, vol)?;

    if ctx.config.update_pause {
        log::info!("Update {} deferred until 'continue'", package);

        if !ctx.stash_update(package) {
            return Ok(UpdateOutcome::AlreadyPending);
        }
        return Ok(UpdateOutcome::Deferred);
    }

    ctx.platform.applier.apply(ctx, &package)?;
    Ok(UpdateOutcome::Applied)
}

/// Detect, optionally count down, then provision and either apply or
/// stash the update. At most one update is stashed per boot; later calls
/// return `AlreadyPending` without touching storage.
pub fn try_update_sw(
    ctx: &EngineContext,
    vol: &VolumeDescriptor,
    use_countdown: bool,
) -> Result<UpdateOutcome> {
    if ctx.pending_update().is_some() {
        log::debug!("Update already pending");
        return Ok(UpdateOutcome::AlreadyPending);
    }

    let Some(package) = detect_sw_update(ctx, vol) else {
        return Ok(UpdateOutcome::NotFound);
    };

    let progress = ctx.platform.progress.as_ref();

    if use_countdown {
        progress.show_text(true);
        let completed = countdown::countdown(ctx, "SW update", ctx.config.autoboot_delay_secs);
        progress.show_text(false);

        if !completed {
            log::info!("SW update cancelled");
            return Ok(UpdateOutcome::Cancelled);
        }
    }

    let _guard = ctx.lock_storage();

    progress.show_indeterminate();
    let result = provision_and_apply(ctx, vol, package);
    progress.reset();

    result
}

/// Leaves the package path in the recovery command file on cache and
/// restarts into recovery.
#[derive(Debug, Default, Clone, Copy)]

pub struct RecoveryApplier;

impl UpdateApplier for RecoveryApplier {
    fn apply(&self, ctx: &EngineContext, package: &str) -> Result<()> {
        let cache = ctx
            .disk
            .find_partition(defs::CACHE_PTN)
            .context("No cache partition in disk layout")?;

        let mount_point = boot::mount_partition(ctx, cache)?;
        let command_file = mount_point.join(defs::RECOVERY_COMMAND_FILE);

        let written = command_file
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&command_file, format!("--update_package={}\n", package)));

        ctx.platform.devices.sync();

        if let Err(e) = ctx.platform.devices.unmount(&mount_point) {
            log::warn!("umount {}: {:#}", mount_point.display(), e);
        }

        written.with_context(|| format!("Failed to write {}", command_file.display()))?;

        log::info!("Rebooting into recovery to apply {}", package);

        match ctx.platform.power.restart(RebootMode::Recovery) {
            Ok(never) => match never {},
            Err(e) => Err(e.context("Reboot into recovery failed")),
        }
    }
}
