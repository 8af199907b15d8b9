// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
};

use anyhow::Result;

use super::{countdown::CancelToken, platform::Platform};
use crate::{
    conf::config::Config,
    defs,
    storage::{ApplyEnv, PartitionDirectory, volume::VolumeTable},
};

/// State shared by the command loop, the input listener and the startup
/// thread.
///
/// `config`, `disk` and `volumes` are written once before any thread is
/// started. `pending_update` has a single writer (the provisioning path)
/// and is set at most once per boot.
pub struct EngineContext {
    pub config: Config,
    pub disk: Box<dyn PartitionDirectory>,
    pub volumes: VolumeTable,
    pub platform: Platform,
    pub autoboot: CancelToken,
    storage_lock: Mutex<()>,
    pending_update: OnceLock<String>,
}

impl EngineContext {
    pub fn new(
        config: Config,
        disk: Box<dyn PartitionDirectory>,
        volumes: VolumeTable,
        platform: Platform,
    ) -> Self {
        Self {
            config,
            disk,
            volumes,
            platform,
            autoboot: CancelToken::default(),
            storage_lock: Mutex::new(()),
            pending_update: OnceLock::new(),
        }
    }

    /// Held for every physical write to boot storage. No timeout.
    pub fn lock_storage(&self) -> MutexGuard<'_, ()> {
        self.storage_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn storage_is_locked(&self) -> bool {
        matches!(self.storage_lock.try_lock(), Err(std::sync::TryLockError::WouldBlock))
    }

    pub fn pending_update(&self) -> Option<&str> {
        self.pending_update.get().map(String::as_str)
    }

    /// Returns false if an update was already stashed this boot.
    pub fn stash_update(&self, package: String) -> bool {
        self.pending_update.set(package).is_ok()
    }

    /// Writes the disk layout to the physical disk. Caller holds the
    /// storage lock.
    pub fn apply_layout(&self, dry_run: bool) -> Result<()> {
        let env = ApplyEnv {
            runner: self.platform.runner.as_ref(),
            devices: self.platform.devices.as_ref(),
            sfdisk: self.config.tool(defs::SFDISK),
            script_dir: &self.config.paths.run_dir,
            dry_run,
        };

        self.disk.apply(&env)
    }

    /// Scratch mountpoint for a volume or partition, e.g. `/mnt/sdcard`.
    pub fn mount_point(&self, name: &str) -> PathBuf {
        self.config
            .paths
            .mount_root
            .join(name.trim_start_matches('/'))
    }
}
