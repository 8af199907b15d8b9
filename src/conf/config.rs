// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]

pub struct SecondStageConfig {
    pub partition: String,
    pub directory: String,
}

impl Default for SecondStageConfig {
    fn default() -> Self {
        Self {
            partition: defs::DATA_PTN.to_string(),
            directory: defs::SECOND_STAGE_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]

pub struct PathsConfig {
    pub disk_layout: PathBuf,
    pub fstab: PathBuf,
    pub mount_root: PathBuf,
    pub run_dir: PathBuf,
    pub log_file: PathBuf,
    pub tools_dir: PathBuf,
    pub input_dir: PathBuf,
    pub battery_dir: PathBuf,
    pub usb_ep_out: PathBuf,
    pub usb_ep_in: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            disk_layout: PathBuf::from(defs::DISK_LAYOUT_DEFAULT),
            fstab: PathBuf::from(defs::FSTAB_DEFAULT),
            mount_root: PathBuf::from(defs::MOUNT_ROOT),
            run_dir: PathBuf::from(defs::RUN_DIR),
            log_file: PathBuf::from(defs::LOG_FILE),
            tools_dir: PathBuf::from(defs::TOOLS_DIR),
            input_dir: PathBuf::from(defs::INPUT_DIR),
            battery_dir: PathBuf::from(defs::BATTERY_DIR),
            usb_ep_out: PathBuf::from(defs::USB_EP_OUT),
            usb_ep_in: PathBuf::from(defs::USB_EP_IN),
        }
    }
}

/// Engine parameters. Loaded once at startup from the config file, then
/// overridden by `droidboot.*` kernel parameters; read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]

pub struct Config {
    pub device_name: String,
    pub verbose: bool,
    pub autoboot: bool,
    pub autoboot_delay_secs: u32,
    pub scratch_mb: u32,
    pub min_battery: u32,
    pub update_pause: bool,
    pub second_stage: SecondStageConfig,
    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "generic".to_string(),
            verbose: false,
            autoboot: false,
            autoboot_delay_secs: 8,
            scratch_mb: 400,
            min_battery: 10,
            update_pause: false,
            second_stage: SecondStageConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(defs::CONFIG_FILE_DEFAULT)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn merge_with_cli(&mut self, disk_layout: Option<PathBuf>, verbose: bool) {
        if let Some(layout) = disk_layout {
            self.paths.disk_layout = layout;
        }

        if verbose {
            self.verbose = true;
        }
    }

    pub fn scratch_bytes(&self) -> usize {
        self.scratch_mb as usize * defs::MEGABYTE
    }

    pub fn tool(&self, name: &str) -> String {
        self.paths.tools_dir.join(name).to_string_lossy().to_string()
    }

    pub fn auto_update_file_name(&self) -> String {
        format!("{}{}", self.device_name, defs::AUTO_UPDATE_SUFFIX)
    }
}
