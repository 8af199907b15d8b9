// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{ApplyEnv, PartType, PartitionDirectory, PartitionRecord};

#[derive(Debug, Deserialize)]

struct LayoutFile {
    device: PathBuf,
    #[serde(default, rename = "partition")]
    partitions: Vec<LayoutEntry>,
}

#[derive(Debug, Deserialize)]

struct LayoutEntry {
    name: String,
    #[serde(rename = "type")]
    part_type: PartType,
    #[serde(default)]
    len_kb: Option<u64>,
}

/// Physical layout of the internal disk, read once at startup.
#[derive(Debug, Clone)]

pub struct DiskLayout {
    device: PathBuf,
    partitions: Vec<PartitionRecord>,
}

impl DiskLayout {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read disk layout: {}", path.as_ref().display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid disk layout: {}", path.as_ref().display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: LayoutFile = toml::from_str(content)?;

        let mut seen = std::collections::HashSet::new();
        let mut partitions = Vec::with_capacity(file.partitions.len());

        for (i, entry) in file.partitions.into_iter().enumerate() {
            if !seen.insert(entry.name.clone()) {
                bail!("Duplicate partition name: {}", entry.name);
            }

            partitions.push(PartitionRecord {
                device: partition_node(&file.device, i + 1),
                name: entry.name,
                part_type: entry.part_type,
                len_kb: entry.len_kb,
            });
        }

        for p in partitions.iter().rev().skip(1) {
            if p.len_kb.is_none() {
                bail!("Only the last partition may omit len_kb ({})", p.name);
            }
        }

        Ok(Self {
            device: file.device,
            partitions,
        })
    }

    pub fn dump(&self) {
        log::debug!("Disk device: {}", self.device.display());

        for p in &self.partitions {
            let size = p
                .len_kb
                .map(|kb| format!("{} KiB", kb))
                .unwrap_or_else(|| "fill".to_string());

            log::debug!("├── {} [{}] {} ({})", p.name, p.part_type, p.device.display(), size);
        }
    }

    pub fn sfdisk_script(&self) -> String {
        let mut script = String::from("label: dos\n");

        for p in &self.partitions {
            match p.len_kb {
                Some(kb) => {
                    let _ = writeln!(script, "size={}KiB, type={:x}", kb, p.part_type.mbr_id());
                }
                None => {
                    let _ = writeln!(script, "type={:x}", p.part_type.mbr_id());
                }
            }
        }

        script
    }
}

/// `mmcblk0` + 3 -> `mmcblk0p3`, `sda` + 3 -> `sda3`.
fn partition_node(disk: &Path, index: usize) -> PathBuf {
    let disk_str = disk.to_string_lossy();

    let separator = if disk_str.ends_with(|c: char| c.is_ascii_digit()) {
        "p"
    } else {
        ""
    };

    PathBuf::from(format!("{}{}{}", disk_str, separator, index))
}

impl PartitionDirectory for DiskLayout {
    fn disk_device(&self) -> &Path {
        &self.device
    }

    fn partitions(&self) -> &[PartitionRecord] {
        &self.partitions
    }

    fn apply(&self, env: &ApplyEnv<'_>) -> Result<()> {
        if !env.devices.is_valid(&self.device) {
            bail!("Disk device {} is not a block device", self.device.display());
        }

        fs::create_dir_all(env.script_dir)?;

        let script_path = env.script_dir.join("disk_layout.sfdisk");

        fs::write(&script_path, self.sfdisk_script())
            .with_context(|| format!("Failed to write {}", script_path.display()))?;

        let device = self.device.to_string_lossy();

        let mut argv = vec![env.sfdisk.as_str(), "--no-reread", "--wipe", "always"];
        if env.dry_run {
            argv.push("--no-act");
        }
        argv.push(&device);

        log::info!("Applying disk layout to {}", device);

        let status = env
            .runner
            .run_with_input(&argv, &script_path)
            .context("Failed to run partitioning tool")?;

        if status != 0 {
            bail!("{} exited with status {}", env.sfdisk, status);
        }

        if !env.dry_run {
            env.devices.sync();
            env.devices.reread_partition_table(&self.device)?;
        }

        Ok(())
    }
}
