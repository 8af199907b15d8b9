// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]

pub struct VolumeDescriptor {
    pub mount_point: String,
    pub fs_type: String,
    pub device: PathBuf,
    pub device2: Option<PathBuf>,
}

/// Filesystem entries from recovery.fstab. Used to locate removable media
/// and to pick filesystem types for mounting.
#[derive(Debug, Clone, Default)]

pub struct VolumeTable {
    volumes: Vec<VolumeDescriptor>,
}

impl VolumeTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read volume table: {}", path.as_ref().display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut volumes = Vec::new();

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                bail!("fstab line {}: expected <mount_point> <fs_type> <device>", lineno + 1);
            }

            volumes.push(VolumeDescriptor {
                mount_point: fields[0].to_string(),
                fs_type: fields[1].to_string(),
                device: PathBuf::from(fields[2]),
                device2: fields.get(3).map(PathBuf::from),
            });
        }

        Ok(Self { volumes })
    }

    pub fn volume_for_path(&self, path: &str) -> Option<&VolumeDescriptor> {
        self.volumes
            .iter()
            .filter(|v| {
                path == v.mount_point
                    || (path.starts_with(&v.mount_point)
                        && path[v.mount_point.len()..].starts_with('/'))
            })
            .max_by_key(|v| v.mount_point.len())
    }

    pub fn volume_for_device(&self, device: &Path) -> Option<&VolumeDescriptor> {
        self.volumes
            .iter()
            .find(|v| v.device == device || v.device2.as_deref() == Some(device))
    }
}
