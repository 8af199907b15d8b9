// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod layout;
pub mod volume;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::{executor::CommandRunner, platform::DeviceAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]

pub enum PartType {
    Linux,
    Fat32,
    Extended,
    Other(u8),
}

impl PartType {
    pub fn mbr_id(self) -> u8 {
        match self {
            PartType::Linux => 0x83,
            PartType::Fat32 => 0x0c,
            PartType::Extended => 0x05,
            PartType::Other(id) => id,
        }
    }

    /// Filesystem type used when mounting a partition of this type.
    pub fn fs_type(self) -> Option<&'static str> {
        match self {
            PartType::Linux => Some("ext4"),
            PartType::Fat32 => Some("vfat"),
            _ => None,
        }
    }
}

impl FromStr for PartType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();

        let id = match lower.as_str() {
            "linux" => return Ok(PartType::Linux),
            "fat32" | "vfat" => return Ok(PartType::Fat32),
            "extended" => return Ok(PartType::Extended),
            hex if hex.starts_with("0x") => u8::from_str_radix(&hex[2..], 16),
            dec => dec.parse::<u8>(),
        };

        match id {
            Ok(0x83) => Ok(PartType::Linux),
            Ok(0x0c) => Ok(PartType::Fat32),
            Ok(0x05) => Ok(PartType::Extended),
            Ok(other) => Ok(PartType::Other(other)),
            Err(_) => bail!("Unknown partition type: {}", s),
        }
    }
}

impl TryFrom<String> for PartType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PartType> for String {
    fn from(value: PartType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartType::Linux => write!(f, "linux"),
            PartType::Fat32 => write!(f, "fat32"),
            PartType::Extended => write!(f, "extended"),
            PartType::Other(id) => write!(f, "0x{:02x}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]

pub struct PartitionRecord {
    pub name: String,
    pub part_type: PartType,
    pub device: PathBuf,
    pub len_kb: Option<u64>,
}

/// Everything `apply` needs from the engine to rewrite the partition table.
pub struct ApplyEnv<'a> {
    pub runner: &'a dyn CommandRunner,
    pub devices: &'a dyn DeviceAccess,
    pub sfdisk: String,
    pub script_dir: &'a Path,
    pub dry_run: bool,
}

/// Name-to-device resolution for the internal disk. Records are never
/// mutated by the engine; `apply` only writes the described table to disk.
pub trait PartitionDirectory: Send + Sync {
    fn disk_device(&self) -> &Path;

    fn partitions(&self) -> &[PartitionRecord];

    fn find_partition(&self, name: &str) -> Option<&PartitionRecord> {
        self.partitions().iter().find(|p| p.name == name)
    }

    fn resolve_device_node(&self, name: &str) -> Option<PathBuf> {
        self.find_partition(name).map(|p| p.device.clone())
    }

    fn apply(&self, env: &ApplyEnv<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_type_parsing() {
        assert_eq!("linux".parse::<PartType>().unwrap(), PartType::Linux);
        assert_eq!("0x83".parse::<PartType>().unwrap(), PartType::Linux);
        assert_eq!("12".parse::<PartType>().unwrap(), PartType::Fat32);
        assert_eq!("Extended".parse::<PartType>().unwrap(), PartType::Extended);
        assert_eq!("0xda".parse::<PartType>().unwrap(), PartType::Other(0xda));
        assert!("swap-ish".parse::<PartType>().is_err());
    }
}
