// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Superblock validation and maintenance of ext2/3/4 filesystems on
//! partition device nodes. The tools themselves are external programs.

use std::{
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use super::{context::EngineContext, error::CommandError, platform::DeviceAccess};
use crate::{
    defs,
    storage::{PartType, PartitionRecord},
};

/// Reads the superblock at its fixed offset and compares `s_magic`.
/// A declared Linux partition may not be formatted yet, so this is the
/// only evidence that a filesystem is present.
pub fn has_ext_superblock(devices: &dyn DeviceAccess, node: &Path) -> Result<bool, CommandError> {
    let mut file = devices.open_read(node).map_err(|e| {
        log::error!("open {}: {}", node.display(), e);
        CommandError::OpenDevice
    })?;

    match file.seek(SeekFrom::Start(defs::EXT_SUPERBLOCK_OFFSET)) {
        Ok(pos) if pos == defs::EXT_SUPERBLOCK_OFFSET => {}
        _ => return Err(CommandError::SuperblockSeek),
    }

    let mut superblock = [0u8; defs::EXT_SUPERBLOCK_SIZE];
    file.read_exact(&mut superblock)
        .map_err(|_| CommandError::SuperblockRead)?;

    let magic = u16::from_le_bytes([
        superblock[defs::EXT_MAGIC_OFFSET],
        superblock[defs::EXT_MAGIC_OFFSET + 1],
    ]);

    log::debug!("{}: superblock magic 0x{:04x}", node.display(), magic);

    Ok(magic == defs::EXT_SUPER_MAGIC)
}

fn run_tool(
    ctx: &EngineContext,
    argv: &[&str],
    step: CommandError,
    accept: impl Fn(i32) -> bool,
) -> Result<(), CommandError> {
    let status = ctx
        .platform
        .runner
        .run(argv)
        .map_err(|e| CommandError::from_exec(&e, step))?;

    if accept(status) {
        Ok(())
    } else {
        log::error!("{} returned {}", argv[0], status);
        Err(step)
    }
}

/// Grow the filesystem to fill its partition, check it, then reset the
/// mount counter so the first boot does not force a check.
pub fn repair(ctx: &EngineContext, node: &Path) -> Result<(), CommandError> {
    let device = node.to_string_lossy();
    let resize2fs = ctx.config.tool(defs::RESIZE2FS);
    let e2fsck = ctx.config.tool(defs::E2FSCK);
    let tune2fs = ctx.config.tool(defs::TUNE2FS);

    log::info!("Resizing and checking filesystem on {}", device);

    run_tool(ctx, &[resize2fs.as_str(), "-F", &*device], CommandError::Resize, |s| s == 0)?;

    // 1: errors were corrected
    run_tool(
        ctx,
        &[e2fsck.as_str(), "-C", "0", "-fy", &*device],
        CommandError::Fsck,
        |s| s == 0 || s == 1,
    )?;

    run_tool(ctx, &[tune2fs.as_str(), "-C", "1", &*device], CommandError::Tune, |s| s == 0)
}

/// In-place check of an existing filesystem that must not be reformatted.
pub fn filesystem_checks(ctx: &EngineContext, node: &Path) -> Result<(), CommandError> {
    if !has_ext_superblock(ctx.platform.devices.as_ref(), node)? {
        log::error!("{}: no ext filesystem found", node.display());
        return Err(CommandError::Fsck);
    }

    repair(ctx, node)
}

/// Quick format: a fresh empty filesystem on the partition's node.
pub fn format(ctx: &EngineContext, record: &PartitionRecord) -> Result<(), CommandError> {
    match record.part_type {
        PartType::Linux => {
            let device = record.device.to_string_lossy();
            let make_ext4fs = ctx.config.tool(defs::MAKE_EXT4FS);

            run_tool(
                ctx,
                &[make_ext4fs.as_str(), "-L", record.name.as_str(), &*device],
                CommandError::Format,
                |s| s == 0,
            )
        }
        _ => Err(CommandError::UnsupportedPartitionType),
    }
}
