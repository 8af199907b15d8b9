// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use super::executor::ExecError;

/// Command-path failures. `Display` is the reason sent back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]

pub enum CommandError {
    #[error("unknown partition specified")]
    UnknownPartition,
    #[error("unknown partition name")]
    UnknownPartitionName,
    #[error("invalid destination node. partition disks?")]
    InvalidDestination,
    #[error("Unsupported partition type")]
    UnsupportedPartitionType,
    #[error("memory allocation error")]
    CommandLine,
    #[error("could not open device node")]
    OpenDevice,
    #[error("image write failure")]
    ImageWrite,
    #[error("could not seek to superblock offset")]
    SuperblockSeek,
    #[error("couldn't read superblock")]
    SuperblockRead,
    #[error("could not resize filesystem to fill disk")]
    Resize,
    #[error("fsck of filesystem failed")]
    Fsck,
    #[error("tune2fs failed")]
    Tune,
    #[error("make_ext4fs failed")]
    Format,
    #[error("write_stitch_image failure")]
    StitchImage,
}

impl CommandError {
    /// Maps a runner error for one of the maintenance tools: a command line
    /// that cannot be built is a resource error, anything else is the
    /// step's own failure.
    pub fn from_exec(err: &ExecError, step: CommandError) -> CommandError {
        log::error!("{}", err);

        match err {
            ExecError::InvalidCommandLine(_) => CommandError::CommandLine,
            _ => step,
        }
    }
}
