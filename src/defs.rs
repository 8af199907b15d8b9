// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub const DROIDBOOT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CONFIG_FILE_DEFAULT: &str = "/etc/droidboot.toml";

pub const DISK_LAYOUT_DEFAULT: &str = "/etc/disk_layout.toml";

pub const FSTAB_DEFAULT: &str = "/etc/recovery.fstab";

pub const KERNEL_CMDLINE: &str = "/proc/cmdline";

pub const LOG_FILE: &str = "/tmp/droidboot.log";

pub const RUN_DIR: &str = "/tmp/droidboot/";

pub const MOUNT_ROOT: &str = "/mnt";

pub const TOOLS_DIR: &str = "/system/bin";

pub const INPUT_DIR: &str = "/dev/input";

pub const BATTERY_DIR: &str = "/sys/class/power_supply/battery";

pub const USB_EP_OUT: &str = "/dev/usb-ffs/fastboot/ep2";

pub const USB_EP_IN: &str = "/dev/usb-ffs/fastboot/ep1";

pub const CACHE_PTN: &str = "cache";

pub const DATA_PTN: &str = "data";

pub const SDCARD_VOLUME: &str = "/sdcard";

pub const SECOND_STAGE_DIR: &str = "2ndstageboot";

pub const AUTO_UPDATE_SUFFIX: &str = ".auto-ota.zip";

pub const DISK_TARGET: &str = "disk";

pub const STITCH_PREFIX: &str = "osip";

pub const OEM_SYSTEM: &str = "system";

pub const OEM_PARTITION: &str = "partition";

pub const MEGABYTE: usize = 1024 * 1024;

pub const WRITE_BLOCK_SIZE: usize = 8192;

pub const EXT_SUPERBLOCK_OFFSET: u64 = 1024;

pub const EXT_SUPERBLOCK_SIZE: usize = 1024;

pub const EXT_MAGIC_OFFSET: usize = 0x38;

pub const EXT_SUPER_MAGIC: u16 = 0xEF53;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub const GZIP_METHOD_OFFSET: usize = 2;

pub const GZIP_METHOD_DEFLATE: u8 = 8;

pub const MAKE_EXT4FS: &str = "make_ext4fs";

pub const RESIZE2FS: &str = "resize2fs";

pub const E2FSCK: &str = "e2fsck";

pub const TUNE2FS: &str = "tune2fs";

pub const KEXEC: &str = "kexec";

pub const SFDISK: &str = "sfdisk";

pub const SHELL: &str = "/system/bin/sh";

pub const RECOVERY_COMMAND_FILE: &str = "recovery/command";
