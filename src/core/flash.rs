// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    io::{self, ErrorKind, Read, Write},
    path::Path,
};

use anyhow::{Result, bail};
use flate2::read::MultiGzDecoder;

use super::{
    context::EngineContext,
    error::CommandError,
    ext4,
    platform::StitchUpdater,
};
use crate::{
    conf::cmdline::atoi,
    defs,
    storage::{PartType, PartitionRecord},
};

#[derive(Debug, PartialEq, Eq)]

pub enum FlashTarget<'a> {
    /// The whole disk node; the image carries its own partition table.
    Disk,
    /// Slot in a stitched multi-kernel image, handled by the platform.
    Stitched(u32),
    Partition(&'a PartitionRecord),
}

pub fn resolve<'a>(ctx: &'a EngineContext, name: &str) -> Result<FlashTarget<'a>, CommandError> {
    if name == defs::DISK_TARGET {
        return Ok(FlashTarget::Disk);
    }

    if let Some(index) = name.strip_prefix(defs::STITCH_PREFIX) {
        let index = u32::try_from(atoi(index)).map_err(|_| CommandError::StitchImage)?;
        return Ok(FlashTarget::Stitched(index));
    }

    ctx.disk
        .find_partition(name)
        .map(FlashTarget::Partition)
        .ok_or(CommandError::UnknownPartition)
}

/// gzip member header (RFC 1952) with the deflate method.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() > defs::GZIP_METHOD_OFFSET
        && data[..2] == defs::GZIP_MAGIC
        && data[defs::GZIP_METHOD_OFFSET] == defs::GZIP_METHOD_DEFLATE
}

fn write_block<W: Write + ?Sized>(sink: &mut W, block: &[u8]) -> Result<(), CommandError> {
    loop {
        match sink.write(block) {
            Ok(n) if n == block.len() => return Ok(()),
            Ok(n) => {
                log::error!("short write: {} of {} bytes accepted", n, block.len());
                return Err(CommandError::ImageWrite);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("write: {}", e);
                return Err(CommandError::ImageWrite);
            }
        }
    }
}

fn fill_buffer<R: Read>(buffer: &mut [u8], input: &mut R) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buffer.len() {
        match input.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Streams `data` to `sink` in fixed-size blocks, inflating every member of
/// a gzip payload on the way. Returns the number of bytes written to the sink.
pub fn write_image<W: Write + ?Sized>(sink: &mut W, data: &[u8]) -> Result<u64, CommandError> {
    let mut written: u64 = 0;

    if is_gzip(data) {
        log::debug!("gzip payload, decompressing");

        let mut decoder = MultiGzDecoder::new(data);
        let mut buffer = vec![0u8; defs::WRITE_BLOCK_SIZE];

        loop {
            let filled = fill_buffer(&mut buffer, &mut decoder).map_err(|e| {
                log::error!("decompression failed at offset {}: {}", written, e);
                CommandError::ImageWrite
            })?;

            if filled == 0 {
                break;
            }

            write_block(sink, &buffer[..filled])?;
            written += filled as u64;
        }
    } else {
        for block in data.chunks(defs::WRITE_BLOCK_SIZE) {
            write_block(sink, block)?;
            written += block.len() as u64;
        }
    }

    sink.flush().map_err(|e| {
        log::error!("flush: {}", e);
        CommandError::ImageWrite
    })?;

    Ok(written)
}

fn write_to_device(ctx: &EngineContext, device: &Path, data: &[u8]) -> Result<(), CommandError> {
    let devices = ctx.platform.devices.as_ref();

    log::debug!("Writing {} bytes to destination device: {}", data.len(), device.display());

    if !devices.is_valid(device) {
        return Err(CommandError::InvalidDestination);
    }

    let mut sink = devices.open_write(device).map_err(|e| {
        log::error!("open {}: {}", device.display(), e);
        CommandError::OpenDevice
    })?;

    let written = write_image(sink.as_mut(), data)?;
    drop(sink);

    devices.sync();

    log::debug!("wrote {} bytes to {}", written, device.display());

    Ok(())
}

/// The `flash:<name>` workflow. On success the destination holds the
/// image and, for ext partitions, a filesystem sized to the partition.
pub fn flash(ctx: &EngineContext, name: &str, data: &[u8]) -> Result<(), CommandError> {
    let record = match resolve(ctx, name)? {
        FlashTarget::Stitched(index) => {
            log::info!("Update stitched image entry {}", index);

            return ctx
                .platform
                .stitcher
                .write_stitch_image(data, index)
                .map_err(|e| {
                    log::error!("write_stitch_image: {:#}", e);
                    CommandError::StitchImage
                });
        }
        FlashTarget::Disk => None,
        FlashTarget::Partition(record) => Some(record),
    };

    if let Some(record) = record {
        if record.part_type == PartType::Extended {
            return Err(CommandError::UnsupportedPartitionType);
        }
    }

    let disk = ctx.disk.disk_device();
    let device = match record {
        Some(_) => ctx
            .disk
            .resolve_device_node(name)
            .ok_or(CommandError::UnknownPartition)?,
        None => disk.to_path_buf(),
    };
    let device = device.as_path();

    write_to_device(ctx, device, data)?;

    if device == disk {
        log::debug!("sync partition table");
        ctx.platform
            .devices
            .reread_partition_table(device)
            .map_err(|e| {
                log::error!("{:#}", e);
                CommandError::OpenDevice
            })?;
    }

    if let Some(record) = record {
        if record.part_type == PartType::Linux
            && ext4::has_ext_superblock(ctx.platform.devices.as_ref(), device)?
        {
            ext4::repair(ctx, device)?;
        }
    }

    Ok(())
}

/// Platforms without stitched-image support.
#[derive(Debug, Default)]

pub struct NoStitchedImages;

impl StitchUpdater for NoStitchedImages {
    fn write_stitch_image(&self, data: &[u8], index: u32) -> Result<()> {
        bail!(
            "stitched images are not supported on this platform ({} bytes for entry {})",
            data.len(),
            index
        )
    }
}

#[cfg(test)]
mod tests {
    use flate2::{Compression, write::GzEncoder};

    use super::*;
    use crate::core::testing::{self, Harness, ShortWriter};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_detection_needs_magic_and_deflate() {
        assert!(is_gzip(&gzip(b"payload")));
        assert!(!is_gzip(&[0x1f, 0x8b]));
        assert!(!is_gzip(&[0x1f, 0x8b, 0x07, 0x00]));
        assert!(!is_gzip(b"plain image bytes"));
    }

    #[test]
    fn raw_payload_is_written_unchanged() {
        let h = Harness::new();
        let ctx = h.context();
        let image: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

        flash(&ctx, "boot", &image).unwrap();

        assert_eq!(std::fs::read(h.node("boot")).unwrap(), image);
        assert_eq!(h.devices.syncs(), 1);
    }

    #[test]
    fn gzip_payload_is_inflated() {
        let h = Harness::new();
        let ctx = h.context();
        let image = vec![0xa5u8; 3 * defs::WRITE_BLOCK_SIZE + 17];

        flash(&ctx, "boot", &gzip(&image)).unwrap();

        assert_eq!(std::fs::read(h.node("boot")).unwrap(), image);
    }

    #[test]
    fn every_gzip_member_is_inflated() {
        let h = Harness::new();
        let ctx = h.context();
        let first = vec![0x11u8; 10_000];
        let second: Vec<u8> = (0..10_000u32).map(|i| (i % 13) as u8).collect();

        let mut payload = gzip(&first);
        payload.extend(gzip(&second));

        let mut sink = Vec::new();
        assert_eq!(write_image(&mut sink, &payload), Ok(20_000));
        assert_eq!(sink[..10_000], first[..]);
        assert_eq!(sink[10_000..], second[..]);

        flash(&ctx, "boot", &payload).unwrap();
        assert_eq!(std::fs::read(h.node("boot")).unwrap(), sink);
    }

    #[test]
    fn corrupt_gzip_fails_the_write() {
        let mut data = gzip(&vec![1u8; 64 * 1024]);
        let len = data.len();
        data.truncate(len / 2);

        let mut sink = Vec::new();
        assert_eq!(write_image(&mut sink, &data), Err(CommandError::ImageWrite));
    }

    #[test]
    fn short_write_is_a_failure() {
        let mut sink = ShortWriter::new(100);

        assert_eq!(write_image(&mut sink, &[7u8; 1000]), Err(CommandError::ImageWrite));
        assert_eq!(sink.accepted(), 100);
    }

    #[test]
    fn unknown_partition_touches_nothing() {
        let h = Harness::new();
        let ctx = h.context();

        assert_eq!(flash(&ctx, "bogus", b"x"), Err(CommandError::UnknownPartition));
        assert_eq!(h.devices.io_count(), 0);
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn extended_partition_is_rejected_before_writing() {
        let h = Harness::new();
        let ctx = h.context();

        assert_eq!(
            flash(&ctx, "extended", b"0123456789"),
            Err(CommandError::UnsupportedPartitionType)
        );
        assert_eq!(h.devices.io_count(), 0);
    }

    #[test]
    fn invalid_node_is_rejected() {
        let h = Harness::new();
        h.devices.invalidate(&h.node("boot"));
        let ctx = h.context();

        assert_eq!(flash(&ctx, "boot", b"data"), Err(CommandError::InvalidDestination));
    }

    #[test]
    fn disk_flash_rereads_partition_table() {
        let h = Harness::new();
        let ctx = h.context();

        flash(&ctx, "disk", b"new table").unwrap();

        assert_eq!(h.devices.rereads(), vec![h.disk()]);
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn linux_partition_without_magic_skips_repair() {
        let h = Harness::new();
        let ctx = h.context();

        flash(&ctx, "cache", &[0u8; 4096]).unwrap();

        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn linux_partition_with_magic_is_repaired() {
        let h = Harness::new();
        let ctx = h.context();

        flash(&ctx, "data", &testing::ext_image()).unwrap();

        assert_eq!(h.runner.programs().len(), 3);
    }

    #[test]
    fn non_linux_partition_never_repaired() {
        let h = Harness::new();
        let ctx = h.context();

        flash(&ctx, "boot", &testing::ext_image()).unwrap();

        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn repair_failure_propagates() {
        let h = Harness::new();
        h.runner.set_status("/system/bin/resize2fs", 1);
        let ctx = h.context();

        assert_eq!(flash(&ctx, "data", &testing::ext_image()), Err(CommandError::Resize));
    }

    #[test]
    fn stitched_index_goes_to_platform() {
        let h = Harness::new();
        let ctx = h.context();

        flash(&ctx, "osip3", b"stitched").unwrap();

        assert_eq!(h.stitcher.entries(), vec![(3, 8)]);
        assert_eq!(h.devices.io_count(), 0);
    }

    #[test]
    fn stitched_failure_reason() {
        assert!(NoStitchedImages.write_stitch_image(b"x", 0).is_err());

        let h = Harness::new();
        h.stitcher.fail();
        let ctx = h.context();

        assert_eq!(flash(&ctx, "osip0", b"x"), Err(CommandError::StitchImage));
    }

    #[test]
    fn oversized_stitched_index_is_rejected() {
        let h = Harness::new();
        let ctx = h.context();

        assert_eq!(flash(&ctx, "osip4294967296", b"x"), Err(CommandError::StitchImage));
        assert_eq!(flash(&ctx, "osip-1", b"x"), Err(CommandError::StitchImage));
        assert!(h.stitcher.entries().is_empty());
    }
}
