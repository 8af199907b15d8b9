// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    convert::Infallible,
    ffi::CString,
    fs::{self, File, OpenOptions, create_dir_all},
    io::{self, Write},
    os::{fd::AsRawFd, unix::fs::FileTypeExt},
    path::Path,
};

use anyhow::{Context, Result, bail};
use rustix::mount::{MountFlags, UnmountFlags, mount, unmount};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt, fmt::MakeWriter, layer::SubscriberExt};

/// _IO(0x12, 95)
const BLKRRPART: libc::c_ulong = 0x125f;

struct KmsgWriter {
    file: File,
}

impl Write for KmsgWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Mirrors log lines to the kernel ring buffer so they survive on the
/// serial console before userspace logging exists.
struct KmsgMakeWriter;

impl<'a> MakeWriter<'a> for KmsgMakeWriter {
    type Writer = Box<dyn Write + Send>;

    fn make_writer(&'a self) -> Self::Writer {
        match File::options().write(true).open("/dev/kmsg") {
            Ok(file) => Box::new(KmsgWriter { file }),
            Err(_) => Box::new(io::sink()),
        }
    }
}

/// Routes `log` records through tracing into the log file and kmsg. The
/// returned guard flushes the file writer and must outlive the engine.
pub fn init_logging(verbose: bool, log_path: &Path) -> Result<WorkerGuard> {
    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir_exists(dir)?;

    let file_name = log_path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", log_path.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_target(false).with_writer(writer))
        .with(
            fmt::layer()
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_writer(KmsgMakeWriter),
        );

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    LogTracer::init().context("Failed to redirect log records")?;

    Ok(guard)
}

pub fn ensure_dir_exists<T: AsRef<Path>>(dir: T) -> Result<()> {
    if !dir.as_ref().exists() {
        log::debug!("Creating directory: {}", dir.as_ref().display());
        create_dir_all(&dir)?;
    }
    Ok(())
}

pub fn is_block_device(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

pub fn sync() {
    unsafe { libc::sync() };
}

pub fn reread_partition_table(device: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .with_context(|| format!("Failed to open {}", device.display()))?;

    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKRRPART as _) };

    if ret != 0 {
        bail!(
            "BLKRRPART on {} failed: {}",
            device.display(),
            io::Error::last_os_error()
        );
    }

    log::debug!("Re-read partition table of {}", device.display());
    Ok(())
}

pub fn is_mounted(target: &Path) -> bool {
    let Ok(process) = procfs::process::Process::myself() else {
        return false;
    };

    match process.mountinfo() {
        Ok(mounts) => mounts.0.iter().any(|m| m.mount_point == target),
        Err(e) => {
            log::warn!("Failed to read mountinfo: {}", e);
            false
        }
    }
}

pub fn mount_device(device: &Path, fs_type: &str, target: &Path) -> Result<()> {
    ensure_dir_exists(target)?;

    if is_mounted(target) {
        log::debug!("{} already mounted", target.display());
        return Ok(());
    }

    log::debug!("Mounting {} ({}) at {}", device.display(), fs_type, target.display());

    mount(device, target, fs_type, MountFlags::empty(), "").with_context(|| {
        format!("Failed to mount {} on {}", device.display(), target.display())
    })?;

    Ok(())
}

pub fn unmount_target(target: &Path) -> Result<()> {
    unmount(target, UnmountFlags::empty())
        .with_context(|| format!("Failed to unmount {}", target.display()))?;
    Ok(())
}

/// Restarts the device, passing `arg` to the kernel restart handler when
/// given.
pub fn reboot(arg: Option<&str>) -> Result<Infallible> {
    sync();

    let ret = match arg {
        Some(arg) => {
            let arg = CString::new(arg)?;
            unsafe {
                libc::syscall(
                    libc::SYS_reboot,
                    libc::LINUX_REBOOT_MAGIC1,
                    libc::LINUX_REBOOT_MAGIC2,
                    libc::LINUX_REBOOT_CMD_RESTART2,
                    arg.as_ptr(),
                )
            }
        }
        None => unsafe {
            libc::syscall(
                libc::SYS_reboot,
                libc::LINUX_REBOOT_MAGIC1,
                libc::LINUX_REBOOT_MAGIC2,
                libc::LINUX_REBOOT_CMD_RESTART,
                0,
            )
        },
    };

    bail!("reboot returned {}: {}", ret, io::Error::last_os_error())
}

pub fn power_off() -> Result<Infallible> {
    sync();

    let ret = unsafe {
        libc::syscall(
            libc::SYS_reboot,
            libc::LINUX_REBOOT_MAGIC1,
            libc::LINUX_REBOOT_MAGIC2,
            libc::LINUX_REBOOT_CMD_POWER_OFF,
            0,
        )
    };

    bail!("power off returned {}: {}", ret, io::Error::last_os_error())
}
