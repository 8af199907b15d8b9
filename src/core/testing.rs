// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory stand-ins for the platform seams, plus a harness that lays out
//! a fake disk of regular files in a temporary directory.

use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow, bail};
use tempfile::TempDir;

use super::{
    context::EngineContext,
    dispatch::{ReplyKind, ReplySink},
    executor::{CommandRunner, ExecError},
    platform::{
        DeviceAccess, DeviceFile, KernelLoader, Platform, Power, Progress, RebootMode,
        StitchUpdater, UpdateApplier,
    },
};
use crate::{
    conf::config::Config,
    defs,
    storage::{PartitionDirectory, layout::DiskLayout, volume::VolumeTable},
};

/// Ordered record of externally visible events shared between fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]

pub struct FakeRunner {
    statuses: Mutex<HashMap<String, i32>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn with_status(self, program: &str, status: i32) -> Self {
        self.set_status(program, status);
        self
    }

    pub fn set_status(&self, program: &str, status: i32) {
        self.statuses
            .lock()
            .unwrap()
            .insert(program.to_string(), status);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|argv| argv[0].clone()).collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[&str]) -> Result<i32, ExecError> {
        if argv.is_empty() {
            return Err(ExecError::InvalidCommandLine(String::new()));
        }

        self.calls
            .lock()
            .unwrap()
            .push(argv.iter().map(|a| a.to_string()).collect());

        Ok(self.statuses.lock().unwrap().get(argv[0]).copied().unwrap_or(0))
    }

    fn run_with_input(&self, argv: &[&str], _input: &Path) -> Result<i32, ExecError> {
        self.run(argv)
    }
}

/// Device access over regular files. Mounting a directory copies its files
/// into the target, which stands in for the mounted filesystem.
#[derive(Default)]

pub struct FakeDevices {
    invalid: Mutex<HashSet<PathBuf>>,
    unmountable: Mutex<HashSet<PathBuf>>,
    io: AtomicUsize,
    syncs: AtomicUsize,
    rereads: Mutex<Vec<PathBuf>>,
    mounts: Mutex<Vec<(PathBuf, String, PathBuf)>>,
    unmounts: Mutex<Vec<PathBuf>>,
}

impl FakeDevices {
    pub fn invalidate(&self, node: &Path) {
        self.invalid.lock().unwrap().insert(node.to_path_buf());
    }

    pub fn fail_mount(&self, device: &Path) {
        self.unmountable.lock().unwrap().insert(device.to_path_buf());
    }

    pub fn io_count(&self) -> usize {
        self.io.load(Ordering::SeqCst)
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    pub fn rereads(&self) -> Vec<PathBuf> {
        self.rereads.lock().unwrap().clone()
    }

    pub fn mounts(&self) -> Vec<(PathBuf, String, PathBuf)> {
        self.mounts.lock().unwrap().clone()
    }

    pub fn unmounts(&self) -> Vec<PathBuf> {
        self.unmounts.lock().unwrap().clone()
    }
}

impl DeviceAccess for FakeDevices {
    fn is_valid(&self, node: &Path) -> bool {
        !self.invalid.lock().unwrap().contains(node)
    }

    fn open_write(&self, node: &Path) -> io::Result<Box<dyn Write + Send>> {
        self.io.fetch_add(1, Ordering::SeqCst);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(node)?;
        Ok(Box::new(file))
    }

    fn open_read(&self, node: &Path) -> io::Result<Box<dyn DeviceFile>> {
        self.io.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(File::open(node)?))
    }

    fn sync(&self) {
        self.syncs.fetch_add(1, Ordering::SeqCst);
    }

    fn reread_partition_table(&self, node: &Path) -> Result<()> {
        self.rereads.lock().unwrap().push(node.to_path_buf());
        Ok(())
    }

    fn mount(&self, device: &Path, fs_type: &str, target: &Path) -> Result<()> {
        if self.unmountable.lock().unwrap().contains(device) {
            bail!("mount {} failed", device.display());
        }

        fs::create_dir_all(target)?;

        if device.is_dir() {
            for entry in fs::read_dir(device)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::copy(entry.path(), target.join(entry.file_name()))?;
                }
            }
        }

        self.mounts.lock().unwrap().push((
            device.to_path_buf(),
            fs_type.to_string(),
            target.to_path_buf(),
        ));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.unmounts.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]

pub struct FakeProgress {
    resets: AtomicUsize,
    indeterminate: AtomicUsize,
    text: Mutex<Vec<bool>>,
}

impl FakeProgress {
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn indeterminate(&self) -> usize {
        self.indeterminate.load(Ordering::SeqCst)
    }

    pub fn text(&self) -> Vec<bool> {
        self.text.lock().unwrap().clone()
    }
}

impl Progress for FakeProgress {
    fn show_progress(&self, _portion: f32, _seconds: u32) {}

    fn show_indeterminate(&self) {
        self.indeterminate.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn show_text(&self, visible: bool) {
        self.text.lock().unwrap().push(visible);
    }
}

pub struct FakePower {
    journal: Journal,
    restarts: Mutex<Vec<RebootMode>>,
    power_offs: AtomicUsize,
}

impl FakePower {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            restarts: Mutex::new(Vec::new()),
            power_offs: AtomicUsize::new(0),
        }
    }

    pub fn restarts(&self) -> Vec<RebootMode> {
        self.restarts.lock().unwrap().clone()
    }

    pub fn power_offs(&self) -> usize {
        self.power_offs.load(Ordering::SeqCst)
    }
}

impl Power for FakePower {
    fn restart(&self, mode: RebootMode) -> Result<Infallible> {
        self.journal.lock().unwrap().push(format!("restart {:?}", mode));
        self.restarts.lock().unwrap().push(mode);
        Err(anyhow!("restart is not available in tests"))
    }

    fn power_off(&self) -> Result<Infallible> {
        self.journal.lock().unwrap().push("power off".to_string());
        self.power_offs.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("power off is not available in tests"))
    }
}

#[derive(Default)]

pub struct FakeLoader {
    bases: Mutex<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn bases(&self) -> Vec<PathBuf> {
        self.bases.lock().unwrap().clone()
    }
}

impl KernelLoader for FakeLoader {
    fn exec(&self, _ctx: &EngineContext, base: &Path) -> Result<Infallible> {
        self.bases.lock().unwrap().push(base.to_path_buf());
        Err(anyhow!("kexec is not available in tests"))
    }
}

#[derive(Default)]

pub struct FakeApplier {
    packages: Mutex<Vec<String>>,
    locked: Mutex<Vec<bool>>,
    failing: AtomicBool,
}

impl FakeApplier {
    pub fn packages(&self) -> Vec<String> {
        self.packages.lock().unwrap().clone()
    }

    /// Storage lock state observed by each `apply` call.
    pub fn locked(&self) -> Vec<bool> {
        self.locked.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl UpdateApplier for FakeApplier {
    fn apply(&self, ctx: &EngineContext, package: &str) -> Result<()> {
        self.packages.lock().unwrap().push(package.to_string());
        self.locked.lock().unwrap().push(ctx.storage_is_locked());
        if self.failing.load(Ordering::SeqCst) {
            bail!("applying {} failed", package);
        }
        Ok(())
    }
}

#[derive(Default)]

pub struct FakeStitcher {
    entries: Mutex<Vec<(u32, usize)>>,
    failing: AtomicBool,
}

impl FakeStitcher {
    pub fn entries(&self) -> Vec<(u32, usize)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl StitchUpdater for FakeStitcher {
    fn write_stitch_image(&self, data: &[u8], index: u32) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("stitch entry {} rejected", index);
        }
        self.entries.lock().unwrap().push((index, data.len()));
        Ok(())
    }
}

/// Accepts at most `limit` bytes, then reports zero-length writes.
pub struct ShortWriter {
    limit: usize,
    accepted: usize,
}

impl ShortWriter {
    pub fn new(limit: usize) -> Self {
        Self { limit, accepted: 0 }
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }
}

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.limit - self.accepted);
        self.accepted += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures protocol replies, optionally into a shared journal.
#[derive(Default)]

pub struct RecordingSink {
    replies: Vec<(ReplyKind, String)>,
    journal: Option<Journal>,
}

impl RecordingSink {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            replies: Vec::new(),
            journal: Some(journal),
        }
    }

    pub fn replies(&self) -> Vec<(ReplyKind, String)> {
        self.replies.clone()
    }
}

impl ReplySink for RecordingSink {
    fn send(&mut self, kind: ReplyKind, message: &str) -> io::Result<()> {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("{}{}", kind.prefix(), message));
        }
        self.replies.push((kind, message.to_string()));
        Ok(())
    }
}

/// 4 KiB buffer carrying an ext superblock magic.
pub fn ext_image() -> Vec<u8> {
    let mut image = vec![0u8; 4096];
    let at = defs::EXT_SUPERBLOCK_OFFSET as usize + defs::EXT_MAGIC_OFFSET;
    image[at..at + 2].copy_from_slice(&defs::EXT_SUPER_MAGIC.to_le_bytes());
    image
}

pub fn write_ext_image(path: &Path) {
    fs::write(path, ext_image()).unwrap();
}

pub const UPDATE_FILE: &str = "testdev.auto-ota.zip";

/// Disk `mmcblk0` with boot (raw), cache, data and an extended partition,
/// each backed by a 4 KiB file. The removable card is a directory.
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub runner: Arc<FakeRunner>,
    pub devices: Arc<FakeDevices>,
    pub power: Arc<FakePower>,
    pub progress: Arc<FakeProgress>,
    pub loader: Arc<FakeLoader>,
    pub applier: Arc<FakeApplier>,
    pub stitcher: Arc<FakeStitcher>,
    pub journal: Journal,
    layout: DiskLayout,
    volumes: VolumeTable,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("mmcblk0");

        let layout = DiskLayout::parse(&format!(
            "device = {:?}\n\
             [[partition]]\nname = \"boot\"\ntype = \"0x48\"\nlen_kb = 16384\n\
             [[partition]]\nname = \"cache\"\ntype = \"linux\"\nlen_kb = 65536\n\
             [[partition]]\nname = \"extended\"\ntype = \"extended\"\nlen_kb = 1\n\
             [[partition]]\nname = \"data\"\ntype = \"linux\"\n",
            disk.to_string_lossy()
        ))
        .unwrap();

        fs::write(&disk, vec![0u8; 4096]).unwrap();
        for p in layout.partitions() {
            fs::write(&p.device, vec![0u8; 4096]).unwrap();
        }

        let media = dir.path().join("media");
        fs::create_dir(&media).unwrap();

        let node = |name: &str| layout.resolve_device_node(name).unwrap();
        let volumes = VolumeTable::parse(&format!(
            "/cache ext4 {}\n/data ext4 {}\n/sdcard vfat {}\n",
            node("cache").display(),
            node("data").display(),
            media.display()
        ))
        .unwrap();

        let mut config = Config::default();
        config.device_name = "testdev".to_string();
        config.autoboot_delay_secs = 0;
        config.paths.mount_root = dir.path().join("mnt");
        config.paths.run_dir = dir.path().join("run");
        config.paths.input_dir = dir.path().join("input");
        config.paths.battery_dir = dir.path().join("battery");
        config.paths.log_file = dir.path().join("droidboot.log");

        let journal = Journal::default();

        Self {
            config,
            runner: Arc::default(),
            devices: Arc::default(),
            power: Arc::new(FakePower::new(journal.clone())),
            progress: Arc::default(),
            loader: Arc::default(),
            applier: Arc::default(),
            stitcher: Arc::default(),
            journal,
            layout,
            volumes,
            dir,
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            runner: self.runner.clone(),
            devices: self.devices.clone(),
            power: self.power.clone(),
            progress: self.progress.clone(),
            loader: self.loader.clone(),
            applier: self.applier.clone(),
            stitcher: self.stitcher.clone(),
            provision_hook: None,
        }
    }

    pub fn context(&self) -> EngineContext {
        EngineContext::new(
            self.config.clone(),
            Box::new(self.layout.clone()),
            self.volumes.clone(),
            self.platform(),
        )
    }

    pub fn context_with_hook(
        &self,
        hook: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> EngineContext {
        let mut platform = self.platform();
        platform.provision_hook = Some(Box::new(hook));

        EngineContext::new(
            self.config.clone(),
            Box::new(self.layout.clone()),
            self.volumes.clone(),
            platform,
        )
    }

    pub fn node(&self, name: &str) -> PathBuf {
        self.layout.resolve_device_node(name).unwrap()
    }

    pub fn disk(&self) -> PathBuf {
        self.layout.disk_device().to_path_buf()
    }

    /// Backing directory of the removable card.
    pub fn media(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub fn volumes(&self) -> &VolumeTable {
        &self.volumes
    }
}
