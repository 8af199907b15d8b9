// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

mod conf;
mod core;
mod defs;
mod storage;
mod transport;
mod utils;

use std::{
    fs::{File, OpenOptions},
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;

use crate::{
    conf::{
        cli::{Cli, Commands},
        cmdline,
        config::Config,
    },
    core::{
        battery, boot, commands,
        context::EngineContext,
        dispatch::Dispatcher,
        input,
        provision::{self, UpdateOutcome},
        system,
    },
    storage::{PartitionDirectory, layout::DiskLayout, volume::VolumeTable},
    transport::Session,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const REOPEN_DELAY: Duration = Duration::from_secs(1);

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(config_path) = &cli.config {
        return Config::from_file(config_path);
    }
    match Config::load_default() {
        Ok(config) => Ok(config),
        Err(e) => {
            if Path::new(defs::CONFIG_FILE_DEFAULT).exists() {
                eprintln!("Error loading config: {:#}", e);
            }
            Ok(Config::default())
        }
    }
}

/// Update check, then autoboot unless an update took over the boot.
fn startup_actions(ctx: &EngineContext) {
    if let Some(vol) = ctx.volumes.volume_for_path(defs::SDCARD_VOLUME) {
        match provision::try_update_sw(ctx, vol, true) {
            Ok(UpdateOutcome::Deferred) => {
                log::info!("Update staged, waiting for 'continue'");
                return;
            }
            Ok(outcome) => log::debug!("Update check: {:?}", outcome),
            Err(e) => log::error!("SW update failed: {:#}", e),
        }
    } else {
        log::debug!("No {} volume, skipping update check", defs::SDCARD_VOLUME);
    }

    if ctx.config.autoboot {
        boot::autoboot(ctx);
    }
}

fn open_endpoints(ctx: &EngineContext) -> Result<(File, File)> {
    let paths = &ctx.config.paths;

    let rx = File::open(&paths.usb_ep_out)
        .with_context(|| format!("Failed to open {}", paths.usb_ep_out.display()))?;
    let tx = OpenOptions::new()
        .write(true)
        .open(&paths.usb_ep_in)
        .with_context(|| format!("Failed to open {}", paths.usb_ep_in.display()))?;

    Ok((rx, tx))
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        match command {
            Commands::GenConfig { output } => {
                Config::default().save_to_file(output)?;
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = load_config(&cli)?;
                println!("{}", serde_json::to_string(&config)?);
                return Ok(());
            }
            Commands::ShowLayout => {
                let mut config = load_config(&cli)?;
                config.merge_with_cli(cli.disk_layout.clone(), false);
                let layout = DiskLayout::load(&config.paths.disk_layout)?;
                println!("{}", serde_json::to_string(layout.partitions())?);
                return Ok(());
            }
        }
    }

    let mut config = load_config(&cli)?;
    config.merge_with_cli(cli.disk_layout.clone(), cli.verbose);

    let _log_guard = utils::init_logging(config.verbose, &config.paths.log_file)?;

    if let Err(e) = cmdline::load_kernel_cmdline(&mut config, &cli.cmdline) {
        log::warn!("Kernel command line ignored: {:#}", e);
    }

    log::info!(
        " -- Droidboot {} for {} --",
        defs::DROIDBOOT_VERSION,
        config.device_name
    );

    let platform = system::platform();

    if config.min_battery > 0 {
        battery::enforce_minimum(
            &config.paths.battery_dir,
            config.min_battery,
            platform.power.as_ref(),
        )?;
    }

    let volumes = VolumeTable::load(&config.paths.fstab).unwrap_or_else(|e| {
        log::warn!("{:#}", e);
        VolumeTable::default()
    });

    let layout = DiskLayout::load(&config.paths.disk_layout).context("Disk layout unreadable")?;
    layout.dump();

    utils::ensure_dir_exists(&config.paths.run_dir)?;

    let ctx = Arc::new(EngineContext::new(config, Box::new(layout), volumes, platform));

    {
        let _guard = ctx.lock_storage();
        ctx.apply_layout(false).context("Couldn't apply disk configuration")?;
    }

    let mut dispatcher = Dispatcher::new();
    commands::register(&mut dispatcher, &ctx.config);

    input::spawn_listener(ctx.clone())?;

    let startup = ctx.clone();
    thread::Builder::new()
        .name("startup".to_string())
        .spawn(move || startup_actions(&startup))
        .context("Failed to spawn startup thread")?;

    loop {
        let (rx, tx) = open_endpoints(&ctx)?;
        let mut session = Session::new(rx, tx, ctx.config.scratch_bytes());

        log::info!("Listening for fastboot commands");
        session.serve(&ctx, &dispatcher);

        drop(session);
        log::info!("fastboot session ended, reopening endpoints");
        thread::sleep(REOPEN_DELAY);
    }
}

fn main() {
    if let Err(e) = run() {
        log::error!("Fatal Error: {:#}", e);
        eprintln!("Fatal Error: {:#}", e);
        std::process::exit(1);
    }
}
