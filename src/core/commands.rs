// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol command handlers and the variables published to the host.

use super::{
    boot,
    context::EngineContext,
    dispatch::{Dispatcher, Reply},
    error::CommandError,
    executor::shell,
    ext4, flash,
    platform::RebootMode,
};
use crate::{conf::config::Config, defs};

pub fn register(dispatcher: &mut Dispatcher, config: &Config) {
    dispatcher.register("oem", cmd_oem);
    dispatcher.register("boot", cmd_boot);
    dispatcher.register("reboot", cmd_reboot);
    dispatcher.register("reboot-bootloader", cmd_reboot_bootloader);
    dispatcher.register("erase:", cmd_erase);
    dispatcher.register("flash:", cmd_flash);
    dispatcher.register("continue", cmd_continue);

    dispatcher.publish("product", &config.device_name);
    dispatcher.publish("kernel", "droidboot");
    dispatcher.publish("version", "0.4");
    dispatcher.publish("version-bootloader", defs::DROIDBOOT_VERSION);
    dispatcher.publish("max-download-size", &format!("0x{:08x}", config.scratch_bytes()));
}

fn cmd_flash(ctx: &EngineContext, name: &str, data: &[u8], reply: &mut Reply<'_>) {
    log::info!("flash: {} ({} bytes)", name, data.len());
    reply.result(flash::flash(ctx, name, data));
}

/// Quick format of a Linux partition.
pub fn erase(ctx: &EngineContext, name: &str) -> Result<(), CommandError> {
    let record = ctx
        .disk
        .find_partition(name)
        .ok_or(CommandError::UnknownPartitionName)?;

    if !ctx.platform.devices.is_valid(&record.device) {
        return Err(CommandError::InvalidDestination);
    }

    ext4::format(ctx, record)
}

fn cmd_erase(ctx: &EngineContext, name: &str, _data: &[u8], reply: &mut Reply<'_>) {
    log::info!("erase: {}", name);
    reply.result(erase(ctx, name));
}

fn cmd_oem(ctx: &EngineContext, arg: &str, _data: &[u8], reply: &mut Reply<'_>) {
    let command = arg.trim_start();

    if let Some(cmdline) = command.strip_prefix(defs::OEM_SYSTEM) {
        let cmdline = cmdline.trim_start();
        log::info!("oem system: {}", cmdline);

        match ctx.platform.runner.run(&shell(cmdline)) {
            Ok(0) => reply.okay(""),
            Ok(status) => {
                reply.info(&format!("exit status {}", status));
                reply.fail("OEM system command failed");
            }
            Err(e) => {
                log::error!("{}", e);
                reply.fail("OEM system command failed");
            }
        }
    } else if command.starts_with(defs::OEM_PARTITION) {
        match ctx.apply_layout(false) {
            Ok(()) => reply.okay(""),
            Err(e) => {
                log::error!("{:#}", e);
                reply.fail("apply_disk_config error");
            }
        }
    } else {
        reply.fail("unknown OEM command");
    }
}

fn cmd_boot(_ctx: &EngineContext, _arg: &str, _data: &[u8], reply: &mut Reply<'_>) {
    reply.fail("boot command stubbed on this platform!");
}

fn restart(ctx: &EngineContext, mode: RebootMode, reply: &mut Reply<'_>) {
    reply.okay("");
    ctx.platform.devices.sync();

    log::info!("Rebooting!");

    let Err(e) = ctx.platform.power.restart(mode);
    log::error!("Reboot failed: {:#}", e);
}

fn cmd_reboot(ctx: &EngineContext, _arg: &str, _data: &[u8], reply: &mut Reply<'_>) {
    restart(ctx, RebootMode::Android, reply);
}

fn cmd_reboot_bootloader(ctx: &EngineContext, _arg: &str, _data: &[u8], reply: &mut Reply<'_>) {
    restart(ctx, RebootMode::Restart, reply);
}

/// Applies an update deferred by provisioning, otherwise launches the
/// second-stage kernel.
fn cmd_continue(ctx: &EngineContext, _arg: &str, _data: &[u8], reply: &mut Reply<'_>) {
    if let Some(package) = ctx.pending_update() {
        reply.info(&format!("applying {}", package));

        match ctx.platform.applier.apply(ctx, package) {
            Ok(()) => reply.okay(""),
            Err(e) => {
                log::error!("{:#}", e);
                reply.fail("Unable to apply update");
            }
        }
        return;
    }

    ctx.platform.progress.reset();
    ctx.platform.progress.show_text(true);

    let Err(e) = boot::start_default_kernel(ctx);
    log::error!("{:#}", e);
    reply.fail("Unable to boot default kernel!");
}
