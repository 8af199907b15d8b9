// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::defs::{CONFIG_FILE_DEFAULT, KERNEL_CMDLINE};

#[derive(Parser, Debug)]
#[command(name = "droidboot", version, about = "Fastboot flashing engine and boot orchestrator")]

pub struct Cli {
    /// Disk layout description; overrides the configured path.
    pub disk_layout: Option<PathBuf>,
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    #[arg(long = "cmdline", default_value = KERNEL_CMDLINE)]
    pub cmdline: PathBuf,
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]

pub enum Commands {
    GenConfig {
        #[arg(short = 'o', long = "output", default_value = CONFIG_FILE_DEFAULT)]
        output: PathBuf,
    },
    ShowConfig,
    ShowLayout,
}
