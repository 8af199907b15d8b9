// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs::File,
    io,
    path::Path,
    process::{Command, Stdio},
};

use thiserror::Error;

use crate::defs;

#[derive(Debug, Error)]

pub enum ExecError {
    #[error("invalid command line: {0:?}")]
    InvalidCommandLine(String),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} terminated by signal")]
    Signaled(String),
}

/// Runs external maintenance programs and reports their exit status.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[&str]) -> Result<i32, ExecError>;

    /// Same as `run`, with `input` connected to the program's stdin.
    fn run_with_input(&self, argv: &[&str], input: &Path) -> Result<i32, ExecError> {
        let cmdline = format!("{} < {}", argv.join(" "), input.display());
        self.run(&shell(&cmdline))
    }
}

pub fn shell(cmdline: &str) -> Vec<&str> {
    vec![defs::SHELL, "-c", cmdline]
}

fn validate(argv: &[&str]) -> Result<(), ExecError> {
    if argv.is_empty() || argv[0].is_empty() || argv.iter().any(|a| a.contains('\0')) {
        return Err(ExecError::InvalidCommandLine(argv.join(" ")));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]

pub struct SystemRunner;

impl SystemRunner {
    fn run_command(&self, argv: &[&str], stdin: Stdio) -> Result<i32, ExecError> {
        validate(argv)?;

        log::debug!("exec: {}", argv.join(" "));

        let status = Command::new(argv[0])
            .args(&argv[1..])
            .stdin(stdin)
            .status()
            .map_err(|source| ExecError::Spawn {
                program: argv[0].to_string(),
                source,
            })?;

        match status.code() {
            Some(code) => {
                log::debug!("{} exited with {}", argv[0], code);
                Ok(code)
            }
            None => Err(ExecError::Signaled(argv[0].to_string())),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[&str]) -> Result<i32, ExecError> {
        self.run_command(argv, Stdio::null())
    }

    fn run_with_input(&self, argv: &[&str], input: &Path) -> Result<i32, ExecError> {
        let file = File::open(input).map_err(|source| ExecError::Spawn {
            program: argv.first().copied().unwrap_or_default().to_string(),
            source,
        })?;
        self.run_command(argv, Stdio::from(file))
    }
}
