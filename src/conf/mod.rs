// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod cli;
pub mod cmdline;
pub mod config;
