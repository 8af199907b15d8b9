// Copyright 2025 Droidboot Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod battery;
pub mod boot;
pub mod commands;
pub mod context;
pub mod countdown;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod ext4;
pub mod flash;
pub mod input;
pub mod platform;
pub mod provision;
pub mod system;
#[cfg(test)]
pub mod testing;
