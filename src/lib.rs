// SPDX-License-Identifier: GPL-3.0-or-later

pub mod backend;
pub mod bench;
pub mod cli;
pub mod config;
pub mod modeline;
