// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Neovim environment bootstrap and configuration sync.
//!
//! Nvsync gets a personal Neovim setup onto a machine, and keeps it in sync
//! across machines afterwards:
//!
//! - [`context`] probes the host into an immutable snapshot.
//! - [`bootstrap`] picks a way to install the editor binary that works with
//!   the host's C runtime, installs it, and verifies it runs.
//! - [`sync`] clones, pushes, and pulls the configuration checkout.
//! - [`setup`] ties everything together for a fresh machine.
//! - [`health`] reports what is installed.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod health;
pub mod path;
pub mod setup;
pub mod sync;
pub mod syscall;
