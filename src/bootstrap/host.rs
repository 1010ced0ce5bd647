// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host capabilities used by the bootstrap resolver.
//!
//! The resolver never shells out on its own. Every side effect goes through
//! the [`Installer`] trait, so the decision logic can be exercised without a
//! real machine. [`SystemInstaller`] is the implementation that actually talks
//! to apt, brew, pip, curl, and the filesystem.

use crate::{
    config::{NetworkSettings, Settings},
    syscall::{privileged, syscall_interactive, syscall_non_interactive, SyscallError},
};

use serde::Deserialize;
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};
use tracing::{debug, instrument, warn};

/// Package managers nvsync knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// Debian package manager.
    Apt,

    /// Homebrew.
    Brew,

    /// Python package installer, user scope.
    Pip,
}

impl Display for PackageManager {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Apt => fmt.write_str("apt"),
            Self::Brew => fmt.write_str("brew"),
            Self::Pip => fmt.write_str("pip"),
        }
    }
}

/// Layer of indirection for host side effects.
pub trait Installer {
    /// Refresh package index of package manager.
    fn update_index(&self, manager: PackageManager) -> Result<()>;

    /// Install packages through package manager.
    fn install_packages(&self, manager: PackageManager, packages: &[String]) -> Result<()>;

    /// Remove packages through package manager.
    fn remove_packages(&self, manager: PackageManager, packages: &[String]) -> Result<()>;

    /// Register third-party package source.
    fn add_package_repository(&self, repository: &str) -> Result<()>;

    /// Query release metadata endpoint for the latest release tag.
    fn latest_release(&self, api: &str) -> Result<String>;

    /// Download artifact at URL into destination file.
    fn fetch_artifact(&self, url: &str, destination: &Path) -> Result<()>;

    /// Install file as executable at destination.
    fn install_binary(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Remove file or directory at path.
    fn remove_path(&self, path: &Path) -> Result<()>;

    /// First line of `<program> --version`, if program runs at all.
    fn version_of(&self, program: &OsStr) -> Option<String>;
}

/// Installer backed by the real host.
#[derive(Debug, Clone)]
pub struct SystemInstaller {
    sudo: bool,
    network: NetworkSettings,
}

impl SystemInstaller {
    /// Construct new system installer.
    ///
    /// Privileged commands are only prefixed with sudo if settings ask for it,
    /// and the current user is not already root.
    pub fn new(settings: &Settings) -> Self {
        let sudo = settings.sudo && !is_root();
        debug!("privileged commands use sudo: {sudo}");
        Self {
            sudo,
            network: settings.network.clone(),
        }
    }

    fn run_privileged<'a>(&self, cmd: &str, args: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let (cmd, args) = privileged(self.sudo, cmd, args);
        Ok(syscall_interactive(cmd, args)?)
    }

    fn with_retry<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.network.retries + 1;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if attempt < attempts => {
                    warn!("{what} failed on attempt {attempt} of {attempts}: {error}");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Installer for SystemInstaller {
    #[instrument(skip(self), level = "debug")]
    fn update_index(&self, manager: PackageManager) -> Result<()> {
        match manager {
            PackageManager::Apt => self.run_privileged("apt-get", ["update"]),
            PackageManager::Brew => Ok(syscall_interactive("brew", ["update"])?),
            PackageManager::Pip => Ok(()),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn install_packages(&self, manager: PackageManager, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let packages = packages.iter().map(String::as_str);
        match manager {
            PackageManager::Apt => {
                self.run_privileged("apt-get", ["install", "-y"].into_iter().chain(packages))
            }
            PackageManager::Brew => Ok(syscall_interactive(
                "brew",
                ["install"].into_iter().chain(packages),
            )?),
            PackageManager::Pip => Ok(syscall_interactive(
                "python3",
                ["-m", "pip", "install", "--user", "--upgrade"]
                    .into_iter()
                    .chain(packages),
            )?),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn remove_packages(&self, manager: PackageManager, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let packages = packages.iter().map(String::as_str);
        match manager {
            PackageManager::Apt => {
                self.run_privileged("apt-get", ["remove", "-y"].into_iter().chain(packages))
            }
            PackageManager::Brew => Ok(syscall_interactive(
                "brew",
                ["uninstall"].into_iter().chain(packages),
            )?),
            PackageManager::Pip => Ok(syscall_interactive(
                "python3",
                ["-m", "pip", "uninstall", "-y"].into_iter().chain(packages),
            )?),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn add_package_repository(&self, repository: &str) -> Result<()> {
        self.run_privileged("add-apt-repository", ["-y", repository])
    }

    #[instrument(skip(self), level = "debug")]
    fn latest_release(&self, api: &str) -> Result<String> {
        let timeout = self.network.metadata_timeout_secs.to_string();
        let body = self.with_retry("release metadata query", || {
            Ok(syscall_non_interactive(
                "curl",
                ["-fsSL", "--max-time", timeout.as_str(), api],
            )?)
        })?;

        parse_release_tag(&body)
    }

    #[instrument(skip(self, destination), level = "debug")]
    fn fetch_artifact(&self, url: &str, destination: &Path) -> Result<()> {
        let timeout = self.network.timeout_secs.to_string();
        self.with_retry("artifact download", || {
            syscall_non_interactive(
                "curl",
                [
                    OsStr::new("-fsSL"),
                    OsStr::new("--max-time"),
                    OsStr::new(timeout.as_str()),
                    OsStr::new("-o"),
                    destination.as_os_str(),
                    OsStr::new(url),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn install_binary(&self, source: &Path, destination: &Path) -> Result<()> {
        let (cmd, args) = privileged(
            self.sudo,
            "install",
            [
                OsStr::new("-D"),
                OsStr::new("-m"),
                OsStr::new("0755"),
                source.as_os_str(),
                destination.as_os_str(),
            ],
        );
        Ok(syscall_interactive(cmd, args)?)
    }

    #[instrument(skip(self), level = "debug")]
    fn remove_path(&self, path: &Path) -> Result<()> {
        let (cmd, args) = privileged(
            self.sudo,
            "rm",
            [OsStr::new("-rf"), path.as_os_str()],
        );
        Ok(syscall_interactive(cmd, args)?)
    }

    fn version_of(&self, program: &OsStr) -> Option<String> {
        syscall_non_interactive(program, ["--version"])
            .ok()
            .and_then(|output| output.lines().next().map(ToString::to_string))
            .filter(|line| !line.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    tag_name: Option<String>,
}

/// Extract `tag_name` from release metadata JSON.
pub fn parse_release_tag(body: &str) -> Result<String> {
    let metadata: ReleaseMetadata = serde_json::from_str(body)?;
    metadata
        .tag_name
        .filter(|tag| !tag.is_empty())
        .ok_or(HostError::MissingTag)
}

fn is_root() -> bool {
    syscall_non_interactive("id", ["-u"])
        .map(|uid| uid.trim() == "0")
        .unwrap_or(false)
}

/// Host capability error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// External command failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Release metadata is not valid JSON.
    #[error("malformed release metadata")]
    ReleaseMetadata(#[from] serde_json::Error),

    /// Release metadata lacks a tag.
    #[error("release metadata has no tag_name")]
    MissingTag,
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;
