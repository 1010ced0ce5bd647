// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap context.
//!
//! Everything the bootstrap resolver needs to know about the host is captured
//! once into an immutable [`BootstrapContext`]. The context is probed fresh on
//! every run and never persisted, so a repaired host is always re-evaluated
//! from scratch.
//!
//! # Probing
//!
//! The OS family comes from `OSTYPE`. Shells rarely export that variable, so
//! when it is missing the compile target OS is used instead. Linux hosts are
//! only supported when `/etc/os-release` identifies a debian-like distribution.
//! The C runtime version comes from `getconf GNU_LIBC_VERSION`, or from
//! `ldd --version` when getconf does not know about glibc.

use crate::syscall::syscall_non_interactive;

use semver::Version;
use std::{
    env,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    str::FromStr,
};
use tracing::{debug, instrument};

/// Operating system family of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsKind {
    /// Apple macOS.
    MacOs,

    /// Debian, Ubuntu, or anything claiming to be like them.
    DebianLike {
        /// Distribution release, e.g., "22.04".
        distro_version: String,
    },

    /// Anything we do not know how to bootstrap.
    Unknown,
}

impl Display for OsKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MacOs => fmt.write_str("macos"),
            Self::DebianLike { distro_version } => write!(fmt, "debian-like {distro_version}"),
            Self::Unknown => fmt.write_str("unknown"),
        }
    }
}

/// Version of the host's C runtime library.
///
/// Compared semantically, so "2.9" sorts before "2.32".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuntimeVersion(Version);

impl RuntimeVersion {
    /// Construct new runtime version from major and minor numbers.
    pub fn new(major: u64, minor: u64) -> Self {
        Self(Version::new(major, minor, 0))
    }
}

impl FromStr for RuntimeVersion {
    type Err = ContextError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        // INVARIANT: Cut distro suffixes like "2.35-0ubuntu3" at first non-numeric character.
        let numeric = data
            .trim()
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .unwrap_or_default()
            .trim_end_matches('.');

        let mut parts = numeric.split('.').map(str::parse::<u64>);
        let invalid = || ContextError::InvalidRuntimeVersion(data.to_string());
        let major = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let minor = match parts.next() {
            Some(minor) => minor.map_err(|_| invalid())?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(patch) => patch.map_err(|_| invalid())?,
            None => 0,
        };

        Ok(Self(Version::new(major, minor, patch)))
    }
}

impl Display for RuntimeVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.0.patch == 0 {
            write!(fmt, "{}.{}", self.0.major, self.0.minor)
        } else {
            write!(fmt, "{}", self.0)
        }
    }
}

/// Immutable snapshot of the host used to select an install strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapContext {
    /// Operating system family, with distro version when debian-like.
    pub os_kind: OsKind,

    /// C runtime version, absent on macOS or when it cannot be probed.
    pub runtime_version: Option<RuntimeVersion>,
}

impl BootstrapContext {
    /// Construct new context from already known parts.
    pub fn new(os_kind: OsKind, runtime_version: Option<RuntimeVersion>) -> Self {
        Self {
            os_kind,
            runtime_version,
        }
    }

    /// Probe the current host.
    ///
    /// Never fails. Anything that cannot be identified ends up as
    /// [`OsKind::Unknown`], or as a missing runtime version.
    #[instrument(level = "debug")]
    pub fn probe() -> Self {
        let ostype = env::var("OSTYPE").ok();
        let family = OsFamily::detect(ostype.as_deref(), env::consts::OS);
        debug!("detected os family {family:?}");

        let os_kind = match family {
            OsFamily::Darwin => OsKind::MacOs,
            OsFamily::Linux => {
                let os_release = read_to_string("/etc/os-release").unwrap_or_default();
                let debian_version = read_to_string("/etc/debian_version").ok();
                parse_os_release(&os_release, debian_version.as_deref())
            }
            OsFamily::Other => OsKind::Unknown,
        };

        let runtime_version = match os_kind {
            OsKind::DebianLike { .. } => probe_runtime_version(),
            _ => None,
        };

        let context = Self::new(os_kind, runtime_version);
        debug!("probed context {context:?}");
        context
    }
}

impl Display for BootstrapContext {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.os_kind)?;
        if let Some(version) = &self.runtime_version {
            write!(fmt, " (glibc {version})")?;
        }

        Ok(())
    }
}

/// Coarse operating system family before distribution detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Darwin,
    Linux,
    Other,
}

impl OsFamily {
    /// Detect family from `OSTYPE` value, or target OS name when unset.
    pub fn detect(ostype: Option<&str>, target_os: &str) -> Self {
        match ostype {
            Some(ostype) if ostype.starts_with("darwin") => Self::Darwin,
            Some(ostype) if ostype.starts_with("linux") => Self::Linux,
            Some(_) => Self::Other,
            None => match target_os {
                "macos" => Self::Darwin,
                "linux" => Self::Linux,
                _ => Self::Other,
            },
        }
    }
}

/// Identify debian-like distributions from os-release contents.
///
/// The distro version is `VERSION_ID`, falling back to the contents of
/// `/etc/debian_version`, and finally to "unknown".
pub fn parse_os_release(os_release: &str, debian_version: Option<&str>) -> OsKind {
    let mut id = None;
    let mut id_like = None;
    let mut version_id = None;

    for line in os_release.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "ID" => id = Some(value.to_string()),
            "ID_LIKE" => id_like = Some(value.to_string()),
            "VERSION_ID" => version_id = Some(value.to_string()),
            _ => continue,
        }
    }

    let is_debian = |name: &str| matches!(name, "debian" | "ubuntu");
    let debian_like = id.as_deref().is_some_and(is_debian)
        || id_like
            .as_deref()
            .is_some_and(|like| like.split_whitespace().any(is_debian));
    if !debian_like {
        return OsKind::Unknown;
    }

    let distro_version = version_id
        .filter(|version| !version.is_empty())
        .or_else(|| {
            debian_version
                .map(str::trim)
                .filter(|version| !version.is_empty())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| "unknown".into());

    OsKind::DebianLike { distro_version }
}

/// Extract runtime version from `getconf GNU_LIBC_VERSION` or `ldd --version`
/// output.
///
/// Both tools put the version in the last word of the first line.
pub fn parse_runtime_version(output: &str) -> Option<RuntimeVersion> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .last()?
        .parse()
        .ok()
}

fn probe_runtime_version() -> Option<RuntimeVersion> {
    syscall_non_interactive("getconf", ["GNU_LIBC_VERSION"])
        .ok()
        .and_then(|output| parse_runtime_version(&output))
        .or_else(|| {
            syscall_non_interactive("ldd", ["--version"])
                .ok()
                .and_then(|output| parse_runtime_version(&output))
        })
}

/// Context error types.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Runtime version string is not made of dotted numbers.
    #[error("invalid runtime library version {0:?}")]
    InvalidRuntimeVersion(String),
}
