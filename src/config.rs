// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that nvsync reads at startup. The
//! settings file is optional. Every field has a default, so an empty or missing
//! file yields a fully usable [`Settings`] value.
//!
//! # General Layout
//!
//! ```toml
//! sudo = true
//!
//! [repository]
//! url = "https://github.com/blah/nvim-config.git"
//! branch = "main"
//! path = "$HOME/.config/nvim"
//!
//! [editor]
//! package_repository = "ppa:neovim-ppa/unstable"
//! pinned_release = "v0.9.5"
//! min_version = "0.9.0"
//! install_dir = "/usr/local/bin"
//!
//! [network]
//! retries = 1
//! timeout_secs = 300
//!
//! [dependencies]
//! apt = ["git", "curl", "ripgrep"]
//! brew = ["git", "ripgrep"]
//! ```

use crate::path::{default_config_dir, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Top-level settings of nvsync.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix privileged commands with `sudo` unless already running as root.
    pub sudo: bool,

    /// Configuration checkout to keep in sync.
    pub repository: RepositorySettings,

    /// How the editor binary gets installed.
    pub editor: EditorSettings,

    /// Retry policy for network fetches.
    pub network: NetworkSettings,

    /// Supporting packages installed alongside the editor.
    pub dependencies: DependencySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sudo: true,
            repository: RepositorySettings::default(),
            editor: EditorSettings::default(),
            network: NetworkSettings::default(),
            dependencies: DependencySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from target path.
    ///
    /// A missing settings file is not an error, defaults are used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadSettings`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are invalid.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_to_string(path) {
            Ok(data) => {
                debug!("load settings from {:?}", path.display());
                data.parse()
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no settings at {:?}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::ReadSettings {
                source,
                path: path.to_path_buf(),
            }),
        }
    }

    /// Absolute path to the configuration checkout.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if no path was configured, and the
    ///   default path cannot be determined.
    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.repository.path {
            Some(path) => Ok(path.clone()),
            None => Ok(default_config_dir()?),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path-like field.
        if let Some(path) = &settings.repository.path {
            settings.repository.path = Some(expand_path(path)?);
        }
        settings.editor.install_dir = expand_path(&settings.editor.install_dir)?;
        settings.editor.stale_paths = settings
            .editor
            .stale_paths
            .iter()
            .map(|pattern| {
                shellexpand::full(pattern)
                    .map(|expanded| expanded.into_owned())
                    .map_err(ConfigError::ShellExpansion)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Remote configuration repository settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Remote URL to clone configuration from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Branch to track.
    pub branch: String,

    /// Local checkout path, `$HOME/.config/nvim` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            url: None,
            branch: "main".into(),
            path: None,
        }
    }
}

/// Editor installation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Package name used by both apt and brew.
    pub package: String,

    /// Third-party apt source for recent editor builds.
    pub package_repository: String,

    /// Release known to run on old C runtimes.
    pub pinned_release: String,

    /// Portable binary asset name of the pinned release.
    pub pinned_asset: String,

    /// Portable binary asset name of the latest release.
    ///
    /// Defaults to the asset matching the architecture nvsync was built for.
    /// The pinned release only ships an x86_64 asset.
    pub latest_asset: String,

    /// Oldest editor version accepted as already installed.
    pub min_version: String,

    /// Base URL of release downloads.
    pub release_url: String,

    /// Release metadata endpoint answering with the latest `tag_name`.
    pub release_api: String,

    /// Directory the portable binary is installed into.
    pub install_dir: PathBuf,

    /// Stale binaries removed before installing, glob patterns allowed.
    pub stale_paths: Vec<String>,

    /// FUSE runtime needed to launch portable binaries.
    pub fuse_package: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            package: "neovim".into(),
            package_repository: "ppa:neovim-ppa/unstable".into(),
            pinned_release: "v0.9.5".into(),
            pinned_asset: "nvim.appimage".into(),
            latest_asset: latest_asset_for(std::env::consts::ARCH),
            min_version: "0.9.0".into(),
            release_url: "https://github.com/neovim/neovim/releases".into(),
            release_api: "https://api.github.com/repos/neovim/neovim/releases/latest".into(),
            install_dir: PathBuf::from("/usr/local/bin"),
            stale_paths: vec![
                "/usr/local/bin/nvim".into(),
                "/usr/local/bin/nvim.appimage".into(),
                "/opt/nvim*".into(),
            ],
            fuse_package: "libfuse2".into(),
        }
    }
}

/// Network retry policy.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Extra attempts after the first failed one.
    pub retries: u32,

    /// Per-attempt timeout for artifact downloads.
    pub timeout_secs: u64,

    /// Per-attempt timeout for release metadata queries.
    pub metadata_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            retries: 1,
            timeout_secs: 300,
            metadata_timeout_secs: 30,
        }
    }
}

/// Supporting packages.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencySettings {
    /// Packages installed through apt on debian-like hosts.
    pub apt: Vec<String>,

    /// Packages installed through brew on macOS hosts.
    pub brew: Vec<String>,

    /// Python packages backing the editor's Python provider and notebooks.
    pub python: Vec<String>,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            apt: [
                "git",
                "curl",
                "unzip",
                "build-essential",
                "ripgrep",
                "fd-find",
                "nodejs",
                "npm",
                "python3",
                "python3-pip",
                "python3-venv",
            ]
            .into_iter()
            .map(Into::into)
            .collect(),
            brew: ["git", "curl", "ripgrep", "fd", "node", "python"]
                .into_iter()
                .map(Into::into)
                .collect(),
            python: ["pynvim", "jupyter_client", "nbformat"]
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

/// Name of the latest release's portable binary for a CPU architecture.
pub fn latest_asset_for(arch: &str) -> String {
    let arch = match arch {
        "aarch64" => "arm64",
        arch => arch,
    };

    format!("nvim-linux-{arch}.appimage")
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Settings file exists but cannot be read.
    #[error("failed to read settings at {:?}", path.display())]
    ReadSettings {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Home directory cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            sudo = false

            [repository]
            url = "https://blah.org/nvim.git"
            branch = "trunk"
            path = "$BLAH/.config/nvim"

            [editor]
            pinned_release = "v0.9.4"
            install_dir = "$BLAH/.local/bin"
            stale_paths = ["$BLAH/.local/bin/nvim*"]

            [network]
            retries = 3

            [dependencies]
            apt = ["git"]
            brew = []
        "#
        .parse()?;

        let expect = Settings {
            sudo: false,
            repository: RepositorySettings {
                url: Some("https://blah.org/nvim.git".into()),
                branch: "trunk".into(),
                path: Some(PathBuf::from("/home/blah/.config/nvim")),
            },
            editor: EditorSettings {
                pinned_release: "v0.9.4".into(),
                install_dir: PathBuf::from("/home/blah/.local/bin"),
                stale_paths: vec!["/home/blah/.local/bin/nvim*".into()],
                ..EditorSettings::default()
            },
            network: NetworkSettings {
                retries: 3,
                ..NetworkSettings::default()
            },
            dependencies: DependencySettings {
                apt: vec!["git".into()],
                brew: Vec::new(),
                ..DependencySettings::default()
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn empty_settings_are_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());

        Ok(())
    }

    #[test]
    fn serialized_settings_parse_back() -> anyhow::Result<()> {
        let settings = Settings::default();
        let result: Settings = settings.to_string().parse()?;
        assert_eq!(result, settings);

        Ok(())
    }

    #[test_case("x86_64", "nvim-linux-x86_64.appimage"; "x86_64")]
    #[test_case("aarch64", "nvim-linux-arm64.appimage"; "aarch64")]
    #[test]
    fn latest_asset_matches_architecture(arch: &str, expect: &str) {
        pretty_assertions::assert_eq!(latest_asset_for(arch), expect);
    }

    #[sealed_test]
    fn missing_settings_file_yields_defaults() -> anyhow::Result<()> {
        let result = Settings::load("does-not-exist.toml")?;
        assert_eq!(result, Settings::default());

        Ok(())
    }
}
