// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment bootstrap resolver.
//!
//! Decides how the editor binary gets onto a host, installs it, and checks
//! that the result actually runs.
//!
//! # Strategy Selection
//!
//! Selection is a pure function of the [`BootstrapContext`]. First match wins:
//!
//! 1. macOS always goes through Homebrew.
//! 2. Ubuntu 20.04, or any debian-like host with a C runtime older than 2.32,
//!    gets the portable binary of a pinned release. Newer prebuilt binaries
//!    link against symbols those runtimes lack.
//! 3. Any other debian-like host uses the third-party package repository, and
//!    falls back to the portable binary of the latest release if that fails.
//! 4. Everything else is unsupported.
//!
//! # Verification
//!
//! A package manager reporting success does not mean the binary can run on
//! this host's C runtime. Every strategy therefore ends by running the
//! installed binary and requiring a version line, otherwise the attempt counts
//! as failed.
//!
//! # Stages
//!
//! `Unprobed → Probed → StrategySelected → Installing → {Verified | Failed}`.
//! A failed package repository install loops back to `StrategySelected` once
//! with the fallback strategy. Every other failure is terminal.

#[cfg(test)]
pub(crate) mod fake;
pub mod host;

use crate::{
    bootstrap::host::{HostError, Installer, PackageManager},
    config::EditorSettings,
    context::{BootstrapContext, OsKind, RuntimeVersion},
};

use semver::Version;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{debug, info, instrument, warn};

/// Distribution release whose stock runtime breaks recent editor builds.
pub const COMPAT_DISTRO_VERSION: &str = "20.04";

/// Oldest C runtime able to run recent editor builds.
pub fn min_runtime_version() -> RuntimeVersion {
    RuntimeVersion::new(2, 32)
}

/// Which release of the portable binary to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Known-good release for old C runtimes.
    Pinned,

    /// Whatever the release metadata endpoint calls latest.
    Latest,
}

/// Installation strategy for the editor binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Host's own package manager, i.e., Homebrew.
    NativePackageManager,

    /// Third-party apt source.
    PackageRepository,

    /// Self-contained executable bundling its own dependencies.
    PortableBinary(Release),
}

impl Display for Strategy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NativePackageManager => fmt.write_str("native package manager"),
            Self::PackageRepository => fmt.write_str("package repository"),
            Self::PortableBinary(Release::Pinned) => fmt.write_str("portable binary (pinned)"),
            Self::PortableBinary(Release::Latest) => fmt.write_str("portable binary (latest)"),
        }
    }
}

/// Primary strategy plus the single fallback it may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub primary: Strategy,
    pub fallback: Option<Strategy>,
}

impl Plan {
    fn strategies(&self) -> impl Iterator<Item = Strategy> {
        std::iter::once(self.primary).chain(self.fallback)
    }
}

/// Select install plan for context.
///
/// # Errors
///
/// - Return [`BootstrapError::UnsupportedEnvironment`] for unknown hosts.
pub fn select_strategy(context: &BootstrapContext) -> Result<Plan> {
    match &context.os_kind {
        OsKind::MacOs => Ok(Plan {
            primary: Strategy::NativePackageManager,
            fallback: None,
        }),
        OsKind::DebianLike { distro_version } => {
            // INVARIANT: An unprobed runtime is treated as too old.
            let old_runtime = context
                .runtime_version
                .as_ref()
                .map_or(true, |version| *version < min_runtime_version());

            if distro_version == COMPAT_DISTRO_VERSION || old_runtime {
                Ok(Plan {
                    primary: Strategy::PortableBinary(Release::Pinned),
                    fallback: None,
                })
            } else {
                Ok(Plan {
                    primary: Strategy::PackageRepository,
                    fallback: Some(Strategy::PortableBinary(Release::Latest)),
                })
            }
        }
        OsKind::Unknown => Err(BootstrapError::UnsupportedEnvironment(
            context.os_kind.clone(),
        )),
    }
}

/// Outcome of a verified bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    /// Strategy that produced the binary.
    pub strategy: Strategy,

    /// Binary that was verified.
    pub binary: PathBuf,

    /// Version line reported by the binary.
    pub version: String,
}

impl Display for InstalledVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} at {} via {}",
            self.version,
            self.binary.display(),
            self.strategy
        )
    }
}

/// Bootstrap stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unprobed,
    Probed,
    StrategySelected(Strategy),
    Installing(Strategy),
    Verified(Strategy),
    Failed(Strategy),
}

/// Resolve install strategy for host, and execute it.
pub struct Resolver<'a, I>
where
    I: Installer,
{
    installer: &'a I,
    settings: &'a EditorSettings,
    force: bool,
}

impl<'a, I> Resolver<'a, I>
where
    I: Installer,
{
    /// Construct new resolver.
    pub fn new(installer: &'a I, settings: &'a EditorSettings) -> Self {
        Self {
            installer,
            settings,
            force: false,
        }
    }

    /// Reinstall even if a working binary is already in place.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Probe current host, then select and execute install strategy.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError`] if no strategy produced a working binary.
    pub fn probe_and_install(&self) -> Result<InstalledVersion> {
        self.enter(Stage::Unprobed);
        let context = BootstrapContext::probe();
        self.enter(Stage::Probed);
        info!("detected {context}");
        self.resolve_and_install(&context)
    }

    /// Select and execute install strategy for context.
    ///
    /// If a strategy of the plan already has a working binary in place, then
    /// nothing gets installed unless forced.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::UnsupportedEnvironment`] for unknown hosts.
    /// - Return [`BootstrapError::InstallationFailed`] if strategy commands fail.
    /// - Return [`BootstrapError::VerificationFailed`] if installed binary does
    ///   not run.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_and_install(&self, context: &BootstrapContext) -> Result<InstalledVersion> {
        let plan = select_strategy(context)?;

        if !self.force {
            for strategy in plan.strategies() {
                if let Some(installed) = self.already_installed(strategy) {
                    info!("editor already bootstrapped: {installed}");
                    self.enter(Stage::Verified(strategy));
                    return Ok(installed);
                }
            }
        }

        match self.execute(plan.primary) {
            Ok(installed) => Ok(installed),
            Err(error) => match plan.fallback {
                Some(fallback) if error.allows_fallback() => {
                    warn!("{error}");
                    warn!("falling back to {fallback}");
                    self.execute(fallback)
                }
                _ => Err(error),
            },
        }
    }

    fn execute(&self, strategy: Strategy) -> Result<InstalledVersion> {
        self.enter(Stage::StrategySelected(strategy));
        info!("install editor through {strategy}");
        self.remove_conflicts(strategy);

        self.enter(Stage::Installing(strategy));
        let outcome = self
            .install(strategy)
            .and_then(|_| self.verify(strategy));
        match &outcome {
            Ok(installed) => {
                self.enter(Stage::Verified(strategy));
                info!("installed {installed}");
            }
            Err(_) => self.enter(Stage::Failed(strategy)),
        }

        outcome
    }

    fn install(&self, strategy: Strategy) -> Result<()> {
        let failed = |source| BootstrapError::InstallationFailed { strategy, source };
        let package = std::slice::from_ref(&self.settings.package);
        match strategy {
            Strategy::NativePackageManager => self
                .installer
                .install_packages(PackageManager::Brew, package)
                .map_err(failed),
            Strategy::PackageRepository => {
                self.installer
                    .install_packages(PackageManager::Apt, &["software-properties-common".into()])
                    .map_err(failed)?;
                self.installer
                    .add_package_repository(&self.settings.package_repository)
                    .map_err(failed)?;
                self.installer
                    .update_index(PackageManager::Apt)
                    .map_err(failed)?;
                self.installer
                    .install_packages(PackageManager::Apt, package)
                    .map_err(failed)
            }
            Strategy::PortableBinary(release) => {
                // Portable binaries need FUSE to mount themselves, but some
                // hosts ship it under another name.
                let fuse = std::slice::from_ref(&self.settings.fuse_package);
                if let Err(error) = self.installer.install_packages(PackageManager::Apt, fuse) {
                    warn!("cannot install {}: {error}", self.settings.fuse_package);
                }

                let (url, asset) = self.artifact_url(release);
                let staging = tempfile::Builder::new()
                    .prefix("nvsync")
                    .tempdir()
                    .map_err(BootstrapError::Staging)?;
                let download = staging.path().join(asset);
                info!("fetch {url}");
                self.installer
                    .fetch_artifact(&url, &download)
                    .map_err(failed)?;
                self.installer
                    .install_binary(&download, &self.target_binary(strategy))
                    .map_err(failed)
            }
        }
    }

    fn artifact_url(&self, release: Release) -> (String, &str) {
        let base = self.settings.release_url.trim_end_matches('/');
        match release {
            Release::Pinned => (
                format!(
                    "{base}/download/{}/{}",
                    self.settings.pinned_release, self.settings.pinned_asset
                ),
                self.settings.pinned_asset.as_str(),
            ),
            Release::Latest => {
                let asset = self.settings.latest_asset.as_str();
                match self.installer.latest_release(&self.settings.release_api) {
                    Ok(tag) => {
                        info!("latest release is {tag}");
                        (format!("{base}/download/{tag}/{asset}"), asset)
                    }
                    Err(error) => {
                        warn!("cannot query latest release: {error}");
                        (format!("{base}/latest/download/{asset}"), asset)
                    }
                }
            }
        }
    }

    /// Remove prior installations that would shadow or conflict with the
    /// strategy's binary.
    ///
    /// Best-effort, failures are only logged.
    fn remove_conflicts(&self, strategy: Strategy) {
        let target = self.target_binary(strategy);
        let stale_patterns = match strategy {
            Strategy::NativePackageManager => return,
            Strategy::PackageRepository => self.settings.stale_paths.as_slice(),
            Strategy::PortableBinary(_) => {
                let package = std::slice::from_ref(&self.settings.package);
                if let Err(source) = self
                    .installer
                    .remove_packages(PackageManager::Apt, package)
                {
                    let error = BootstrapError::RemovalFailed {
                        target: self.settings.package.clone(),
                        source,
                    };
                    warn!("{error}");
                }
                self.settings.stale_paths.as_slice()
            }
        };

        for path in stale_paths(stale_patterns) {
            if path == target {
                continue;
            }

            debug!("remove stale {:?}", path.display());
            if let Err(source) = self.installer.remove_path(&path) {
                let error = BootstrapError::RemovalFailed {
                    target: path.display().to_string(),
                    source,
                };
                warn!("{error}");
            }
        }
    }

    // INVARIANT: Only skip installation for binaries this strategy would have
    //   produced, i.e., the pinned release itself, or at least the minimum
    //   editor version for every other strategy.
    fn already_installed(&self, strategy: Strategy) -> Option<InstalledVersion> {
        let installed = self.verify(strategy).ok()?;
        if strategy == Strategy::PortableBinary(Release::Pinned) {
            return installed
                .version
                .contains(self.settings.pinned_release.as_str())
                .then_some(installed);
        }

        let minimum = match parse_editor_version(&self.settings.min_version) {
            Some(minimum) => minimum,
            None => {
                warn!("invalid minimum editor version {:?}", self.settings.min_version);
                return None;
            }
        };
        match parse_editor_version(&installed.version) {
            Some(version) if version >= minimum => Some(installed),
            _ => {
                info!("{installed} is older than {minimum}, reinstall");
                None
            }
        }
    }

    fn verify(&self, strategy: Strategy) -> Result<InstalledVersion> {
        let binary = self.target_binary(strategy);
        match self.installer.version_of(binary.as_os_str()) {
            Some(version) if version.starts_with("NVIM") => Ok(InstalledVersion {
                strategy,
                binary,
                version,
            }),
            _ => Err(BootstrapError::VerificationFailed { strategy, binary }),
        }
    }

    /// Binary that a strategy is expected to produce.
    pub fn target_binary(&self, strategy: Strategy) -> PathBuf {
        match strategy {
            Strategy::NativePackageManager => PathBuf::from("nvim"),
            Strategy::PackageRepository => PathBuf::from("/usr/bin/nvim"),
            Strategy::PortableBinary(_) => self.settings.install_dir.join("nvim"),
        }
    }

    fn enter(&self, stage: Stage) {
        debug!("bootstrap stage {stage:?}");
    }
}

/// Extract release number from a version line like "NVIM v0.10.2".
///
/// Pre-release and build suffixes are dropped, so nightly builds compare
/// equal to the release they lead up to.
pub fn parse_editor_version(line: &str) -> Option<Version> {
    let token = line
        .trim()
        .trim_start_matches("NVIM")
        .split_whitespace()
        .next()?;
    let version = Version::parse(token.trim_start_matches('v')).ok()?;

    Some(Version::new(version.major, version.minor, version.patch))
}

fn stale_paths(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(matches) => paths.extend(matches.filter_map(|entry| entry.ok())),
            Err(error) => warn!("invalid stale path pattern {pattern:?}: {error}"),
        }
    }

    paths
}

/// Bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Host is not one we know how to bootstrap.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(OsKind),

    /// Strategy command exited with failure.
    #[error("installation through {strategy} failed")]
    InstallationFailed {
        strategy: Strategy,
        #[source]
        source: HostError,
    },

    /// Strategy reported success, but the binary does not run.
    #[error("{strategy} left {binary:?} without a working version report")]
    VerificationFailed { strategy: Strategy, binary: PathBuf },

    /// Prior installation could not be removed, only ever logged.
    #[error("failed to remove {target}")]
    RemovalFailed {
        target: String,
        #[source]
        source: HostError,
    },

    /// Download staging directory cannot be created.
    #[error("failed to create download staging directory")]
    Staging(#[source] std::io::Error),
}

impl BootstrapError {
    fn allows_fallback(&self) -> bool {
        matches!(
            self,
            Self::InstallationFailed { .. } | Self::VerificationFailed { .. }
        )
    }
}

/// Friendly result alias :3
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::fake::{Call, FakeInstaller};
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn settings() -> EditorSettings {
        EditorSettings {
            stale_paths: Vec::new(),
            ..EditorSettings::default()
        }
    }

    fn debian(distro_version: &str, runtime: Option<RuntimeVersion>) -> BootstrapContext {
        BootstrapContext::new(
            OsKind::DebianLike {
                distro_version: distro_version.into(),
            },
            runtime,
        )
    }

    const PINNED: Plan = Plan {
        primary: Strategy::PortableBinary(Release::Pinned),
        fallback: None,
    };

    const REPOSITORY: Plan = Plan {
        primary: Strategy::PackageRepository,
        fallback: Some(Strategy::PortableBinary(Release::Latest)),
    };

    #[test_case(debian("20.04", Some(RuntimeVersion::new(2, 31))), PINNED; "focal old runtime")]
    #[test_case(debian("20.04", Some(RuntimeVersion::new(2, 35))), PINNED; "focal new runtime")]
    #[test_case(debian("11", Some(RuntimeVersion::new(2, 31))), PINNED; "bullseye old runtime")]
    #[test_case(debian("22.04", Some(RuntimeVersion::new(2, 9))), PINNED; "ancient runtime")]
    #[test_case(debian("22.04", None), PINNED; "unprobed runtime")]
    #[test_case(debian("22.04", Some(RuntimeVersion::new(2, 32))), REPOSITORY; "minimum runtime")]
    #[test_case(debian("24.04", Some(RuntimeVersion::new(2, 39))), REPOSITORY; "noble")]
    #[test]
    fn debian_like_strategy_selection(context: BootstrapContext, expect: Plan) {
        pretty_assertions::assert_eq!(select_strategy(&context).unwrap(), expect);
    }

    #[test_case(None; "no runtime")]
    #[test_case(Some(RuntimeVersion::new(2, 17)); "old runtime ignored")]
    #[test]
    fn macos_always_uses_native_package_manager(runtime: Option<RuntimeVersion>) {
        let context = BootstrapContext::new(OsKind::MacOs, runtime);
        let expect = Plan {
            primary: Strategy::NativePackageManager,
            fallback: None,
        };
        pretty_assertions::assert_eq!(select_strategy(&context).unwrap(), expect);
    }

    #[test]
    fn unknown_host_is_unsupported_without_side_effects() {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let context = BootstrapContext::new(OsKind::Unknown, None);
        let result = resolver.resolve_and_install(&context);
        assert!(matches!(
            result,
            Err(BootstrapError::UnsupportedEnvironment(OsKind::Unknown))
        ));
        assert_eq!(installer.calls(), Vec::new());
    }

    #[test]
    fn focal_installs_pinned_portable_binary() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("20.04", Some(RuntimeVersion::new(2, 31))))?;
        let expect = InstalledVersion {
            strategy: Strategy::PortableBinary(Release::Pinned),
            binary: PathBuf::from("/usr/local/bin/nvim"),
            version: "NVIM v0.9.5".into(),
        };
        assert_eq!(result, expect);

        let expect = vec![
            Call::Remove(PackageManager::Apt, vec!["neovim".into()]),
            Call::Install(PackageManager::Apt, vec!["libfuse2".into()]),
            Call::Fetch(
                "https://github.com/neovim/neovim/releases/download/v0.9.5/nvim.appimage".into(),
            ),
            Call::InstallBinary(PathBuf::from("/usr/local/bin/nvim")),
        ];
        assert_eq!(installer.calls(), expect);

        Ok(())
    }

    #[test]
    fn failing_repository_falls_back_to_latest_portable_binary() -> anyhow::Result<()> {
        let installer = FakeInstaller::failing(["add_package_repository"]);
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("22.04", Some(RuntimeVersion::new(2, 35))))?;
        assert_eq!(result.strategy, Strategy::PortableBinary(Release::Latest));
        assert_eq!(result.version, "NVIM v0.11.0");

        let calls = installer.calls();
        assert!(calls.contains(&Call::AddRepository("ppa:neovim-ppa/unstable".into())));
        assert!(calls.contains(&Call::LatestRelease));
        assert!(calls.contains(&Call::Fetch(
            format!(
                "https://github.com/neovim/neovim/releases/download/v0.11.0/{}",
                settings.latest_asset
            )
        )));

        Ok(())
    }

    #[test]
    fn unverifiable_repository_install_falls_back() -> anyhow::Result<()> {
        let installer = FakeInstaller {
            broken_apt_binary: true,
            ..FakeInstaller::default()
        };
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("24.04", Some(RuntimeVersion::new(2, 39))))?;
        assert_eq!(result.strategy, Strategy::PortableBinary(Release::Latest));

        Ok(())
    }

    #[test]
    fn working_repository_install_needs_no_fallback() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("22.04", Some(RuntimeVersion::new(2, 35))))?;
        let expect = InstalledVersion {
            strategy: Strategy::PackageRepository,
            binary: PathBuf::from("/usr/bin/nvim"),
            version: "NVIM v0.12.0-dev".into(),
        };
        assert_eq!(result, expect);

        let expect = vec![
            Call::Install(
                PackageManager::Apt,
                vec!["software-properties-common".into()],
            ),
            Call::AddRepository("ppa:neovim-ppa/unstable".into()),
            Call::UpdateIndex(PackageManager::Apt),
            Call::Install(PackageManager::Apt, vec!["neovim".into()]),
        ];
        assert_eq!(installer.calls(), expect);

        Ok(())
    }

    #[test]
    fn failing_fallback_is_terminal() {
        let installer = FakeInstaller::failing(["add_package_repository", "fetch_artifact"]);
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result = resolver.resolve_and_install(&debian("22.04", Some(RuntimeVersion::new(2, 35))));
        assert!(matches!(
            result,
            Err(BootstrapError::InstallationFailed {
                strategy: Strategy::PortableBinary(Release::Latest),
                ..
            })
        ));
    }

    #[test]
    fn pinned_install_failure_has_no_fallback() {
        let installer = FakeInstaller::failing(["fetch_artifact"]);
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result = resolver.resolve_and_install(&debian("20.04", Some(RuntimeVersion::new(2, 31))));
        assert!(matches!(
            result,
            Err(BootstrapError::InstallationFailed {
                strategy: Strategy::PortableBinary(Release::Pinned),
                ..
            })
        ));
        assert!(!installer.calls().contains(&Call::LatestRelease));
    }

    #[test]
    fn macos_installs_through_brew() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result = resolver.resolve_and_install(&BootstrapContext::new(OsKind::MacOs, None))?;
        assert_eq!(result.strategy, Strategy::NativePackageManager);
        assert_eq!(
            installer.calls(),
            vec![Call::Install(PackageManager::Brew, vec!["neovim".into()])]
        );

        Ok(())
    }

    #[test]
    fn repeated_bootstrap_installs_once() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);
        let context = debian("20.04", Some(RuntimeVersion::new(2, 31)));

        let first = resolver.resolve_and_install(&context)?;
        let calls_after_first = installer.calls();
        let second = resolver.resolve_and_install(&context)?;

        assert_eq!(first, second);
        assert_eq!(installer.calls(), calls_after_first);

        Ok(())
    }

    #[test]
    fn repeated_repository_bootstrap_installs_once() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);
        let context = debian("22.04", Some(RuntimeVersion::new(2, 35)));

        let first = resolver.resolve_and_install(&context)?;
        let calls_after_first = installer.calls();
        let second = resolver.resolve_and_install(&context)?;

        assert_eq!(first.strategy, Strategy::PackageRepository);
        assert_eq!(first, second);
        assert_eq!(installer.calls(), calls_after_first);

        Ok(())
    }

    #[test]
    fn repeated_macos_bootstrap_installs_once() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);
        let context = BootstrapContext::new(OsKind::MacOs, None);

        let first = resolver.resolve_and_install(&context)?;
        let second = resolver.resolve_and_install(&context)?;

        assert_eq!(first, second);
        assert_eq!(
            installer.calls(),
            vec![Call::Install(PackageManager::Brew, vec!["neovim".into()])]
        );

        Ok(())
    }

    #[test]
    fn outdated_distro_editor_goes_through_repository() -> anyhow::Result<()> {
        let installer = FakeInstaller::default().with_binary("/usr/bin/nvim", "NVIM v0.6.1");
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("22.04", Some(RuntimeVersion::new(2, 35))))?;
        assert_eq!(result.strategy, Strategy::PackageRepository);
        assert_eq!(result.version, "NVIM v0.12.0-dev");
        assert!(installer
            .calls()
            .contains(&Call::AddRepository("ppa:neovim-ppa/unstable".into())));

        Ok(())
    }

    #[test]
    fn outdated_editor_on_path_goes_through_brew() -> anyhow::Result<()> {
        let installer = FakeInstaller::default().with_binary("nvim", "NVIM v0.7.2");
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result = resolver.resolve_and_install(&BootstrapContext::new(OsKind::MacOs, None))?;
        assert_eq!(result.version, "NVIM v0.11.0");
        assert_eq!(
            installer.calls(),
            vec![Call::Install(PackageManager::Brew, vec!["neovim".into()])]
        );

        Ok(())
    }

    #[test_case("NVIM v0.11.0", Some(Version::new(0, 11, 0)); "release")]
    #[test_case("NVIM v0.12.0-dev-1234+g0123abc", Some(Version::new(0, 12, 0)); "nightly")]
    #[test_case("0.9.0", Some(Version::new(0, 9, 0)); "bare number")]
    #[test_case("NVIM", None; "no number")]
    #[test_case("vim 9.1", None; "not a version")]
    #[test]
    fn editor_version_from_line(line: &str, expect: Option<Version>) {
        pretty_assertions::assert_eq!(parse_editor_version(line), expect);
    }

    #[test]
    fn pinned_strategy_replaces_other_release() -> anyhow::Result<()> {
        let installer = FakeInstaller::default().with_binary("/usr/local/bin/nvim", "NVIM v0.11.0");
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings);

        let result =
            resolver.resolve_and_install(&debian("20.04", Some(RuntimeVersion::new(2, 31))))?;
        assert_eq!(result.version, "NVIM v0.9.5");
        assert!(installer.installed_anything());

        Ok(())
    }

    #[test]
    fn forced_bootstrap_reinstalls() -> anyhow::Result<()> {
        let installer = FakeInstaller::default().with_binary("nvim", "NVIM v0.11.0");
        let settings = settings();
        let resolver = Resolver::new(&installer, &settings).with_force(true);

        resolver.resolve_and_install(&BootstrapContext::new(OsKind::MacOs, None))?;
        assert!(installer.installed_anything());

        Ok(())
    }

    #[test]
    fn stale_binaries_are_removed_except_target() -> anyhow::Result<()> {
        let staging = tempfile::tempdir()?;
        let target_dir = staging.path().join("bin");
        let stale = staging.path().join("nvim-linux64");
        std::fs::create_dir_all(&target_dir)?;
        std::fs::create_dir_all(&stale)?;
        std::fs::write(target_dir.join("nvim"), "")?;

        let installer = FakeInstaller::failing(["remove_packages"]);
        let settings = EditorSettings {
            install_dir: target_dir.clone(),
            stale_paths: vec![
                format!("{}/nvim*", staging.path().display()),
                format!("{}/nvim", target_dir.display()),
            ],
            ..EditorSettings::default()
        };
        let resolver = Resolver::new(&installer, &settings);

        resolver.resolve_and_install(&debian("20.04", Some(RuntimeVersion::new(2, 31))))?;
        let calls = installer.calls();
        assert!(calls.contains(&Call::RemovePath(stale)));
        assert!(!calls.contains(&Call::RemovePath(target_dir.join("nvim"))));
        assert!(calls.contains(&Call::InstallBinary(target_dir.join("nvim"))));

        Ok(())
    }
}
