// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Full machine setup.
//!
//! Installs supporting packages, bootstraps the editor binary, puts the
//! configuration checkout in place, then lets the plugin manager sync plugins
//! headlessly.

use crate::{
    bootstrap::{
        host::{HostError, Installer, PackageManager},
        BootstrapError, InstalledVersion, Resolver,
    },
    config::{ConfigError, Settings},
    context::{BootstrapContext, OsKind},
    sync::{Checkout, ConfigRepo, SyncError},
    syscall::{syscall_interactive, SyscallError},
};

use std::ffi::OsStr;
use tracing::{info, instrument, warn};

/// Let the plugin manager sync plugins without opening a UI.
///
/// # Errors
///
/// - Return [`SyscallError`] if the editor exits with failure.
pub fn sync_plugins(binary: impl AsRef<OsStr>) -> Result<(), SyscallError> {
    info!("sync editor plugins");
    syscall_interactive(binary, ["--headless", "+Lazy! sync", "+qa"])
}

/// Orchestrate setup of a machine.
pub struct Setup<'a, I>
where
    I: Installer,
{
    installer: &'a I,
    settings: &'a Settings,
}

impl<'a, I> Setup<'a, I>
where
    I: Installer,
{
    /// Construct new setup.
    pub fn new(installer: &'a I, settings: &'a Settings) -> Self {
        Self {
            installer,
            settings,
        }
    }

    /// Run full setup for context.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::MissingUrl`] if no remote is configured.
    /// - Return [`SetupError::Dependencies`] if supporting packages fail.
    /// - Return [`SetupError::Bootstrap`] if the editor cannot be installed.
    /// - Return [`SetupError::Sync`] if the configuration cannot be checked out.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self, context: &BootstrapContext) -> Result<InstalledVersion> {
        let url = self
            .settings
            .repository
            .url
            .as_deref()
            .ok_or(SetupError::MissingUrl)?;

        self.install_dependencies(context)?;
        let installed = Resolver::new(self.installer, &self.settings.editor)
            .resolve_and_install(context)?;
        self.checkout_config(url)?;
        if let Err(error) = sync_plugins(&installed.binary) {
            warn!("plugin sync failed, run it again from the editor: {error}");
        }
        self.install_python_packages();

        info!("setup complete: {installed}");
        Ok(installed)
    }

    /// Install supporting packages through the host's package manager.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::Bootstrap`] for unsupported hosts.
    /// - Return [`SetupError::Dependencies`] if the package manager fails.
    pub fn install_dependencies(&self, context: &BootstrapContext) -> Result<()> {
        let (manager, packages) = match &context.os_kind {
            OsKind::MacOs => (PackageManager::Brew, &self.settings.dependencies.brew),
            OsKind::DebianLike { .. } => (PackageManager::Apt, &self.settings.dependencies.apt),
            OsKind::Unknown => {
                return Err(BootstrapError::UnsupportedEnvironment(context.os_kind.clone()).into())
            }
        };

        info!("install {} dependencies: {}", manager, packages.join(" "));
        self.installer
            .update_index(manager)
            .and_then(|_| self.installer.install_packages(manager, packages))
            .map_err(|source| SetupError::Dependencies { manager, source })
    }

    /// Install Python packages backing the editor's Python provider.
    ///
    /// Best-effort, failures are only logged. Some distributions refuse user
    /// scoped pip installs outright.
    pub fn install_python_packages(&self) {
        let packages = &self.settings.dependencies.python;
        if packages.is_empty() {
            return;
        }

        info!("install python packages: {}", packages.join(" "));
        if let Err(error) = self.installer.install_packages(PackageManager::Pip, packages) {
            warn!("cannot install python packages: {error}");
        }
    }

    fn checkout_config(&self, url: &str) -> Result<()> {
        let path = self.settings.config_dir()?;
        let (mut repo, checkout) = ConfigRepo::ensure(url, &path, &self.settings.repository.branch)?;
        match checkout {
            Checkout::Existing => {
                repo.pull()?;
            }
            Checkout::Cloned {
                backup: Some(backup),
            } => info!("previous config kept at {:?}", backup.display()),
            Checkout::Cloned { backup: None } => {}
        }

        info!("config checkout ready at {:?}", path.display());
        Ok(())
    }
}

/// Setup error types.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// No remote URL was configured or given.
    #[error("no config repository url, set repository.url in settings or pass --url")]
    MissingUrl,

    /// Supporting packages cannot be installed.
    #[error("failed to install {manager} dependencies")]
    Dependencies {
        manager: PackageManager,
        #[source]
        source: HostError,
    },

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Friendly result alias :3
pub type Result<T, E = SetupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::fake::{Call, FakeInstaller};
    use pretty_assertions::assert_eq;

    #[test]
    fn debian_dependencies_go_through_apt() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = Settings::default();
        let setup = Setup::new(&installer, &settings);
        let context = BootstrapContext::new(
            OsKind::DebianLike {
                distro_version: "22.04".into(),
            },
            None,
        );

        setup.install_dependencies(&context)?;
        let expect = vec![
            Call::UpdateIndex(PackageManager::Apt),
            Call::Install(PackageManager::Apt, settings.dependencies.apt.clone()),
        ];
        assert_eq!(installer.calls(), expect);

        Ok(())
    }

    #[test]
    fn macos_dependencies_go_through_brew() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let settings = Settings::default();
        let setup = Setup::new(&installer, &settings);

        setup.install_dependencies(&BootstrapContext::new(OsKind::MacOs, None))?;
        let expect = vec![
            Call::UpdateIndex(PackageManager::Brew),
            Call::Install(PackageManager::Brew, settings.dependencies.brew.clone()),
        ];
        assert_eq!(installer.calls(), expect);

        Ok(())
    }

    #[test]
    fn failing_dependencies_abort_setup() {
        let installer = FakeInstaller::failing(["install_packages"]);
        let settings = Settings::default();
        let setup = Setup::new(&installer, &settings);

        let result = setup.install_dependencies(&BootstrapContext::new(OsKind::MacOs, None));
        assert!(matches!(
            result,
            Err(SetupError::Dependencies {
                manager: PackageManager::Brew,
                ..
            })
        ));
    }

    #[test]
    fn setup_without_url_does_nothing() {
        let installer = FakeInstaller::default();
        let settings = Settings::default();
        let setup = Setup::new(&installer, &settings);

        let result = setup.run(&BootstrapContext::new(OsKind::MacOs, None));
        assert!(matches!(result, Err(SetupError::MissingUrl)));
        assert_eq!(installer.calls(), Vec::new());
    }

    #[test]
    fn setup_on_unknown_host_installs_nothing() {
        let installer = FakeInstaller::default();
        let mut settings = Settings::default();
        settings.repository.url = Some("https://blah.org/nvim.git".into());
        let setup = Setup::new(&installer, &settings);

        let result = setup.run(&BootstrapContext::new(OsKind::Unknown, None));
        assert!(matches!(
            result,
            Err(SetupError::Bootstrap(BootstrapError::UnsupportedEnvironment(_)))
        ));
        assert_eq!(installer.calls(), Vec::new());
    }

    #[test]
    fn python_package_failure_is_not_fatal() {
        let installer = FakeInstaller::failing(["install_packages"]);
        let settings = Settings::default();
        let setup = Setup::new(&installer, &settings);

        setup.install_python_packages();
        let expect = vec![Call::Install(
            PackageManager::Pip,
            settings.dependencies.python.clone(),
        )];
        assert_eq!(installer.calls(), expect);
    }
}
