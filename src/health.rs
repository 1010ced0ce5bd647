// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installed component status report.
//!
//! Gathering a report never fails. Anything that cannot be determined is
//! simply reported as missing.

use crate::{
    bootstrap::{host::Installer, select_strategy, Plan},
    context::BootstrapContext,
    sync::ConfigRepo,
};

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Tools the configuration relies on, with alternative binary names.
const TOOLS: &[(&str, &[&str])] = &[
    ("nvim", &["nvim"]),
    ("git", &["git"]),
    ("node", &["node"]),
    ("python3", &["python3"]),
    ("ripgrep", &["rg"]),
    ("fd", &["fd", "fdfind"]),
];

/// Status of a single tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Tool runs, and reported this version line.
    Found(String),

    /// Tool is not installed, or does not run.
    Missing,
}

/// Named tool with its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: &'static str,
    pub status: ComponentStatus,
}

/// State of the configuration checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    /// Nothing at the configured path.
    Missing,

    /// Something is there, but it is not a Git checkout.
    NotCheckout,

    /// Git checkout.
    Checkout {
        branch: Option<String>,
        origin: Option<String>,
        dirty: bool,
    },
}

/// Snapshot of everything nvsync manages on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub context: BootstrapContext,
    pub plan: Option<Plan>,
    pub components: Vec<Component>,
    pub config_dir: PathBuf,
    pub config: ConfigStatus,
}

impl HealthReport {
    /// Gather report for context.
    pub fn gather(
        installer: &impl Installer,
        context: BootstrapContext,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        let plan = select_strategy(&context).ok();
        let components = TOOLS
            .iter()
            .map(|&(name, binaries)| Component {
                name,
                status: binaries
                    .iter()
                    .find_map(|binary| installer.version_of(OsStr::new(binary)))
                    .map_or(ComponentStatus::Missing, ComponentStatus::Found),
            })
            .collect();
        let config_dir = config_dir.into();
        let config = config_status(&config_dir);

        Self {
            context,
            plan,
            components,
            config_dir,
            config,
        }
    }

    /// Log report with severity per entry.
    pub fn log(&self) {
        info!("host: {}", self.context);
        match &self.plan {
            Some(plan) => match plan.fallback {
                Some(fallback) => info!(
                    "editor install strategy: {} (fallback {fallback})",
                    plan.primary
                ),
                None => info!("editor install strategy: {}", plan.primary),
            },
            None => warn!("editor install strategy: none, host is unsupported"),
        }

        for component in &self.components {
            match &component.status {
                ComponentStatus::Found(version) => info!("{}: {version}", component.name),
                ComponentStatus::Missing => warn!("{}: not found", component.name),
            }
        }

        let dir = self.config_dir.display();
        match &self.config {
            ConfigStatus::Missing => warn!("config: nothing at {dir:?}"),
            ConfigStatus::NotCheckout => warn!("config: {dir:?} is not a git checkout"),
            ConfigStatus::Checkout {
                branch,
                origin,
                dirty,
            } => {
                let branch = branch.as_deref().unwrap_or("(no branch)");
                let origin = origin.as_deref().unwrap_or("(no origin)");
                if *dirty {
                    warn!("config: {dir:?} on {branch} from {origin} has local changes");
                } else {
                    info!("config: {dir:?} on {branch} from {origin} is clean");
                }
            }
        }
    }

    /// Did every tool turn up?
    pub fn all_found(&self) -> bool {
        self.components
            .iter()
            .all(|component| component.status != ComponentStatus::Missing)
    }
}

fn config_status(path: &Path) -> ConfigStatus {
    if !path.exists() {
        return ConfigStatus::Missing;
    }

    // INVARIANT: Branch name is irrelevant for read-only inspection.
    match ConfigRepo::open(path, String::new()) {
        Ok(repo) => ConfigStatus::Checkout {
            branch: repo.current_branch(),
            origin: repo.origin_url(),
            dirty: repo.has_local_changes().unwrap_or(false),
        },
        Err(_) => ConfigStatus::NotCheckout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bootstrap::fake::FakeInstaller, context::OsKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn report_finds_tools_by_alternative_names() {
        let installer = FakeInstaller::default()
            .with_binary("nvim", "NVIM v0.11.0")
            .with_binary("git", "git version 2.43.0")
            .with_binary("fdfind", "fdfind 9.0.0");
        let context = BootstrapContext::new(OsKind::MacOs, None);

        let report = HealthReport::gather(&installer, context, "/nonexistent/nvsync/nvim");
        let status = |name: &str| {
            report
                .components
                .iter()
                .find(|component| component.name == name)
                .map(|component| component.status.clone())
                .unwrap()
        };

        assert_eq!(status("nvim"), ComponentStatus::Found("NVIM v0.11.0".into()));
        assert_eq!(status("fd"), ComponentStatus::Found("fdfind 9.0.0".into()));
        assert_eq!(status("ripgrep"), ComponentStatus::Missing);
        assert!(!report.all_found());
        assert_eq!(report.config, ConfigStatus::Missing);
    }

    #[test]
    fn report_on_unknown_host_has_no_plan() {
        let installer = FakeInstaller::default();
        let context = BootstrapContext::new(OsKind::Unknown, None);

        let report = HealthReport::gather(&installer, context, "/nonexistent/nvsync/nvim");
        assert_eq!(report.plan, None);
        report.log();
    }

    #[test]
    fn report_inspects_config_checkout() -> anyhow::Result<()> {
        let installer = FakeInstaller::default();
        let plain = tempfile::tempdir()?;
        let context = BootstrapContext::new(OsKind::MacOs, None);

        let report = HealthReport::gather(&installer, context.clone(), plain.path());
        assert_eq!(report.config, ConfigStatus::NotCheckout);

        let checkout = tempfile::tempdir()?;
        git2::Repository::init(checkout.path())?;
        std::fs::write(checkout.path().join("init.lua"), "vim.g.mapleader = ' '\n")?;

        let report = HealthReport::gather(&installer, context, checkout.path());
        let ConfigStatus::Checkout { origin, dirty, .. } = &report.config else {
            panic!("expected checkout, got {:?}", report.config);
        };
        assert_eq!(*origin, None);
        assert!(*dirty);

        Ok(())
    }
}
