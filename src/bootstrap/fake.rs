// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Recording installer double for resolver tests.

use crate::{
    bootstrap::host::{self, HostError, Installer, PackageManager},
    syscall::SyscallError,
};

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

const LATEST: &str = "v0.11.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    UpdateIndex(PackageManager),
    Install(PackageManager, Vec<String>),
    Remove(PackageManager, Vec<String>),
    AddRepository(String),
    LatestRelease,
    Fetch(String),
    InstallBinary(PathBuf),
    RemovePath(PathBuf),
}

#[derive(Debug, Default)]
pub(crate) struct FakeInstaller {
    pub(crate) calls: RefCell<Vec<Call>>,
    pub(crate) versions: RefCell<HashMap<OsString, String>>,
    pub(crate) fetched: RefCell<Option<String>>,
    pub(crate) failing: HashSet<&'static str>,
    pub(crate) broken_apt_binary: bool,
}

impl FakeInstaller {
    pub(crate) fn failing(operations: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            failing: operations.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_binary(self, binary: &str, version: &str) -> Self {
        self.versions
            .borrow_mut()
            .insert(binary.into(), version.into());
        self
    }

    fn record(&self, operation: &'static str, call: Call) -> host::Result<()> {
        self.calls.borrow_mut().push(call);
        if self.failing.contains(operation) {
            return Err(HostError::Syscall(SyscallError::Status {
                command: operation.into(),
                message: "simulated failure".into(),
            }));
        }

        Ok(())
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn installed_anything(&self) -> bool {
        self.calls().iter().any(|call| {
            matches!(
                call,
                Call::Install(..) | Call::InstallBinary(_) | Call::AddRepository(_)
            )
        })
    }
}

impl Installer for FakeInstaller {
    fn update_index(&self, manager: PackageManager) -> host::Result<()> {
        self.record("update_index", Call::UpdateIndex(manager))
    }

    fn install_packages(&self, manager: PackageManager, packages: &[String]) -> host::Result<()> {
        self.record("install_packages", Call::Install(manager, packages.to_vec()))?;
        if packages.iter().any(|package| package == "neovim") {
            let (binary, version) = match manager {
                PackageManager::Apt if self.broken_apt_binary => return Ok(()),
                PackageManager::Apt => ("/usr/bin/nvim", "NVIM v0.12.0-dev"),
                _ => ("nvim", "NVIM v0.11.0"),
            };
            self.versions
                .borrow_mut()
                .insert(binary.into(), version.into());
        }

        Ok(())
    }

    fn remove_packages(&self, manager: PackageManager, packages: &[String]) -> host::Result<()> {
        self.record("remove_packages", Call::Remove(manager, packages.to_vec()))
    }

    fn add_package_repository(&self, repository: &str) -> host::Result<()> {
        self.record("add_package_repository", Call::AddRepository(repository.into()))
    }

    fn latest_release(&self, _api: &str) -> host::Result<String> {
        self.record("latest_release", Call::LatestRelease)?;
        Ok(LATEST.into())
    }

    fn fetch_artifact(&self, url: &str, _destination: &Path) -> host::Result<()> {
        self.record("fetch_artifact", Call::Fetch(url.into()))?;
        *self.fetched.borrow_mut() = Some(url.into());
        Ok(())
    }

    fn install_binary(&self, _source: &Path, destination: &Path) -> host::Result<()> {
        self.record("install_binary", Call::InstallBinary(destination.into()))?;
        let fetched = self.fetched.borrow().clone().unwrap_or_default();
        let version = if fetched.contains("v0.9.5") {
            "NVIM v0.9.5"
        } else {
            "NVIM v0.11.0"
        };
        self.versions
            .borrow_mut()
            .insert(destination.as_os_str().into(), version.into());
        Ok(())
    }

    fn remove_path(&self, path: &Path) -> host::Result<()> {
        self.record("remove_path", Call::RemovePath(path.into()))?;
        self.versions.borrow_mut().remove(path.as_os_str());
        Ok(())
    }

    fn version_of(&self, program: &OsStr) -> Option<String> {
        self.versions.borrow().get(program).cloned()
    }
}
