// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration checkout synchronization.
//!
//! The editor configuration lives in a plain Git checkout, by default at
//! `$HOME/.config/nvim`. This module keeps that checkout in sync with its
//! remote: cloning it onto a fresh machine, pushing local edits, and pulling
//! remote edits.
//!
//! # Pulling With Local Edits
//!
//! Local edits are stashed before a pull, and re-applied afterwards. If
//! re-applying them conflicts with what was pulled, the stash is left in place
//! for the user to sort out, and [`SyncError::SyncConflict`] is returned.
//! Diverged histories are never merged automatically.
//!
//! # Backups
//!
//! An existing directory that is not a checkout of the configured remote is
//! renamed to a timestamped backup before cloning. Backups are never deleted.

use crate::path::backup_path;

use auth_git2::{GitAuthenticator, Prompter};
use chrono::Local;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository,
    StashFlags, StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fs::rename,
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument, warn};

/// How [`ConfigRepo::ensure`] obtained the checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    /// Checkout of the same remote was already in place.
    Existing,

    /// Freshly cloned, with the backup of whatever was in the way.
    Cloned { backup: Option<PathBuf> },
}

/// Result of [`ConfigRepo::push_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Working tree had no changes, and origin already has every commit.
    NothingToCommit,

    /// Changes were committed if needed, and the branch was pushed.
    Pushed { commit: Oid },
}

/// Result of [`ConfigRepo::pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Local branch already matched remote.
    UpToDate,

    /// Local branch moved forward to remote.
    FastForward,
}

/// Configuration checkout.
pub struct ConfigRepo {
    repository: Repository,
    branch: String,
}

impl std::fmt::Debug for ConfigRepo {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ConfigRepo")
            .field("path", &self.repository.path())
            .field("branch", &self.branch)
            .finish()
    }
}

impl ConfigRepo {
    /// Open existing checkout.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Git2`] if path is not a Git checkout.
    pub fn open(path: impl AsRef<Path>, branch: impl Into<String>) -> Result<Self> {
        debug!("open config checkout {:?}", path.as_ref().display());
        Ok(Self {
            repository: Repository::open(path.as_ref())?,
            branch: branch.into(),
        })
    }

    /// Make sure a checkout of remote exists at path.
    ///
    /// Reuses a checkout whose origin already points at the same remote as
    /// URL. Scheme, user, port, and a trailing ".git" are ignored in that
    /// comparison, so SSH and HTTPS URLs of one remote match. Anything else at
    /// path gets backed up first, then the remote is cloned.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Backup`] if existing path cannot be moved aside.
    /// - Return [`SyncError::Git2`] if cloning fails.
    #[instrument(skip(url, path, branch), level = "debug")]
    pub fn ensure(
        url: impl AsRef<str>,
        path: impl AsRef<Path>,
        branch: impl Into<String>,
    ) -> Result<(Self, Checkout)> {
        let path = path.as_ref();
        let branch = branch.into();
        let mut backup = None;

        if path.exists() {
            if let Ok(existing) = Self::open(path, branch.clone()) {
                let same_remote = existing.origin_url().is_some_and(|origin| {
                    remote_identity(&origin) == remote_identity(url.as_ref())
                });
                if same_remote {
                    info!("config checkout already at {:?}", path.display());
                    return Ok((existing, Checkout::Existing));
                }
            }

            let target = backup_path(path, &Local::now());
            warn!("back up {:?} to {:?}", path.display(), target.display());
            rename(path, &target).map_err(|source| SyncError::Backup {
                source,
                path: path.to_path_buf(),
            })?;
            backup = Some(target);
        }

        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|source| SyncError::CreateDir {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        let repo = Self::try_clone(url, path, branch, ProgressBar::new(0))?;
        Ok((repo, Checkout::Cloned { backup }))
    }

    /// Clone remote into path.
    ///
    /// The progress of the clone is displayed through a progress bar. If
    /// credentials are required, the user is prompted for them, and the
    /// progress bar is suspended meanwhile.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Git2`] if libgit2 operations fail.
    /// - Return [`SyncError::IndicatifStyleTemplate`] if progress bar styling
    ///   fails.
    pub fn try_clone(
        url: impl AsRef<str>,
        path: impl AsRef<Path>,
        branch: impl Into<String>,
        bar: ProgressBar,
    ) -> Result<Self> {
        let branch = branch.into();
        info!("clone {} into {:?}", url.as_ref(), path.as_ref().display());

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.as_ref().to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            let bar_size = stats.total_objects() as u64;
            let bar_pos = stats.received_objects() as u64;
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(bar_size);
                prompter.bar.set_position(bar_pos);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let repository = RepoBuilder::new()
            .branch(&branch)
            .fetch_options(fo)
            .clone(url.as_ref(), path.as_ref());
        prompter.bar.finish_and_clear();

        Ok(Self {
            repository: repository?,
            branch,
        })
    }

    /// URL of the origin remote, if any.
    pub fn origin_url(&self) -> Option<String> {
        self.repository
            .find_remote("origin")
            .ok()
            .and_then(|remote| remote.url().map(ToString::to_string))
    }

    /// Name of the branch HEAD points at.
    pub fn current_branch(&self) -> Option<String> {
        self.repository
            .head()
            .ok()
            .and_then(|head| head.shorthand().map(ToString::to_string))
    }

    /// Path to the working tree.
    pub fn work_dir(&self) -> Option<&Path> {
        self.repository.workdir()
    }

    /// Does the working tree differ from HEAD, untracked files included?
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Git2`] if status cannot be read.
    pub fn has_local_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repository.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Stage everything, commit it, and push to origin.
    ///
    /// Commits left behind by an earlier push that failed are pushed too, even
    /// when the working tree is clean.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Git2`] if committing or pushing fails, including
    ///   the remote rejecting the update.
    #[instrument(skip(self, message), level = "debug")]
    pub fn push_changes(&self, message: impl AsRef<str>) -> Result<PushOutcome> {
        let commit = if self.has_local_changes()? {
            let commit = self.commit_all(message.as_ref())?;
            info!("committed {commit}: {}", message.as_ref());
            commit
        } else if let Some(commit) = self.unpushed_commit()? {
            warn!("working tree is clean, but {commit} never reached origin");
            commit
        } else {
            return Ok(PushOutcome::NothingToCommit);
        };

        self.push()?;
        info!("pushed {} to origin", self.branch);

        Ok(PushOutcome::Pushed { commit })
    }

    /// Pull remote changes, stashing local edits around the pull.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::SyncConflict`] if stashed edits cannot be
    ///   re-applied, or histories diverged.
    /// - Return [`SyncError::Git2`] if fetching fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&mut self) -> Result<PullOutcome> {
        let stashed = if self.has_local_changes()? {
            warn!("stash local changes before pull");
            let signature = self.repository.signature()?;
            self.repository.stash_save(
                &signature,
                "nvsync: autostash before pull",
                Some(StashFlags::INCLUDE_UNTRACKED),
            )?;
            true
        } else {
            false
        };

        let outcome = self.fetch_and_fast_forward();

        if stashed {
            self.restore_stash()?;
            info!("re-applied stashed local changes");
        }

        outcome
    }

    /// Tip of local branch if origin lacks any of its commits.
    fn unpushed_commit(&self) -> Result<Option<Oid>> {
        let Some(local) = self.repository.head().ok().and_then(|head| head.target()) else {
            return Ok(None);
        };

        let tracking = format!("refs/remotes/origin/{}", self.branch);
        match self.repository.refname_to_id(&tracking) {
            Ok(upstream) => {
                let (ahead, _) = self.repository.graph_ahead_behind(local, upstream)?;
                Ok((ahead > 0).then_some(local))
            }
            Err(error) if error.code() == ErrorCode::NotFound => Ok(Some(local)),
            Err(error) => Err(error.into()),
        }
    }

    fn commit_all(&self, message: &str) -> Result<Oid> {
        let mut index = self.repository.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        // INVARIANT: Always use new tree produced by index after staging.
        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commit to append to.
        let signature = self.repository.signature()?;
        let parent = self
            .repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents = parent.iter().collect::<Vec<_>>();

        Ok(self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?)
    }

    fn push(&self) -> Result<()> {
        let mut remote = self.repository.find_remote("origin")?;
        let prompter = IndicatifPrompter::new(ProgressBar::hidden());
        let authenticator = GitAuthenticator::default().set_prompter(prompter);
        let config = Config::open_default()?;

        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.push_update_reference(|refname, status| match status {
            Some(message) => Err(git2::Error::from_str(&format!(
                "remote rejected {refname}: {message}"
            ))),
            None => Ok(()),
        });

        let mut po = PushOptions::new();
        po.remote_callbacks(rc);
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
        remote.push(&[refspec.as_str()], Some(&mut po))?;

        Ok(())
    }

    fn fetch_and_fast_forward(&self) -> Result<PullOutcome> {
        let mut remote = self.repository.find_remote("origin")?;
        let prompter = IndicatifPrompter::new(ProgressBar::hidden());
        let authenticator = GitAuthenticator::default().set_prompter(prompter);
        let config = Config::open_default()?;

        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        remote.fetch(&[self.branch.as_str()], Some(&mut fo), None)?;

        let fetch_head = self.repository.find_reference("FETCH_HEAD")?;
        let fetch_commit = self.repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repository.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            info!("config already up to date");
            return Ok(PullOutcome::UpToDate);
        }

        if !(analysis.is_fast_forward() || analysis.is_unborn()) {
            return Err(SyncError::SyncConflict(format!(
                "local {0} and origin/{0} diverged, merge them manually",
                self.branch
            )));
        }

        let refname = format!("refs/heads/{}", self.branch);
        match self.repository.find_reference(&refname) {
            Ok(mut reference) => {
                reference.set_target(fetch_commit.id(), "nvsync: fast-forward")?;
            }
            Err(_) => {
                self.repository
                    .reference(&refname, fetch_commit.id(), true, "nvsync: create branch")?;
            }
        }
        self.repository.set_head(&refname)?;
        self.repository
            .checkout_head(Some(CheckoutBuilder::default().force()))?;
        info!("fast-forwarded {} to {}", self.branch, fetch_commit.id());

        Ok(PullOutcome::FastForward)
    }

    // INVARIANT: Only drop the stash once it applied without conflicts.
    fn restore_stash(&mut self) -> Result<()> {
        let conflict = |detail: String| {
            SyncError::SyncConflict(format!(
                "stashed local changes conflict with pulled changes ({detail}), \
                 they are kept in stash@{{0}}"
            ))
        };

        self.repository
            .stash_apply(0, None)
            .map_err(|error| conflict(error.message().to_string()))?;
        if self.repository.index()?.has_conflicts() {
            return Err(conflict("conflicting files in index".into()));
        }
        self.repository.stash_drop(0)?;

        Ok(())
    }
}

/// Reduce remote URL to host and path.
///
/// Handles URLs with a scheme, and scp-like "user@host:path" syntax. Local
/// paths only lose their trailing ".git".
fn remote_identity(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    let location = match url.split_once("://") {
        Some((_, location)) => location.to_string(),
        None => match url.split_once(':') {
            Some((host, path)) if !host.contains('/') => format!("{host}/{path}"),
            _ => return url.to_string(),
        },
    };

    let (authority, path) = location.split_once('/').unwrap_or((location.as_str(), ""));
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host.split_once(':').map_or(host, |(host, _)| host);
    format!("{}/{}", host.to_ascii_lowercase(), path.trim_start_matches('/'))
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local and remote changes cannot be reconciled automatically.
    #[error("sync conflict: {0}")]
    SyncConflict(String),

    /// Existing directory cannot be moved aside.
    #[error("failed to back up {:?}", path.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Parent directory of checkout cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
