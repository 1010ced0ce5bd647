// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process invocation.
//!
//! Every collaborator nvsync drives, e.g., package managers, curl, the editor
//! itself, is invoked through these helpers. All calls block until the child
//! process exits.

use std::{
    ffi::{OsStr, OsString},
    process::Command,
};
use tracing::{debug, instrument};

/// Run command attached to the current terminal.
///
/// Lets the child process prompt the user, e.g., for a sudo password.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be spawned.
/// - Return [`SyscallError::Status`] if command exits with non-zero status.
#[instrument(skip(cmd, args), level = "debug")]
pub fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let args = collect_args(args);
    debug!("run {}", render(cmd.as_ref(), &args));
    let status = Command::new(cmd.as_ref())
        .args(&args)
        .spawn()
        .map_err(|source| SyscallError::Spawn {
            source,
            command: render(cmd.as_ref(), &args),
        })?
        .wait()
        .map_err(|source| SyscallError::Spawn {
            source,
            command: render(cmd.as_ref(), &args),
        })?;

    if !status.success() {
        return Err(SyscallError::Status {
            command: render(cmd.as_ref(), &args),
            message: status.to_string(),
        });
    }

    Ok(())
}

/// Run command with captured output.
///
/// Returns standard output with trailing newlines chomped. Standard error is
/// only reported when the command fails.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be spawned.
/// - Return [`SyscallError::Status`] if command exits with non-zero status.
#[instrument(skip(cmd, args), level = "debug")]
pub fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = collect_args(args);
    debug!("run {}", render(cmd.as_ref(), &args));
    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|source| SyscallError::Spawn {
            source,
            command: render(cmd.as_ref(), &args),
        })?;
    let stdout = chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned());
    let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());

    if !output.status.success() {
        let message = if stderr.is_empty() { stdout } else { stderr };
        return Err(SyscallError::Status {
            command: render(cmd.as_ref(), &args),
            message,
        });
    }

    Ok(stdout)
}

/// Prefix command with sudo if privilege escalation is wanted.
pub fn privileged(
    sudo: bool,
    cmd: impl Into<OsString>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> (OsString, Vec<OsString>) {
    let cmd = cmd.into();
    let mut args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
    if sudo {
        args.insert(0, cmd);
        ("sudo".into(), args)
    } else {
        (cmd, args)
    }
}

fn collect_args(args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect()
}

fn render(cmd: &OsStr, args: &[OsString]) -> String {
    let mut line = cmd.to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(arg.to_string_lossy().as_ref());
    }
    line
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message.trim_end_matches(['\r', '\n']).to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Command could not be started or waited on.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command ran but reported failure.
    #[error("command {command:?} failed: {message}")]
    Status { command: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
