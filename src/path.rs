// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use chrono::{DateTime, TimeZone};
use std::{
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the Neovim configuration checkout.
///
/// Neovim reads its configuration from `$HOME/.config/nvim` on every platform
/// we support, macOS included. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join(".config").join("nvim"))
}

/// Determine default absolute path to the settings file of nvsync itself.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/nvsync/settings.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("nvsync").join("settings.toml"))
        .ok_or(NoWayHome)
}

/// Sibling path to rename an existing directory to before replacing it.
///
/// A directory `~/.config/nvim` backed up on 2025-03-01 at 14:05:09 becomes
/// `~/.config/nvim.backup.20250301_140509`. Backups are never removed by us.
pub fn backup_path<Tz>(path: impl AsRef<Path>, stamp: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let path = path.as_ref();
    let mut name = path
        .file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| OsString::from("backup"));
    name.push(format!(".backup.{}", stamp.format("%Y%m%d_%H%M%S")));
    path.with_file_name(name)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn backup_path_appends_timestamp() {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 9).unwrap();
        let result = backup_path("/home/blah/.config/nvim", &stamp);
        let expect = PathBuf::from("/home/blah/.config/nvim.backup.20250301_140509");
        assert_eq!(result, expect);
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn default_config_dir_lives_under_home() -> anyhow::Result<()> {
        let result = default_config_dir()?;
        let expect = PathBuf::from("/home/blah/.config/nvim");
        assert_eq!(result, expect);

        Ok(())
    }
}
