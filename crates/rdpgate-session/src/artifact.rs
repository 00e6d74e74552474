//! Permission-restricted local files
//!
//! Secrets (bundles, ingress configs, login credentials) are created with mode
//! 0600 from the start; they are never written world-readable and tightened
//! afterwards.

use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use nix::unistd::User;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::SessionError;
use crate::provider::Removal;

pub const PRIVATE_FILE_MODE: u32 = 0o600;
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Directories the tunnel client's account reads from, via their group
pub const SHARED_DIR_MODE: u32 = 0o750;

/// Create `dir` (and parents) with `mode`. An existing directory keeps its
/// mode. Returns whether the directory was created.
pub async fn ensure_dir(dir: &Path, mode: u32) -> Result<bool, SessionError> {
    let existed = fs::try_exists(dir)
        .await
        .map_err(|e| SessionError::local("inspect", dir, e))?;
    if existed {
        return Ok(false);
    }

    fs::create_dir_all(dir)
        .await
        .map_err(|e| SessionError::local("create directory", dir, e))?;
    fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| SessionError::local("set permissions on", dir, e))?;
    Ok(true)
}

/// Write `contents` to a fresh 0600 file, replacing any previous one
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(PRIVATE_FILE_MODE)
        .open(path)
        .await
        .map_err(|e| SessionError::local("create", path, e))?;

    file.write_all(contents)
        .await
        .map_err(|e| SessionError::local("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| SessionError::local("sync", path, e))?;

    // The mode passed to open() only applies when the file is new
    fs::set_permissions(path, std::fs::Permissions::from_mode(PRIVATE_FILE_MODE))
        .await
        .map_err(|e| SessionError::local("set permissions on", path, e))
}

/// Append to a 0600 file, creating it when missing
pub async fn append_private(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    let mut file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .mode(PRIVATE_FILE_MODE)
        .open(path)
        .await
        .map_err(|e| SessionError::local("open", path, e))?;

    file.write_all(contents)
        .await
        .map_err(|e| SessionError::local("append to", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| SessionError::local("sync", path, e))
}

fn account(path: &Path, user: &str) -> Result<User, SessionError> {
    User::from_name(user)
        .map_err(|e| SessionError::local("look up owner for", path, std::io::Error::from(e)))?
        .ok_or_else(|| {
            SessionError::Precondition(format!("service account '{}' does not exist", user))
        })
}

/// Hand a file to the account the tunnel client runs as
pub fn chown_to_user(path: &Path, user: &str) -> Result<(), SessionError> {
    let account = account(path, user)?;
    nix::unistd::chown(path, Some(account.uid), Some(account.gid))
        .map_err(|e| SessionError::local("change owner of", path, std::io::Error::from(e)))
}

/// Make sure `user` can enter `dir`
///
/// A directory created by this run is given to the account's primary group.
/// An existing one is left untouched and must already let the account in.
pub fn admit_user(dir: &Path, user: &str, created: bool) -> Result<(), SessionError> {
    let account = account(dir, user)?;
    if created {
        return nix::unistd::chown(dir, None, Some(account.gid))
            .map_err(|e| SessionError::local("change group of", dir, std::io::Error::from(e)));
    }

    let meta = std::fs::metadata(dir).map_err(|e| SessionError::local("inspect", dir, e))?;
    if can_enter(&meta, &account) {
        Ok(())
    } else {
        Err(SessionError::Precondition(format!(
            "service account '{}' cannot enter {} (mode {:o}, owner {}:{}); \
             grant it search permission or unset service_user",
            user,
            dir.display(),
            meta.mode() & 0o7777,
            meta.uid(),
            meta.gid()
        )))
    }
}

/// Search permission by owner, primary group or other bits
fn can_enter(meta: &std::fs::Metadata, account: &User) -> bool {
    let mode = meta.mode();
    if account.uid.is_root() {
        true
    } else if meta.uid() == account.uid.as_raw() {
        mode & 0o100 != 0
    } else if meta.gid() == account.gid.as_raw() {
        mode & 0o010 != 0
    } else {
        mode & 0o001 != 0
    }
}

/// Delete a file; a missing file is not an error
pub async fn remove_file(path: &Path) -> Result<Removal, std::io::Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
        Err(e) => Err(e),
    }
}

/// Last `lines` lines of a text file, or a placeholder when it cannot be read
pub async fn tail(path: &Path, lines: usize) -> String {
    match fs::read(path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let all: Vec<&str> = text.lines().collect();
            let start = all.len().saturating_sub(lines);
            if all.is_empty() {
                format!("(log {} is empty)", path.display())
            } else {
                all[start..].join("\n")
            }
        }
        Err(e) => format!("(log {} unavailable: {})", path.display(), e),
    }
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
