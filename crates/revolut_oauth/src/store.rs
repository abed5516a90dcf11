use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::token::TokenData;
use crate::Error;

/// Durable home of the current [`TokenData`].
///
/// Writes go through a sibling temp file that is created owner-only and then
/// renamed over the target, so the credential file is never observed half
/// written or with loose permissions.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored credential, or `None` when it is absent or unreadable.
    pub fn load(&self) -> Option<TokenData> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!(path = %self.path.display(), "failed to read credential file: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<TokenData>(&raw) {
            Ok(token) => {
                if token.is_expired_at(chrono::Utc::now(), 0) {
                    warn!("stored access token has expired");
                } else {
                    info!(
                        "loaded access token, valid for {} min",
                        token.time_until_expiry() / 60
                    );
                }
                Some(token)
            }
            Err(e) => {
                error!(path = %self.path.display(), "ignoring corrupt credential file: {}", e);
                None
            }
        }
    }

    pub fn save(&self, token: &TokenData) -> Result<(), Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        if self.path.exists() {
            restrict_permissions(&self.path)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        write_private(&dir, &self.path, contents.as_bytes())?;

        debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    /// Removes the stored credential. Absent files are not an error.
    pub fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("stored credential cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `contents` to an owner-only temp file in `dir`, ready to be
/// persisted over its final name.
pub(crate) fn stage_private(dir: &Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    restrict_permissions(tmp.path())?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Atomically replaces `target` with `contents`, owner read/write only.
pub(crate) fn write_private(dir: &Path, target: &Path, contents: &[u8]) -> io::Result<()> {
    persist_private(stage_private(dir, contents)?, target)
}

pub(crate) fn persist_private(tmp: NamedTempFile, target: &Path) -> io::Result<()> {
    tmp.persist(target).map_err(|e| e.error)?;
    restrict_permissions(target)
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
