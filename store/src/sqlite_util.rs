//! Opening the store database owner-only, and timestamp columns.

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

/// Open the database at `path`, creating its directory and file if needed.
///
/// On Unix the directory is tightened to 0o700 (only when we own it) and the
/// database file plus any WAL/SHM sidecars to 0o600.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        #[cfg(unix)]
        restrict_owned_dir(dir)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to create store file {}", path.display()))?;
    #[cfg(unix)]
    restrict_db_files(path)?;

    Connection::open(path).with_context(|| format!("Failed to open store at {}", path.display()))
}

#[cfg(unix)]
fn restrict_owned_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata = fs::metadata(dir)
        .with_context(|| format!("Failed to inspect store directory {}", dir.display()))?;
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    if metadata.uid() == uid && metadata.permissions().mode() & 0o077 != 0 {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to restrict store directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_db_files(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict store file {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(path, suffix);
        if sidecar.exists() {
            fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600)).with_context(
                || format!("Failed to restrict store file {}", sidecar.display()),
            )?;
        }
    }
    Ok(())
}

#[cfg(any(unix, test))]
fn sidecar_path(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    name.into()
}

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in store: {raw:?}"))
}
