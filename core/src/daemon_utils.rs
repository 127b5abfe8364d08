use std::env::var;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::constants::{HOME_DIR, HOME_SOCK_DIR, LOCK_FILE_EXTENSION, RUNTIME_DIR, SOCK_FILE_NAME};
use crate::error::{Error, Result};

/// if we can't lock the file then another broker owns the socket
pub fn is_daemon_running(sock_path: &Path) -> bool {
    lock_daemon_file(&lock_path_for(sock_path)).is_err()
}

pub fn lock_path_for(sock_path: &Path) -> PathBuf {
    sock_path.with_extension(LOCK_FILE_EXTENSION)
}

/// the returned file holds the lock until dropped
pub fn lock_daemon_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        create_dir_all(parent)?;
    }
    let file = File::create(lock_path)?;
    file.try_lock_exclusive()?;
    Ok(file)
}

pub fn get_sock_path() -> Result<PathBuf> {
    // For linux systems
    if let Ok(runtime_dir) = var(RUNTIME_DIR) {
        return Ok(PathBuf::from(runtime_dir).join(SOCK_FILE_NAME));
    }

    if let Ok(home_dir) = var(HOME_DIR) {
        let path = PathBuf::from(home_dir).join(HOME_SOCK_DIR).join(SOCK_FILE_NAME);

        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(Error::DaemonFileError)?;
        }

        return Ok(path);
    }

    Err(Error::Custom(
        "Could not determine socket path: neither XDG_RUNTIME_DIR nor HOME are set".to_string(),
    ))
}
