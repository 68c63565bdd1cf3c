//! Single-instance guard.
//!
//! The lock is a marker file in the working directory. It is created with
//! `create_new`, so two processes racing for it cannot both win, and it holds the
//! owner's pid for whoever has to clean up after a crash.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::common::errors::StartupError;

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Claims the lock, failing if the marker file already exists.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, StartupError> {
        let path = path.as_ref().to_path_buf();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StartupError::AlreadyRunning(path));
            }
            Err(source) => return Err(StartupError::Lock { path, source }),
        };

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Could not write pid into {}: {}", path.display(), e);
        }

        debug!("Acquired instance lock {}", path.display());
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the marker file. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Released instance lock {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}
