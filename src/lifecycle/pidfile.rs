//! Process id file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file holding this process's id, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Write the current process id to `path`, replacing any previous content.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let pid = std::process::id();
        fs::write(&path, pid.to_string())?;
        tracing::debug!(path = %path.display(), pid, "Wrote pid file");
        Ok(Self { path, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove pid file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_pid_and_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.pid");
        fs::write(&path, "stale content that is longer").unwrap();

        let pid_file = PidFile::create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), std::process::id().to_string());
        assert_eq!(pid_file.pid(), std::process::id());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PidFile::create(dir.path().join("nope/svc.pid")).is_err());
    }
}
