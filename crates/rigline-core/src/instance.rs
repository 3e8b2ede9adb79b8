// ── Single-instance guard ──
//
// An exclusive OS lock (`flock` on Unix, `LockFileEx` on Windows) held on an
// open lock file. The OS drops the lock when the holding process exits, so a
// crash never leaves a stale lock behind. The holder's PID is written into the
// file for diagnostics only; it plays no part in deciding ownership.
//
// The file itself is never deleted. Unlinking a locked path lets a second
// process lock a fresh inode while a third still waits on the old one.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Held for the lifetime of the agent process.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
    pid: u32,
}

impl InstanceLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| lock_error(&path, &e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_error(&path, &e))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let pid = read_pid(&path);
                debug!(path = %path.display(), ?pid, "instance lock held elsewhere");
                return Err(CoreError::AlreadyRunning { pid, path });
            }
            Err(TryLockError::Error(e)) => return Err(lock_error(&path, &e)),
        }

        let pid = std::process::id();
        write_pid(&mut file, pid).map_err(|e| lock_error(&path, &e))?;
        info!(path = %path.display(), pid, "instance lock acquired");
        Ok(Self { file, path, pid })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "failed to clear instance lock");
        }
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release instance lock");
        } else {
            debug!(path = %self.path.display(), "instance lock released");
        }
    }
}

fn write_pid(file: &mut File, pid: u32) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{pid}")?;
    file.flush()
}

/// Best effort: Windows locks are mandatory, so a contender cannot read it.
fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn lock_error(path: &Path, err: &io::Error) -> CoreError {
    CoreError::InstanceLock {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigline.lock");

        let held = InstanceLock::acquire(&path).unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRunning { .. }), "got {err:?}");
        #[cfg(unix)]
        assert!(
            matches!(err, CoreError::AlreadyRunning { pid: Some(p), .. } if p == std::process::id()),
            "got {err:?}"
        );

        drop(held);
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn freshly_created_empty_lock_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigline.lock");

        // A peer that has locked the file but not yet written its PID.
        let peer = File::create(&path).unwrap();
        peer.lock().unwrap();

        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRunning { pid: None, .. }), "got {err:?}");
    }

    #[test]
    fn leftover_file_without_a_holder_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rigline.lock");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        // What a crashed agent leaves behind: a PID nobody holds a lock for.
        fs::write(&path, "4194305\n").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert_eq!(lock.pid(), std::process::id());
        #[cfg(unix)]
        assert_eq!(read_pid(&path), Some(std::process::id()));
    }

    #[test]
    fn drop_clears_the_pid_and_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigline.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        assert!(path.exists());
        assert_eq!(read_pid(&path), None);
    }
}
