//! Single-instance guard for a crawl root
//!
//! Two processes crawling the same site into the same directory would fight
//! over the task store and temp files, so the crawl root carries a pid file
//! for as long as a crawler runs in it.

use crate::MirrorError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Pid file inside the crawl root
pub const LOCK_FILENAME: &str = "crawler.pid";

/// Held for the lifetime of a crawl; removes the pid file on drop
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Takes the lock for `crawl_root`
    ///
    /// A pid file naming a process that no longer exists is replaced. Process
    /// liveness is only checked on Linux; elsewhere any existing pid file
    /// counts as held.
    pub fn acquire(crawl_root: &Path) -> Result<Self, MirrorError> {
        let path = crawl_root.join(LOCK_FILENAME);

        // One retry after removing a stale file
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .and_then(|_| file.sync_all())
                        .map_err(|e| MirrorError::filesystem(&path, e))?;
                    tracing::debug!(path = %path.display(), "acquired crawl lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = read_pid(&path);
                    match holder {
                        Some(pid) if process_alive(pid) => {
                            return Err(MirrorError::AlreadyRunning {
                                pid,
                                lock_path: path,
                            });
                        }
                        _ => {
                            tracing::warn!(
                                path = %path.display(),
                                stale_pid = ?holder,
                                "removing stale crawl lock"
                            );
                            match fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(MirrorError::filesystem(&path, e)),
                            }
                        }
                    }
                }
                Err(e) => return Err(MirrorError::filesystem(&path, e)),
            }
        }

        Err(MirrorError::AlreadyRunning {
            pid: read_pid(&path).unwrap_or(0),
            lock_path: path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release crawl lock");
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id() || Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILENAME);

        {
            let lock = PidLock::acquire(dir.path()).unwrap();
            assert_eq!(lock.path(), path);
            assert_eq!(read_pid(&path), Some(std::process::id()));
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let _lock = PidLock::acquire(dir.path()).unwrap();

        let result = PidLock::acquire(dir.path());
        match result {
            Err(MirrorError::AlreadyRunning { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCK_FILENAME), "not a pid").unwrap();

        let lock = PidLock::acquire(dir.path()).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dead_pid_is_replaced() {
        let dir = TempDir::new().unwrap();
        // Above the default pid_max, never a live process
        fs::write(dir.path().join(LOCK_FILENAME), "4194305\n").unwrap();

        let lock = PidLock::acquire(dir.path()).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
    }
}
