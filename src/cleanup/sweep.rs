//! TTL sweep over the downloads root
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::storage::{Result, TaskDirs};

/// Sweep statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: Vec<PathBuf>,
    pub failed: usize,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// `true` when `dir` was last modified more than `ttl` before `now`.
/// Modification times in the future never expire.
fn is_expired(dir: &Path, ttl: Duration, now: SystemTime) -> std::io::Result<bool> {
    let modified = std::fs::metadata(dir)?.modified()?;
    Ok(now
        .duration_since(modified)
        .map(|age| age > ttl)
        .unwrap_or(false))
}

/// Deletes every top-level directory older than `ttl`.
///
/// Failures on individual directories are logged and counted; only an
/// unreadable root fails the sweep.
pub fn sweep_expired(dirs: &TaskDirs, ttl: Duration, now: SystemTime) -> Result<SweepReport> {
    sweep_expired_with(dirs, ttl, now, |dir| std::fs::remove_dir_all(dir))
}

/// [`sweep_expired`] with a custom directory removal.
pub fn sweep_expired_with(
    dirs: &TaskDirs,
    ttl: Duration,
    now: SystemTime,
    mut remove: impl FnMut(&Path) -> std::io::Result<()>,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for dir in dirs.list_dirs()? {
        report.scanned += 1;

        match is_expired(&dir, ttl, now) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to stat directory");
                report.failed += 1;
                continue;
            }
        }

        match remove(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "Removed expired directory");
                report.removed.push(dir);
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to remove expired directory");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn aged_dir(root: &Path, name: &str, age: Duration) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("clip.mp4"), b"x").unwrap();
        std::fs::File::open(&dir)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        dir
    }

    #[test]
    fn test_sweep_by_age() {
        let tmp = TempDir::new().unwrap();
        let old = aged_dir(tmp.path(), "old", Duration::from_secs(2 * 3600));
        let fresh = aged_dir(tmp.path(), "fresh", Duration::from_secs(10 * 60));
        std::fs::write(tmp.path().join("stray.txt"), b"x").unwrap();

        let dirs = TaskDirs::new(tmp.path());
        let report = sweep_expired(&dirs, Duration::from_secs(3600), SystemTime::now()).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.removed_count(), 1);
        assert_eq!(report.failed, 0);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(tmp.path().join("stray.txt").exists());
    }

    #[test]
    fn test_failed_removal_does_not_stop_sweep() {
        let tmp = TempDir::new().unwrap();
        let age = Duration::from_secs(2 * 3600);
        let a = aged_dir(tmp.path(), "a", age);
        let b = aged_dir(tmp.path(), "b", age);
        let c = aged_dir(tmp.path(), "c", age);

        let dirs = TaskDirs::new(tmp.path());
        let report = sweep_expired_with(&dirs, Duration::from_secs(3600), SystemTime::now(), |dir| {
            if dir.ends_with("a") {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy"))
            } else {
                std::fs::remove_dir_all(dir)
            }
        })
        .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, vec![b.clone(), c.clone()]);
        assert_eq!(report.removed_count(), 2);
        assert!(a.exists());
        assert!(!b.exists());
        assert!(!c.exists());
    }

    #[test]
    fn test_future_mtime_not_expired() {
        let tmp = TempDir::new().unwrap();
        let dir = aged_dir(tmp.path(), "d", Duration::ZERO);
        let past = SystemTime::now() - Duration::from_secs(7200);

        let report = sweep_expired(&TaskDirs::new(tmp.path()), Duration::from_secs(60), past).unwrap();
        assert_eq!(report.removed_count(), 0);
        assert!(dir.exists());
    }

    #[test]
    fn test_missing_root_is_empty_sweep() {
        let tmp = TempDir::new().unwrap();
        let dirs = TaskDirs::new(tmp.path().join("missing"));
        let report = sweep_expired(&dirs, Duration::from_secs(1), SystemTime::now()).unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
