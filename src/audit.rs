use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// More descriptors are open than right after boot.
#[derive(Debug, Error)]
#[error(
    "descriptor leak detected: {} file descriptors still open (PID={}, open fds={:?})",
    .open.len() - .baseline,
    .pid,
    .open
)]
pub struct LeakError {
    pub pid: u32,
    pub baseline: usize,
    pub open: Vec<String>,
}

/// Periodic check that executed lines leave no descriptor behind.
#[derive(Debug)]
pub struct DescriptorAudit {
    dir: PathBuf,
    baseline: usize,
    interval: u32,
    counter: u32,
}

impl DescriptorAudit {
    /// Record the current descriptor count as the baseline. An `interval` of
    /// 0 disables the checks.
    pub fn new(interval: u32) -> io::Result<Self> {
        Self::with_dir("/proc/self/fd", interval)
    }

    fn with_dir(dir: impl Into<PathBuf>, interval: u32) -> io::Result<Self> {
        let dir = dir.into();
        let baseline = open_descriptors(&dir)?.len();
        Ok(Self {
            dir,
            baseline,
            interval,
            counter: 0,
        })
    }

    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// Count one executed line; every `interval` lines, compare the open
    /// descriptors with the baseline.
    ///
    /// An unreadable descriptor directory skips the check.
    pub fn tick(&mut self) -> Result<(), LeakError> {
        if self.interval == 0 {
            return Ok(());
        }
        self.counter += 1;
        if self.counter < self.interval {
            return Ok(());
        }
        self.counter = 0;
        self.check()
    }

    pub fn check(&self) -> Result<(), LeakError> {
        let Ok(open) = open_descriptors(&self.dir) else {
            return Ok(());
        };
        if open.len() > self.baseline {
            return Err(LeakError {
                pid: std::process::id(),
                baseline: self.baseline,
                open,
            });
        }
        Ok(())
    }
}

/// Entry names of the descriptor directory.
///
/// Listing `/proc/self/fd` itself opens one descriptor; it is open both at
/// boot and at every check, so it cancels out.
fn open_descriptors(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort_by_key(|name| name.parse::<u64>().unwrap_or(u64::MAX));
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn disabled_audit_never_checks() {
        let dir = TempDir::new().unwrap();
        let mut audit = DescriptorAudit::with_dir(dir.path(), 0).unwrap();
        fs::write(dir.path().join("3"), "").unwrap();
        for _ in 0..10 {
            assert!(audit.tick().is_ok());
        }
    }

    #[test]
    fn leak_is_found_on_the_interval() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0"), "").unwrap();
        let mut audit = DescriptorAudit::with_dir(dir.path(), 2).unwrap();
        assert_eq!(audit.baseline(), 1);

        fs::write(dir.path().join("7"), "").unwrap();
        assert!(audit.tick().is_ok());
        let err = audit.tick().unwrap_err();
        assert_eq!(err.open, ["0", "7"]);
        assert!(err.to_string().contains("1 file descriptors still open"));
    }

    #[test]
    fn closed_descriptors_pass() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0"), "").unwrap();
        fs::write(dir.path().join("1"), "").unwrap();
        let audit = DescriptorAudit::with_dir(dir.path(), 1).unwrap();
        fs::remove_file(dir.path().join("1")).unwrap();
        assert_matches!(audit.check(), Ok(()));
    }
}
