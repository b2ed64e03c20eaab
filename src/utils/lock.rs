use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use fs2::FileExt;

/// Exclusive advisory lock held by a CLI command that changes LVM state.
/// Released on drop.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl LockGuard {
    /// Takes `<dir>/<name>.lock` without waiting. `dir` defaults to the temp
    /// dir and is created when missing.
    pub fn try_acquire(name: &str, dir: Option<&Path>) -> Result<Self> {
        let dir = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        fs::create_dir_all(&dir).with_context(|| format!("create lock dir {}", dir.display()))?;

        let path = dir.join(file_name(name));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lockfile {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("lock held: {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                bail!("another lvmkit run holds lock: {}", path.display())
            }
            Err(e) => Err(e).with_context(|| format!("flock {}", path.display())),
        }
    }
}

/// Keeps `[A-Za-z0-9_-]`; an empty result falls back to `lvmkit`.
fn file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        "lvmkit.lock".to_string()
    } else {
        format!("{safe}.lock")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn acquire_release_and_conflict() {
        let tmp = TempDir::new().unwrap();
        let g = LockGuard::try_acquire("lvmkit", Some(tmp.path())).expect("first acquire");
        assert!(tmp.path().join("lvmkit.lock").exists());

        let err = LockGuard::try_acquire("lvmkit", Some(tmp.path()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("another lvmkit run holds lock"), "err was: {err}");

        let _other = LockGuard::try_acquire("other", Some(tmp.path())).expect("different name");
        drop(g);
        let _again = LockGuard::try_acquire("lvmkit", Some(tmp.path())).expect("re-acquire");
    }

    #[test]
    fn missing_lock_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/locks");
        let _g = LockGuard::try_acquire("lvmkit", Some(&dir)).expect("acquire in new dir");
        assert!(dir.join("lvmkit.lock").is_file());
    }

    #[test]
    fn file_name_drops_path_characters() {
        assert_eq!(file_name("ok_Name-123"), "ok_Name-123.lock");
        assert_eq!(file_name("../etc/x"), "etcx.lock");
        assert_eq!(file_name(".."), "lvmkit.lock");
    }
}
