//! Crash-safe TOML documents.
//!
//! A save never truncates the live file: the new content is written to a
//! sibling, flushed to disk and renamed over the target. Readers therefore see
//! either the previous document or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtomicTomlError {
    #[error("document I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("document is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("document could not be encoded: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not lock {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
}

/// Typed handle to one TOML document on disk.
///
/// `update` serialises concurrent writers (including other processes) through
/// a `.lock` file next to the document. The lock file is never removed, so
/// every writer locks the same inode.
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    doc: PhantomData<fn() -> T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document; missing or blank files read as `T::default()`.
    pub fn load(&self) -> Result<T, AtomicTomlError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, doc: &T) -> Result<(), AtomicTomlError> {
        ensure_parent(&self.path)?;
        let encoded = toml::to_string_pretty(doc)?;

        let staging = self.staging_path()?;
        write_synced(&staging, encoded.as_bytes())?;
        restrict_permissions(&staging)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    /// Read-modify-write under the lock file.
    ///
    /// `mutate` returns whether it changed anything; an unchanged document is
    /// not rewritten.
    pub fn update<F>(&self, mutate: F) -> Result<(), AtomicTomlError>
    where
        F: FnOnce(&mut T) -> bool,
    {
        let _guard = LockGuard::acquire(&self.path)?;
        let mut doc = self.load()?;
        if mutate(&mut doc) {
            self.save(&doc)?;
        }
        Ok(())
    }

    fn staging_path(&self) -> Result<PathBuf, AtomicTomlError> {
        let name = self.path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", self.path.display()),
            )
        })?;
        Ok(self
            .path
            .with_file_name(format!(".{}.tmp", name.to_string_lossy())))
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// Tokens live in these files: owner read/write only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Holds an exclusive advisory lock until dropped.
struct LockGuard {
    _handle: File,
}

impl LockGuard {
    fn acquire(document: &Path) -> Result<Self, AtomicTomlError> {
        let lock_path = document.with_extension("lock");
        ensure_parent(&lock_path)?;

        let handle = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        fs2::FileExt::lock_exclusive(&handle).map_err(|source| AtomicTomlError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        Ok(Self { _handle: handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(default)]
        entries: BTreeMap<String, String>,
    }

    #[test]
    fn test_missing_file_loads_default() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Doc>::new(temp_dir.path().join("missing.toml"));
        assert_eq!(file.load().unwrap(), Doc::default());
    }

    #[test]
    fn test_update_persists_and_skips_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("session.toml");
        let file = AtomicTomlFile::<Doc>::new(path.clone());

        file.update(|doc| {
            doc.entries.insert("token".into(), "A".into());
            true
        })
        .unwrap();
        assert_eq!(file.load().unwrap().entries.get("token").unwrap(), "A");

        file.update(|_| false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_lock_file_is_kept_between_updates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        let lock_path = temp_dir.path().join("session.lock");
        let file = AtomicTomlFile::<Doc>::new(path);

        file.update(|doc| {
            doc.entries.insert("token".into(), "A".into());
            true
        })
        .unwrap();
        assert!(lock_path.exists());

        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            fs::metadata(&lock_path).unwrap().ino()
        };

        // Released on drop: a second writer gets in without blocking.
        file.update(|doc| {
            doc.entries.insert("role".into(), "student".into());
            true
        })
        .unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            assert_eq!(fs::metadata(&lock_path).unwrap().ino(), inode);
        }
        assert_eq!(file.load().unwrap().entries.len(), 2);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        let file = AtomicTomlFile::<Doc>::new(path.clone());

        file.save(&Doc::default()).unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join(".session.toml.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        fs::write(&path, "entries = [[[").unwrap();

        let file = AtomicTomlFile::<Doc>::new(path);
        assert!(matches!(file.load(), Err(AtomicTomlError::Parse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");
        AtomicTomlFile::<Doc>::new(path.clone())
            .save(&Doc::default())
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
