use std::fs;
use std::path::Path;

use crate::{Error, Result};

#[cfg(unix)]
const DEFAULT_PERMISSIONS: u32 = 0o644;

/// How [`atomic_write`] places content at its destination.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicWriteOptions {
    sync: bool,
}

impl AtomicWriteOptions {
    pub fn new() -> Self { Self::default() }

    /// Flush the temporary file to disk before renaming it into place.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

#[cfg(unix)]
fn apply_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(DEFAULT_PERMISSIONS))
}

#[cfg(not(unix))]
fn apply_permissions(_path: &Path) -> std::io::Result<()> { Ok(()) }

/// Write `content` next to `path` under a temporary name, then rename over `path`.
///
/// Readers of `path` observe either the previous content or all of `content`.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8], options: AtomicWriteOptions) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| Error::NoParent {
        path: path.to_path_buf(),
    })?;
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = parent.join(format!(".{file_name}.part"));

    let write = |tmp: &Path| -> std::io::Result<()> {
        fs::write(tmp, content)?;
        apply_permissions(tmp)?;
        if options.sync {
            fs::File::open(tmp)?.sync_all()?;
        }
        Ok(())
    };
    write(&tmp_path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path: tmp_path.clone(),
            source,
        }
    })?;

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");

        atomic_write(&path, b"jpeg bytes", AtomicWriteOptions::new()).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"jpeg bytes");
        assert!(!dir.path().join(".photo.jpg.part").exists());
    }

    #[test]
    fn test_atomic_write_synced_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        fs::write(&path, b"old").unwrap();

        atomic_write(&path, b"%PDF", AtomicWriteOptions::new().sync(true)).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"%PDF");
    }

    #[test]
    fn test_atomic_write_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("file.bin");

        let result = atomic_write(&path, b"data", AtomicWriteOptions::new());
        assert!(matches!(result, Err(Error::Write { .. })));
    }
}
