use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A destination file being filled by offset-addressed writes.
///
/// Chunks may arrive in any order; the file length is the end of the
/// furthest chunk written so far. Dropping a `PartialFile` keeps whatever
/// was written, so an interrupted download can be resumed from disk.
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    file: File,
    len:  u64,
}

impl PartialFile {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file, len: 0 })
    }

    /// Open the file at `path` keeping its current content.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        let len = file
            .metadata()
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn len(&self) -> u64 { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let io = |file: &mut File| -> std::io::Result<()> {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)
        };
        io(&mut self.file).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })?;
        self.len = self.len.max(offset + bytes.len() as u64);
        Ok(())
    }

    /// Cut the file down to `len` bytes, dropping anything written past it.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })?;
        self.len = len;
        Ok(())
    }

    /// Flush the content to disk and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        let io = |file: &mut File| -> std::io::Result<()> {
            file.flush()?;
            file.sync_all()
        };
        io(&mut self.file).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.path)
    }

    /// Close and remove the file.
    pub fn discard(self) -> Result<()> {
        let Self { path, file, .. } = self;
        drop(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Remove { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_out_of_order_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("video.mp4");

        let mut file = PartialFile::create(&path).unwrap();
        file.write_at(4, b"efgh").unwrap();
        assert_eq!(file.len(), 8);
        file.write_at(0, b"abcd").unwrap();
        assert_eq!(file.len(), 8);
        file.finish().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abcdefgh");
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.ogg");

        let mut file = PartialFile::create(&path).unwrap();
        file.write_at(0, b"OggS").unwrap();
        file.discard().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_open_existing_keeps_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sticker.webp");
        fs::write(&path, b"RIFF").unwrap();

        let file = PartialFile::open_existing(&path).unwrap();
        assert_eq!(file.len(), 4);
        assert!(!file.is_empty());
    }

    #[test]
    fn test_set_len_drops_stale_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voice.ogg");
        fs::write(&path, b"0123456789").unwrap();

        let mut file = PartialFile::open_existing(&path).unwrap();
        file.set_len(4).unwrap();
        assert_eq!(file.len(), 4);
        file.write_at(4, b"ab").unwrap();
        file.finish().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"0123ab");
    }
}
