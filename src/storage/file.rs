//! Directory-backed snapshot storage.

use super::SnapshotStorage;
use crate::error::{FluxError, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: &[u8; 4] = b"FSN\0";

/// Current snapshot file format version.
const SNAPSHOT_VERSION: u8 = 1;

/// Magic, version, length and checksum bytes around the content.
const FRAME_OVERHEAD: u64 = 4 + 1 + 8 + 4;

/// One file per key under a base directory.
///
/// File layout: magic, version, u64 LE length, UTF-8 bytes, CRC32 LE of the
/// bytes. Writes go to a temp file that is renamed over the target, so a
/// reader sees either the old record or the new one.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `path`, creating the directory if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Base directory of the snapshot files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(FluxError::InvalidOperation(format!(
                "Invalid storage key: {:?}",
                key
            )));
        }
        Ok(self.path.join(format!("{}.snap", key)))
    }
}

impl SnapshotStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entry_path = self.entry_path(key)?;
        if !entry_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&entry_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(FluxError::InvalidFormat("Invalid snapshot magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(FluxError::InvalidFormat(format!(
                "Unsupported snapshot version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        let available = file.metadata()?.len().saturating_sub(FRAME_OVERHEAD);
        if len != available {
            return Err(FluxError::InvalidFormat(format!(
                "Snapshot length {} does not match {} content bytes on disk",
                len, available
            )));
        }

        let mut content = vec![0u8; len as usize];
        file.read_exact(&mut content)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&content);
        if stored != computed {
            return Err(FluxError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        String::from_utf8(content)
            .map(Some)
            .map_err(|e| FluxError::InvalidFormat(e.to_string()))
    }

    fn save(&self, key: &str, value: String) -> Result<()> {
        let entry_path = self.entry_path(key)?;
        let tmp_path = entry_path.with_extension("snap.tmp");

        {
            let mut file = File::create(&tmp_path)?;
            let content = value.as_bytes();

            file.write_all(SNAPSHOT_MAGIC)?;
            file.write_all(&[SNAPSHOT_VERSION])?;
            file.write_all(&(content.len() as u64).to_le_bytes())?;
            file.write_all(content)?;
            file.write_all(&crc32fast::hash(content).to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &entry_path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let entry_path = self.entry_path(key)?;
        if entry_path.exists() {
            fs::remove_file(&entry_path)?;
        }
        Ok(())
    }
}
