//! File-backed key-value storage.
//!
//! One file per key under a data directory. Writes go to a temporary file
//! first and are renamed into place, so a crash never leaves a half-written
//! collection behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tally_engine::{error::Result, Error, KvBackend};

/// [`KvBackend`] storing each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Percent-encoding is one-to-one and keeps each key a single path
        // segment, so distinct user ids never share a file.
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

fn backend_error(key: &str, err: std::io::Error) -> Error {
    Error::Backend(format!("{key}: {err}"))
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(backend_error(key, e)),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| backend_error(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| backend_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(backend_error(key, e)),
        }
    }
}
