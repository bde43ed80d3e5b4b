//! Flat-file store
//!
//! One file per key under a data directory. File names are the escaped key
//! with `/` written as `\-`, a pair `escape` never produces.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, RingKvError};
use crate::protocol::{escape, unescape};

use super::PersistentStore;

/// File-per-key store
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key == "." || key == ".." {
            return Err(RingKvError::Storage(format!("Key not storable: {:?}", key)));
        }
        Ok(self.dir.join(file_name(key)))
    }
}

fn file_name(key: &str) -> String {
    escape(key).replace('/', "\\-")
}

fn key_from_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            escaped.push(c);
            continue;
        }
        match chars.next() {
            Some('-') => escaped.push('/'),
            Some(other) => {
                escaped.push('\\');
                escaped.push(other);
            }
            None => escaped.push('\\'),
        }
    }
    unescape(&escaped)
}

impl PersistentStore for FileStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key)?, value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(key_from_file_name(name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}
