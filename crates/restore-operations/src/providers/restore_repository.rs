use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use restore_core::{RestoreKey, RestoreRecord};
use tracing::debug;

use crate::Result;
use crate::error::OperationError;
use crate::traits::RestoreRepository;

const RECORD_EXTENSION: &str = "toml";

/// Stores each restore record as a TOML file named after its key.
pub struct FileSystemRestoreRepository {
    dir: PathBuf,
}

impl FileSystemRestoreRepository {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, key: &RestoreKey) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", key.file_stem()))
    }
}

impl RestoreRepository for FileSystemRestoreRepository {
    fn find(&self, key: &RestoreKey) -> Result<Option<RestoreRecord>> {
        load_record(&self.record_path(key))
    }

    fn save(&self, record: &RestoreRecord) -> Result<()> {
        let key = record.key();
        let path = self.record_path(&key);
        let write_error = |source| OperationError::FileWrite {
            path: path.clone(),
            source,
        };

        let content =
            toml::to_string_pretty(record).map_err(|source| OperationError::TomlSerialize {
                path: path.clone(),
                source,
            })?;

        fs::create_dir_all(&self.dir).map_err(write_error)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        tmp.write_all(content.as_bytes()).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(path = %path.display(), "saved restore record");
                Ok(())
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(OperationError::RestoreAlreadyExists(key))
            }
            Err(e) => Err(write_error(e.error)),
        }
    }

    fn delete(&self, key: &RestoreKey) -> Result<()> {
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted restore record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(OperationError::FileWrite { path, source }),
        }
    }

    fn list(&self) -> Result<Vec<RestoreRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(OperationError::FileRead {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| OperationError::FileRead {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_none_or(|ext| ext != RECORD_EXTENSION) {
                continue;
            }
            if let Some(record) = load_record(&path)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(records)
    }
}

fn load_record(path: &Path) -> Result<Option<RestoreRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(OperationError::FileRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let record = toml::from_str(&content).map_err(|source| OperationError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(record))
}
