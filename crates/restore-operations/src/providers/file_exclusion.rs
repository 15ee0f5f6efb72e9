use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use crate::Result;
use crate::error::OperationError;
use crate::traits::FileExclusion;

/// Directory inside the clone that hidden files are moved into.
pub const HIDDEN_DIR: &str = ".hidden";

/// Hides files by renaming them into [`HIDDEN_DIR`], which the loop
/// manager never looks into.
pub struct GlobFileExclusion;

impl GlobFileExclusion {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlobFileExclusion {
    fn default() -> Self {
        Self::new()
    }
}

impl FileExclusion for GlobFileExclusion {
    fn hide(&self, mountpoint: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|source| OperationError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let matches = matching_files(mountpoint, &patterns)?;
        if matches.is_empty() {
            return Ok(matches);
        }

        let hidden_dir = mountpoint.join(HIDDEN_DIR);
        fs::create_dir_all(&hidden_dir).map_err(|source| OperationError::FileWrite {
            path: hidden_dir.clone(),
            source,
        })?;

        let mut hidden = Vec::with_capacity(matches.len());
        for path in matches {
            if let Err(error) = move_into(&path, &hidden_dir) {
                if let Err(undo) = self.reveal(mountpoint, &hidden) {
                    warn!("failed to restore hidden files: {undo}");
                }
                return Err(error);
            }
            hidden.push(path);
        }
        debug!(count = hidden.len(), mountpoint = %mountpoint.display(), "hid files");
        Ok(hidden)
    }

    fn reveal(&self, mountpoint: &Path, hidden: &[PathBuf]) -> Result<()> {
        let hidden_dir = mountpoint.join(HIDDEN_DIR);
        let mut first_error = None;

        for original in hidden {
            let Some(name) = original.file_name() else {
                continue;
            };
            let from = hidden_dir.join(name);
            if let Err(source) = fs::rename(&from, original) {
                warn!(path = %from.display(), "failed to reveal file: {source}");
                first_error.get_or_insert(OperationError::FileMove { path: from, source });
            }
        }

        if first_error.is_none() {
            let _ = fs::remove_dir(&hidden_dir);
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn matching_files(mountpoint: &Path, patterns: &[Pattern]) -> Result<Vec<PathBuf>> {
    let read_error = |source| OperationError::FileRead {
        path: mountpoint.to_path_buf(),
        source,
    };

    let mut matches = Vec::new();
    for entry in fs::read_dir(mountpoint).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let is_file = entry.file_type().map_err(read_error)?.is_file();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_file && patterns.iter().any(|p| p.matches(&name)) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

fn move_into(path: &Path, dir: &Path) -> Result<()> {
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    fs::rename(path, dir.join(name)).map_err(|source| OperationError::FileMove {
        path: path.to_path_buf(),
        source,
    })
}
