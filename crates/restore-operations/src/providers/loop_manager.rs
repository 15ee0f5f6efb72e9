use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use restore_core::{AssetKey, LoopInfo, LoopMap};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::error::OperationError;
use crate::providers::KeyStashEncryptionService;
use crate::traits::{CommandRunner, LoopManager};

const LOSETUP: &str = "losetup";
const CRYPTSETUP: &str = "cryptsetup";
const PLAIN_IMAGE_EXTENSION: &str = "datto";
const ENCRYPTED_IMAGE_EXTENSION: &str = "detto";
const MAPPER_PREFIX: &str = "restore-";

#[derive(Debug, Deserialize)]
struct LoopListing {
    #[serde(default)]
    loopdevices: Vec<LoopEntry>,
}

#[derive(Debug, Deserialize)]
struct LoopEntry {
    name: String,
    #[serde(rename = "back-file")]
    back_file: Option<String>,
}

/// Attaches clone images with `losetup`, stacking a `cryptsetup` plain
/// mapping on encrypted images.
pub struct LosetupLoopManager {
    runner: Arc<dyn CommandRunner>,
    key_stash_dir: PathBuf,
}

impl LosetupLoopManager {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, key_stash_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            key_stash_dir: key_stash_dir.into(),
        }
    }

    fn attach_image(&self, image: &Path, key_file: Option<&Path>) -> Result<LoopInfo> {
        let image_arg = image.to_string_lossy();
        let stdout = self
            .runner
            .run(LOSETUP, &["-f", "--show", "-P", &image_arg])?;
        let loop_device = stdout.trim();
        if loop_device.is_empty() {
            return Err(OperationError::CommandOutput {
                command: format!("{LOSETUP} -f --show -P {image_arg}"),
                reason: "no loop device reported".to_string(),
            });
        }
        let loop_device = PathBuf::from(loop_device);

        let block_device = match key_file {
            Some(key_file) => {
                let mapping = mapping_name(&loop_device);
                let key_arg = key_file.to_string_lossy();
                let loop_arg = loop_device.to_string_lossy();
                self.runner.run(
                    CRYPTSETUP,
                    &[
                        "open",
                        "--type",
                        "plain",
                        "--cipher",
                        "aes-xts-plain64",
                        "--key-size",
                        "512",
                        "--key-file",
                        &key_arg,
                        &loop_arg,
                        &mapping,
                    ],
                )?;
                PathBuf::from("/dev/mapper").join(mapping)
            }
            None => loop_device.clone(),
        };

        Ok(LoopInfo {
            volume_id: volume_id(image),
            loop_device,
            backing_file: image.to_path_buf(),
            block_device,
        })
    }
}

impl LoopManager for LosetupLoopManager {
    fn attach(&self, asset: &AssetKey, mountpoint: &Path, encrypted: bool) -> Result<LoopMap> {
        let extension = if encrypted {
            ENCRYPTED_IMAGE_EXTENSION
        } else {
            PLAIN_IMAGE_EXTENSION
        };
        let images = find_images(mountpoint, extension)?;
        if images.is_empty() {
            return Err(OperationError::NoBackingImages(mountpoint.to_path_buf()));
        }

        let key_file = if encrypted {
            let path = KeyStashEncryptionService::stash_path(&self.key_stash_dir, asset);
            if !path.is_file() {
                return Err(OperationError::AssetSealed(asset.clone()));
            }
            Some(path)
        } else {
            None
        };

        let mut loops = LoopMap::new();
        for image in images {
            let info = self.attach_image(&image, key_file.as_deref())?;
            info!(
                volume = %info.volume_id,
                device = %info.block_device.display(),
                "attached image"
            );
            loops.insert(info.volume_id.clone(), info);
        }
        Ok(loops)
    }

    fn detach(&self, mountpoint: &Path) -> Result<()> {
        let mut failures = Vec::new();
        for info in self.scan(mountpoint)?.into_values() {
            if let Err(error) = self.detach_device(&info) {
                warn!(device = %info.loop_device.display(), "failed to detach: {error}");
                failures.push(error);
            }
        }

        let count = failures.len();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(OperationError::DetachFailed {
                mountpoint: mountpoint.to_path_buf(),
                count,
                first: Box::new(first),
            }),
        }
    }

    fn find_attached(&self, mountpoint: &Path) -> Result<LoopMap> {
        let loops = self.scan(mountpoint)?;
        for info in loops.values() {
            if info.block_device != info.loop_device && !self.mapping_active(&info.loop_device)? {
                return Err(OperationError::UnmappedLoopDevice(info.loop_device.clone()));
            }
        }
        Ok(loops)
    }
}

impl LosetupLoopManager {
    fn scan(&self, mountpoint: &Path) -> Result<LoopMap> {
        let stdout = self.runner.run(LOSETUP, &["-J", "-l"])?;
        parse_loop_listing(&stdout, mountpoint)
    }

    /// `cryptsetup status` exits non-zero for an inactive mapping.
    fn mapping_active(&self, loop_device: &Path) -> Result<bool> {
        let mapping = mapping_name(loop_device);
        Ok(self
            .runner
            .execute(CRYPTSETUP, &["status", &mapping])?
            .is_success())
    }

    fn detach_device(&self, info: &LoopInfo) -> Result<()> {
        if info.block_device != info.loop_device {
            if self.mapping_active(&info.loop_device)? {
                let mapping = mapping_name(&info.loop_device);
                self.runner.run(CRYPTSETUP, &["close", &mapping])?;
            } else {
                debug!(device = %info.loop_device.display(), "no mapping to close");
            }
        }
        let device = info.loop_device.to_string_lossy();
        self.runner.run(LOSETUP, &["-d", &device])?;
        debug!(%device, "detached loop device");
        Ok(())
    }
}

fn find_images(mountpoint: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(mountpoint).map_err(|source| OperationError::FileRead {
        path: mountpoint.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| OperationError::FileRead {
                path: mountpoint.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn volume_id(image: &Path) -> String {
    image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mapping_name(loop_device: &Path) -> String {
    let device = loop_device
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{MAPPER_PREFIX}{device}")
}

/// Parses `losetup -J -l` output, keeping devices backed by files under
/// `mountpoint`. Encrypted images are given their mapper path whether or not
/// the mapping is open.
fn parse_loop_listing(json: &str, mountpoint: &Path) -> Result<LoopMap> {
    if json.trim().is_empty() {
        return Ok(LoopMap::new());
    }
    let listing: LoopListing = serde_json::from_str(json).map_err(OperationError::LoopListParse)?;

    let mut loops = LoopMap::new();
    for entry in listing.loopdevices {
        let Some(back_file) = entry.back_file else {
            continue;
        };
        let backing_file = PathBuf::from(back_file.trim_end_matches(" (deleted)"));
        if !backing_file.starts_with(mountpoint) {
            continue;
        }

        let loop_device = PathBuf::from(entry.name);
        let encrypted = backing_file
            .extension()
            .is_some_and(|ext| ext == ENCRYPTED_IMAGE_EXTENSION);
        let block_device = if encrypted {
            PathBuf::from("/dev/mapper").join(mapping_name(&loop_device))
        } else {
            loop_device.clone()
        };
        let volume_id = volume_id(&backing_file);

        loops.insert(
            volume_id.clone(),
            LoopInfo {
                volume_id,
                loop_device,
                backing_file,
                block_device,
            },
        );
    }
    Ok(loops)
}
