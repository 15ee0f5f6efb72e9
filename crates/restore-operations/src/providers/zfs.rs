use std::path::PathBuf;
use std::sync::Arc;

use restore_core::CloneSpec;
use tracing::{debug, info};

use crate::Result;
use crate::error::OperationError;
use crate::traits::{CloneManager, CommandRunner};

const ZFS: &str = "zfs";

/// Clones snapshots with the `zfs` command line tool.
pub struct ZfsCloneManager {
    runner: Arc<dyn CommandRunner>,
    pool: String,
    mount_root: PathBuf,
}

impl ZfsCloneManager {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        pool: impl Into<String>,
        mount_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            pool: pool.into(),
            mount_root: mount_root.into(),
        }
    }
}

impl CloneManager for ZfsCloneManager {
    fn create(&self, spec: &CloneSpec) -> Result<()> {
        let mountpoint = format!("mountpoint={}", spec.mountpoint(&self.mount_root).display());
        let source = spec.source_snapshot();
        let dataset = spec.dataset();

        self.runner
            .run(ZFS, &["clone", "-o", &mountpoint, &source, &dataset])?;
        info!(%source, %dataset, "created clone");
        Ok(())
    }

    fn destroy(&self, spec: &CloneSpec) -> Result<()> {
        let dataset = spec.dataset();
        self.runner.run(ZFS, &["destroy", "-R", &dataset])?;
        info!(%dataset, "destroyed clone");
        Ok(())
    }

    fn exists(&self, spec: &CloneSpec) -> Result<bool> {
        let dataset = spec.dataset();
        let args = ["list", "-H", "-o", "name", dataset.as_str()];
        let output = self.runner.execute(ZFS, &args)?;

        if output.is_success() {
            return Ok(true);
        }
        if output.stderr.contains("does not exist") {
            return Ok(false);
        }
        Err(OperationError::CommandFailed {
            command: format!("{ZFS} {}", args.join(" ")),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    fn list_all(&self) -> Result<Vec<CloneSpec>> {
        let stdout = self.runner.run(
            ZFS,
            &[
                "list",
                "-H",
                "-o",
                "name,origin",
                "-t",
                "filesystem",
                "-r",
                "-d",
                "1",
                &self.pool,
            ],
        )?;
        Ok(parse_clone_listing(&self.pool, &stdout))
    }
}

/// Clones are the datasets with an origin snapshot; anything that does not
/// follow the clone naming scheme is skipped.
fn parse_clone_listing(pool: &str, listing: &str) -> Vec<CloneSpec> {
    listing
        .lines()
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let name = columns.next()?.trim();
            let origin = columns.next()?.trim();
            if origin == "-" || origin.is_empty() {
                return None;
            }
            match CloneSpec::parse_dataset(pool, name) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    debug!(dataset = name, "skipping foreign clone: {e}");
                    None
                }
            }
        })
        .collect()
}
