mod create;
mod exists;
mod list;
mod remove;
mod show;
mod sweep;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Subcommand};
use restore_core::{AssetKey, RestoreType};
use restore_operations::operations::DifferentialRollbackService;

use crate::error::Result;

#[derive(Args)]
pub(crate) struct RestoreArgs {
    /// Asset key of the protected machine
    pub(crate) asset: AssetKey,

    /// Snapshot epoch
    pub(crate) snapshot: u64,

    /// Restore type suffix
    #[arg(long, default_value = RestoreType::DifferentialRollback.suffix())]
    pub(crate) suffix: String,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Provision a restore target for a snapshot
    Create {
        /// Asset key of the protected machine
        asset: AssetKey,

        /// Snapshot epoch
        snapshot: u64,

        /// File holding the passphrase of an encrypted asset
        #[arg(long)]
        passphrase_file: Option<PathBuf>,
    },
    /// Show the target of a restore, republishing it if it was lost
    Show(RestoreArgs),
    /// Exit successfully if the restore exists
    Exists(RestoreArgs),
    /// Tear down a restore
    Remove(RestoreArgs),
    /// List restores on record
    List,
    /// Remove clones left behind by interrupted provisioning
    Sweep,
}

impl Commands {
    pub(crate) fn execute(self, service: &DifferentialRollbackService) -> Result<ExitCode> {
        match self {
            Self::Create {
                asset,
                snapshot,
                passphrase_file,
            } => create::run(service, asset, snapshot, passphrase_file.as_deref()),
            Self::Show(args) => show::run(service, &args),
            Self::Exists(args) => exists::run(service, &args),
            Self::Remove(args) => remove::run(service, &args),
            Self::List => list::run(service),
            Self::Sweep => sweep::run(service),
        }
    }
}
