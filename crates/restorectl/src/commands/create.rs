use std::fs;
use std::path::Path;
use std::process::ExitCode;

use restore_core::AssetKey;
use restore_operations::operations::{
    DifferentialRollbackService, ProvisionedRestore, RestoreRequest,
};

use crate::error::{CliError, Result};
use crate::signal;

pub(crate) fn run(
    service: &DifferentialRollbackService,
    asset: AssetKey,
    snapshot: u64,
    passphrase_file: Option<&Path>,
) -> Result<ExitCode> {
    let mut request = RestoreRequest::new(asset, snapshot);
    if let Some(path) = passphrase_file {
        request = request.with_passphrase(read_passphrase(path)?);
    }

    let provisioned = service.create_with_cancel(request, signal::shutdown_requested)?;
    print_provisioned(&provisioned);
    Ok(ExitCode::SUCCESS)
}

fn read_passphrase(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|source| CliError::PassphraseFile {
        path: path.to_path_buf(),
        source,
    })?;
    let passphrase = content.trim_end_matches(['\n', '\r']);
    if passphrase.is_empty() {
        return Err(CliError::EmptyPassphrase(path.to_path_buf()));
    }
    Ok(passphrase.to_string())
}

fn print_provisioned(provisioned: &ProvisionedRestore) {
    println!("Provisioned {}", provisioned.record.key());
    println!("  mountpoint: {}", provisioned.mountpoint.display());
    println!("  target:     {}", provisioned.target.name);
    println!("  password:   {}", provisioned.target.password);
    for (volume, info) in &provisioned.loops {
        println!("  volume {volume}: {}", info.block_device.display());
    }
}
