use std::path::PathBuf;
use std::sync::Arc;

use restore_core::TargetInfo;
use tracing::{debug, info, warn};

use crate::Result;
use crate::error::OperationError;
use crate::traits::{CommandRunner, TargetService};

const TARGETCLI: &str = "targetcli";
const SYSTEMCTL: &str = "systemctl";
const TARGET_UNIT: &str = "target";
const CHAP_USER: &str = "restore";

/// Publishes iSCSI targets through the LIO `targetcli` shell.
pub struct TargetcliService {
    runner: Arc<dyn CommandRunner>,
}

impl TargetcliService {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn targetcli(&self, args: &[&str]) -> Result<String> {
        self.runner.run(TARGETCLI, args)
    }

    fn target_exists(&self, name: &str) -> Result<bool> {
        let listing = self.targetcli(&["/iscsi", "ls"])?;
        Ok(parse_target_names(&listing).iter().any(|n| n == name))
    }

    fn delete_backstores(&self, name: &str) -> Result<()> {
        let prefix = backstore_prefix(name);
        let listing = self.targetcli(&["/backstores/block", "ls"])?;
        for backstore in parse_backstore_names(&listing)
            .into_iter()
            .filter(|b| b.starts_with(&prefix))
        {
            self.targetcli(&["/backstores/block", "delete", &backstore])?;
            debug!(%backstore, "deleted backstore");
        }
        Ok(())
    }
}

impl TargetService for TargetcliService {
    fn create_target(&self, name: &str, luns: &[PathBuf], password: &str) -> Result<()> {
        let tpg = format!("/iscsi/{name}/tpg1");
        let prefix = backstore_prefix(name);

        self.targetcli(&["/iscsi", "create", name])?;
        for (index, lun) in luns.iter().enumerate() {
            let backstore = format!("{prefix}{index}");
            let name_arg = format!("name={backstore}");
            let dev_arg = format!("dev={}", lun.display());
            self.targetcli(&["/backstores/block", "create", &name_arg, &dev_arg])?;
            self.targetcli(&[
                &format!("{tpg}/luns"),
                "create",
                &format!("/backstores/block/{backstore}"),
            ])?;
        }
        self.targetcli(&[
            &tpg,
            "set",
            "attribute",
            "authentication=1",
            "generate_node_acls=1",
        ])?;
        self.targetcli(&[
            &tpg,
            "set",
            "auth",
            &format!("userid={CHAP_USER}"),
            &format!("password={password}"),
        ])?;

        info!(target_name = name, luns = luns.len(), "published target");
        Ok(())
    }

    fn delete_target(&self, name: &str) -> Result<()> {
        if !self.target_exists(name)? {
            return Err(OperationError::TargetNotFound(name.to_string()));
        }
        self.targetcli(&["/iscsi", "delete", name])?;
        self.delete_backstores(name)?;
        info!(target_name = name, "deleted target");
        Ok(())
    }

    fn get_target(&self, name: &str) -> Result<TargetInfo> {
        if !self.target_exists(name)? {
            return Err(OperationError::TargetNotFound(name.to_string()));
        }
        let tpg = format!("/iscsi/{name}/tpg1");
        let auth = self.targetcli(&[&tpg, "get", "auth", "password"])?;
        let password = parse_password(&auth).ok_or_else(|| OperationError::CommandOutput {
            command: format!("{TARGETCLI} {tpg} get auth password"),
            reason: "no password reported".to_string(),
        })?;
        let luns = parse_lun_devices(&self.targetcli(&[&format!("{tpg}/luns"), "ls"])?);

        Ok(TargetInfo {
            name: name.to_string(),
            password,
            luns,
        })
    }

    fn start_if_dead(&self) -> Result<()> {
        let status = self.runner.execute(SYSTEMCTL, &["is-active", TARGET_UNIT])?;
        if status.stdout.trim() == "active" {
            return Ok(());
        }
        warn!(state = status.stdout.trim(), "target service not running, starting it");
        self.runner.run(SYSTEMCTL, &["start", TARGET_UNIT])?;
        Ok(())
    }
}

/// Backstore names share a prefix derived from the target's unique part.
fn backstore_prefix(target: &str) -> String {
    let unique = target.rsplit(':').next().unwrap_or(target);
    format!("{unique}_")
}

fn listing_entries(listing: &str) -> impl Iterator<Item = &str> {
    listing.lines().filter_map(|line| {
        let (_, rest) = line.split_once("o- ")?;
        rest.split_whitespace().next()
    })
}

fn parse_target_names(listing: &str) -> Vec<String> {
    listing_entries(listing)
        .filter(|entry| entry.starts_with("iqn."))
        .map(str::to_string)
        .collect()
}

fn parse_backstore_names(listing: &str) -> Vec<String> {
    listing_entries(listing)
        .filter(|entry| *entry != "block")
        .map(str::to_string)
        .collect()
}

/// Extracts the device of every `lunN` line, e.g.
/// `o- lun0 ..... [block/x_0 (/dev/loop3) (default_tg_pt_gp)]`.
fn parse_lun_devices(listing: &str) -> Vec<PathBuf> {
    listing
        .lines()
        .filter(|line| {
            line.split_once("o- ")
                .is_some_and(|(_, rest)| rest.starts_with("lun"))
        })
        .filter_map(|line| {
            let start = line.find("(/")? + 1;
            let end = start + line[start..].find(')')?;
            Some(PathBuf::from(&line[start..end]))
        })
        .collect()
}

fn parse_password(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("password=")
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    })
}
