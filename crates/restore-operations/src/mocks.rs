use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use restore_core::{
    AssetKey, CloneSpec, LoopInfo, LoopMap, RestoreKey, RestoreRecord, TargetInfo,
};

use crate::Result;
use crate::error::OperationError;
use crate::traits::{
    CloneManager, CommandOutput, CommandRunner, EncryptionService, FileExclusion, LoopManager,
    PasswordGenerator, RestoreRepository, TargetService, command_line,
};

/// Call log shared between mocks so tests can assert on cross-collaborator
/// ordering.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("lock poisoned").push(entry.into());
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("lock poisoned").clone()
    }

    /// Entries starting with `prefix`, in call order.
    #[must_use]
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

fn injected(what: &str) -> OperationError {
    OperationError::CommandFailed {
        command: what.to_string(),
        code: Some(1),
        stderr: "injected failure".to_string(),
    }
}

pub struct MockCommandRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues `output` for `command`. The last queued output for a command
    /// is repeated once the queue runs dry; unknown commands succeed with
    /// empty output.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_response(self, command: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .expect("lock poisoned")
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    #[must_use]
    pub fn with_stdout(self, command: &str, stdout: &str) -> Self {
        self.with_response(command, CommandOutput::success(stdout))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockCommandRunner {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = command_line(program, args);
        self.calls.lock().expect("lock poisoned").push(line.clone());

        let mut responses = self.responses.lock().expect("lock poisoned");
        let output = match responses.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| CommandOutput::success("")))
    }
}

pub struct MockCloneManager {
    clones: Mutex<BTreeMap<String, CloneSpec>>,
    creates: Mutex<usize>,
    fail_create: bool,
    fail_destroy: bool,
    journal: Journal,
}

impl MockCloneManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clones: Mutex::new(BTreeMap::new()),
            creates: Mutex::new(0),
            fail_create: false,
            fail_destroy: false,
            journal: Journal::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_clone(self, spec: CloneSpec) -> Self {
        self.clones
            .lock()
            .expect("lock poisoned")
            .insert(spec.dataset(), spec);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    #[must_use]
    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn create_count(&self) -> usize {
        *self.creates.lock().expect("lock poisoned")
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contains(&self, spec: &CloneSpec) -> bool {
        self.clones
            .lock()
            .expect("lock poisoned")
            .contains_key(&spec.dataset())
    }
}

impl Default for MockCloneManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CloneManager for MockCloneManager {
    fn create(&self, spec: &CloneSpec) -> Result<()> {
        self.journal.record(format!("clone.create {}", spec.dataset()));
        *self.creates.lock().expect("lock poisoned") += 1;
        if self.fail_create {
            return Err(injected("zfs clone"));
        }
        self.clones
            .lock()
            .expect("lock poisoned")
            .insert(spec.dataset(), spec.clone());
        Ok(())
    }

    fn destroy(&self, spec: &CloneSpec) -> Result<()> {
        self.journal.record(format!("clone.destroy {}", spec.dataset()));
        if self.fail_destroy {
            return Err(injected("zfs destroy"));
        }
        self.clones
            .lock()
            .expect("lock poisoned")
            .remove(&spec.dataset());
        Ok(())
    }

    fn exists(&self, spec: &CloneSpec) -> Result<bool> {
        Ok(self.contains(spec))
    }

    fn list_all(&self) -> Result<Vec<CloneSpec>> {
        Ok(self
            .clones
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}

pub struct MockEncryptionService {
    passphrases: HashMap<AssetKey, String>,
    temp_access: HashSet<AssetKey>,
    unsealed: Mutex<HashSet<AssetKey>>,
    journal: Journal,
}

impl MockEncryptionService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            passphrases: HashMap::new(),
            temp_access: HashSet::new(),
            unsealed: Mutex::new(HashSet::new()),
            journal: Journal::new(),
        }
    }

    #[must_use]
    pub fn with_encrypted(mut self, asset: AssetKey, passphrase: &str) -> Self {
        self.passphrases.insert(asset, passphrase.to_string());
        self
    }

    #[must_use]
    pub fn with_temp_access(mut self, asset: AssetKey) -> Self {
        self.temp_access.insert(asset);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn is_unsealed(&self, asset: &AssetKey) -> bool {
        self.unsealed.lock().expect("lock poisoned").contains(asset)
    }
}

impl Default for MockEncryptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionService for MockEncryptionService {
    fn is_encrypted(&self, asset: &AssetKey) -> Result<bool> {
        Ok(self.passphrases.contains_key(asset))
    }

    fn is_temp_access_enabled(&self, asset: &AssetKey) -> Result<bool> {
        Ok(self.temp_access.contains(asset))
    }

    fn unseal(&self, asset: &AssetKey, passphrase: &str) -> Result<()> {
        self.journal.record(format!("encryption.unseal {asset}"));
        if self.passphrases.get(asset).map(String::as_str) != Some(passphrase) {
            return Err(OperationError::InvalidPassphrase(asset.clone()));
        }
        self.unsealed
            .lock()
            .expect("lock poisoned")
            .insert(asset.clone());
        Ok(())
    }

    fn seal(&self, asset: &AssetKey) -> Result<()> {
        self.journal.record(format!("encryption.seal {asset}"));
        self.unsealed.lock().expect("lock poisoned").remove(asset);
        Ok(())
    }
}

pub struct MockLoopManager {
    volumes: Vec<String>,
    attached: Mutex<BTreeMap<PathBuf, LoopMap>>,
    unmapped: Mutex<HashSet<PathBuf>>,
    next_device: Mutex<usize>,
    attaches: Mutex<usize>,
    fail_attach: bool,
    fail_detach: bool,
    journal: Journal,
}

impl MockLoopManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            volumes: vec!["vol1".to_string()],
            attached: Mutex::new(BTreeMap::new()),
            unmapped: Mutex::new(HashSet::new()),
            next_device: Mutex::new(0),
            attaches: Mutex::new(0),
            fail_attach: false,
            fail_detach: false,
            journal: Journal::new(),
        }
    }

    /// Volume images every clone is assumed to contain.
    #[must_use]
    pub fn with_volumes(mut self, volumes: &[&str]) -> Self {
        self.volumes = volumes.iter().map(ToString::to_string).collect();
        self
    }

    /// Pre-attaches this manager's volumes under `mountpoint`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_attached(self, mountpoint: &Path) -> Self {
        let loops = self.build_map(mountpoint, false);
        self.attached
            .lock()
            .expect("lock poisoned")
            .insert(mountpoint.to_path_buf(), loops);
        self
    }

    /// Pre-attaches encrypted volumes under `mountpoint` whose decrypting
    /// mappings are gone.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_unmapped(self, mountpoint: &Path) -> Self {
        let loops = self.build_map(mountpoint, true);
        self.attached
            .lock()
            .expect("lock poisoned")
            .insert(mountpoint.to_path_buf(), loops);
        self.unmapped
            .lock()
            .expect("lock poisoned")
            .insert(mountpoint.to_path_buf());
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    #[must_use]
    pub fn failing_detach(mut self) -> Self {
        self.fail_detach = true;
        self
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn attach_count(&self) -> usize {
        *self.attaches.lock().expect("lock poisoned")
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn attached_under(&self, mountpoint: &Path) -> LoopMap {
        self.attached
            .lock()
            .expect("lock poisoned")
            .get(mountpoint)
            .cloned()
            .unwrap_or_default()
    }

    fn build_map(&self, mountpoint: &Path, encrypted: bool) -> LoopMap {
        let mut next = self.next_device.lock().expect("lock poisoned");
        let extension = if encrypted { "detto" } else { "datto" };
        self.volumes
            .iter()
            .map(|volume| {
                let loop_device = PathBuf::from(format!("/dev/loop{}", *next));
                let block_device = if encrypted {
                    PathBuf::from(format!("/dev/mapper/restore-loop{}", *next))
                } else {
                    loop_device.clone()
                };
                *next += 1;
                (
                    volume.clone(),
                    LoopInfo {
                        volume_id: volume.clone(),
                        loop_device,
                        backing_file: mountpoint.join(format!("{volume}.{extension}")),
                        block_device,
                    },
                )
            })
            .collect()
    }
}

impl Default for MockLoopManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopManager for MockLoopManager {
    fn attach(&self, asset: &AssetKey, mountpoint: &Path, encrypted: bool) -> Result<LoopMap> {
        self.journal
            .record(format!("loops.attach {asset} {}", mountpoint.display()));
        *self.attaches.lock().expect("lock poisoned") += 1;
        if self.fail_attach {
            return Err(injected("losetup -f --show -P"));
        }
        let loops = self.build_map(mountpoint, encrypted);
        self.attached
            .lock()
            .expect("lock poisoned")
            .insert(mountpoint.to_path_buf(), loops.clone());
        Ok(loops)
    }

    fn detach(&self, mountpoint: &Path) -> Result<()> {
        self.journal
            .record(format!("loops.detach {}", mountpoint.display()));
        if self.fail_detach {
            return Err(injected("losetup -d"));
        }
        self.attached
            .lock()
            .expect("lock poisoned")
            .remove(mountpoint);
        self.unmapped
            .lock()
            .expect("lock poisoned")
            .remove(mountpoint);
        Ok(())
    }

    fn find_attached(&self, mountpoint: &Path) -> Result<LoopMap> {
        self.journal
            .record(format!("loops.find_attached {}", mountpoint.display()));
        let loops = self.attached_under(mountpoint);
        if self.unmapped.lock().expect("lock poisoned").contains(mountpoint) {
            if let Some(info) = loops.values().next() {
                return Err(OperationError::UnmappedLoopDevice(info.loop_device.clone()));
            }
        }
        Ok(loops)
    }
}

pub struct MockTargetService {
    targets: Mutex<BTreeMap<String, TargetInfo>>,
    running: Mutex<bool>,
    starts: Mutex<usize>,
    fail_create: bool,
    journal: Journal,
}

impl MockTargetService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            targets: Mutex::new(BTreeMap::new()),
            running: Mutex::new(true),
            starts: Mutex::new(0),
            fail_create: false,
            journal: Journal::new(),
        }
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn stopped(self) -> Self {
        *self.running.lock().expect("lock poisoned") = false;
        self
    }

    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Simulates the service losing its in-memory state.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn crash(&self) {
        self.targets.lock().expect("lock poisoned").clear();
        *self.running.lock().expect("lock poisoned") = false;
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<TargetInfo> {
        self.targets.lock().expect("lock poisoned").get(name).cloned()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.lock().expect("lock poisoned").len()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn start_count(&self) -> usize {
        *self.starts.lock().expect("lock poisoned")
    }
}

impl Default for MockTargetService {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetService for MockTargetService {
    fn create_target(&self, name: &str, luns: &[PathBuf], password: &str) -> Result<()> {
        self.journal.record(format!("targets.create {name}"));
        if self.fail_create {
            return Err(injected("targetcli /iscsi create"));
        }
        self.targets.lock().expect("lock poisoned").insert(
            name.to_string(),
            TargetInfo {
                name: name.to_string(),
                password: password.to_string(),
                luns: luns.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_target(&self, name: &str) -> Result<()> {
        self.journal.record(format!("targets.delete {name}"));
        self.targets
            .lock()
            .expect("lock poisoned")
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| OperationError::TargetNotFound(name.to_string()))
    }

    fn get_target(&self, name: &str) -> Result<TargetInfo> {
        self.target(name)
            .ok_or_else(|| OperationError::TargetNotFound(name.to_string()))
    }

    fn start_if_dead(&self) -> Result<()> {
        let mut running = self.running.lock().expect("lock poisoned");
        if !*running {
            self.journal.record("targets.start");
            *running = true;
            *self.starts.lock().expect("lock poisoned") += 1;
        }
        Ok(())
    }
}

pub struct MockRestoreRepository {
    records: Mutex<BTreeMap<RestoreKey, RestoreRecord>>,
    fail_save: bool,
    journal: Journal,
}

impl MockRestoreRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            fail_save: false,
            journal: Journal::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_record(self, record: RestoreRecord) -> Self {
        self.records
            .lock()
            .expect("lock poisoned")
            .insert(record.key(), record);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MockRestoreRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreRepository for MockRestoreRepository {
    fn find(&self, key: &RestoreKey) -> Result<Option<RestoreRecord>> {
        Ok(self.records.lock().expect("lock poisoned").get(key).cloned())
    }

    fn save(&self, record: &RestoreRecord) -> Result<()> {
        self.journal.record(format!("records.save {}", record.key().file_stem()));
        if self.fail_save {
            return Err(injected("write record"));
        }
        let mut records = self.records.lock().expect("lock poisoned");
        let key = record.key();
        if records.contains_key(&key) {
            return Err(OperationError::RestoreAlreadyExists(key));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    fn delete(&self, key: &RestoreKey) -> Result<()> {
        self.journal.record(format!("records.delete {}", key.file_stem()));
        self.records.lock().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RestoreRecord>> {
        Ok(self
            .records
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}

pub struct MockFileExclusion {
    files: Vec<String>,
    hidden: Mutex<Vec<PathBuf>>,
    fail_hide: bool,
    journal: Journal,
}

impl MockFileExclusion {
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: vec!["vol1.checksum".to_string()],
            hidden: Mutex::new(Vec::new()),
            fail_hide: false,
            journal: Journal::new(),
        }
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn failing_hide(mut self) -> Self {
        self.fail_hide = true;
        self
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn hidden(&self) -> Vec<PathBuf> {
        self.hidden.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockFileExclusion {
    fn default() -> Self {
        Self::new()
    }
}

impl FileExclusion for MockFileExclusion {
    fn hide(&self, mountpoint: &Path, _patterns: &[String]) -> Result<Vec<PathBuf>> {
        self.journal
            .record(format!("exclusion.hide {}", mountpoint.display()));
        if self.fail_hide {
            return Err(injected("hide files"));
        }
        let hidden: Vec<PathBuf> = self.files.iter().map(|f| mountpoint.join(f)).collect();
        self.hidden
            .lock()
            .expect("lock poisoned")
            .extend(hidden.iter().cloned());
        Ok(hidden)
    }

    fn reveal(&self, mountpoint: &Path, hidden: &[PathBuf]) -> Result<()> {
        self.journal
            .record(format!("exclusion.reveal {}", mountpoint.display()));
        self.hidden
            .lock()
            .expect("lock poisoned")
            .retain(|p| !hidden.contains(p));
        Ok(())
    }
}

/// Hands out `secret-1`, `secret-2`, and so on.
#[derive(Default)]
pub struct SequencePasswordGenerator {
    issued: Mutex<usize>,
}

impl SequencePasswordGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordGenerator for SequencePasswordGenerator {
    fn generate(&self) -> String {
        let mut issued = self.issued.lock().expect("lock poisoned");
        *issued += 1;
        format!("secret-{issued}")
    }
}
