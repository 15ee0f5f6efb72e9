use std::time::Instant;

/// Status of a stage in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StageStatus {
    /// Commit started but has not returned yet.
    Running,
    /// Stage committed successfully.
    Committed,
    /// Stage failed during commit.
    Failed,
    /// Stage was rolled back successfully.
    RolledBack,
    /// Stage rollback failed.
    RollbackFailed,
}

/// Record of one stage attempt within a transaction.
#[derive(Debug)]
pub struct StageRecord {
    /// Position of the stage in the transaction.
    pub index: usize,
    /// Name of the stage.
    pub name: String,
    /// Current status.
    pub status: StageStatus,
    /// When the stage started committing.
    pub started_at: Instant,
    /// When the stage last changed state (commit or rollback).
    pub completed_at: Option<Instant>,
    /// Description of rollback (if the stage committed).
    pub rollback_description: Option<String>,
    /// Whether cleanup failed for this stage.
    pub cleanup_failed: bool,
}

/// Audit log tracking every stage attempt of a transaction.
#[derive(Debug, Default)]
pub struct TransactionAuditLog {
    records: Vec<StageRecord>,
}

impl TransactionAuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn record_start(&mut self, index: usize, name: &str) {
        self.records.push(StageRecord {
            index,
            name: name.to_string(),
            status: StageStatus::Running,
            started_at: Instant::now(),
            completed_at: None,
            rollback_description: None,
            cleanup_failed: false,
        });
    }

    pub(crate) fn record_committed(&mut self, rollback_description: String) {
        if let Some(record) = self.records.last_mut() {
            record.status = StageStatus::Committed;
            record.completed_at = Some(Instant::now());
            record.rollback_description = Some(rollback_description);
        }
    }

    pub(crate) fn record_failure(&mut self) {
        if let Some(record) = self.records.last_mut() {
            record.status = StageStatus::Failed;
            record.completed_at = Some(Instant::now());
        }
    }

    pub(crate) fn record_rolled_back(&mut self, index: usize) {
        self.update(index, |record| record.status = StageStatus::RolledBack);
    }

    pub(crate) fn record_rollback_failed(&mut self, index: usize) {
        self.update(index, |record| record.status = StageStatus::RollbackFailed);
    }

    pub(crate) fn record_cleanup_failed(&mut self, index: usize) {
        self.update(index, |record| record.cleanup_failed = true);
    }

    fn update(&mut self, index: usize, apply: impl Fn(&mut StageRecord)) {
        if let Some(record) = self.records.iter_mut().rev().find(|r| r.index == index) {
            apply(record);
            record.completed_at = Some(Instant::now());
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Get a summary of the transaction for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StageStatus::Running => "…",
                StageStatus::Committed => "✓",
                StageStatus::Failed => "✗",
                StageStatus::RolledBack => "↩",
                StageStatus::RollbackFailed => "⚠",
            };
            if record.cleanup_failed {
                lines.push(format!("{status} {} (cleanup failed)", record.name));
            } else {
                lines.push(format!("{status} {}", record.name));
            }
        }
        lines.join("\n")
    }
}
