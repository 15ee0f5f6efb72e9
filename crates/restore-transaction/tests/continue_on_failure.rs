//! Integration tests for the continue-on-failure policy.

use restore_transaction::{FailureType, Stage, Transaction};

#[derive(Default)]
struct TestContext {
    log: Vec<String>,
    counter: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

struct IncrementStage {
    name: &'static str,
    fail: bool,
}

impl Stage for IncrementStage {
    type Context = TestContext;
    type Error = TestError;

    fn name(&self) -> &'static str {
        self.name
    }

    fn commit(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        ctx.counter += 1;
        ctx.log.push(format!("commit {}", self.name));
        if self.fail {
            return Err(TestError(format!("{} failed", self.name)));
        }
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        ctx.counter -= 1;
        ctx.log.push(format!("rollback {}", self.name));
        Ok(())
    }
}

fn stage(name: &'static str, fail: bool) -> IncrementStage {
    IncrementStage { name, fail }
}

#[test]
fn earlier_stages_stay_committed_and_later_stages_run() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut transaction = Transaction::new(FailureType::ContinueOnFailure);
    transaction
        .add(stage("s1", false))
        .add(stage("s2", false))
        .add(stage("s3", true))
        .add(stage("s4", false))
        .add(stage("s5", false));

    let report = transaction.commit(&mut ctx)?;

    assert_eq!(report.committed, vec!["s1", "s2", "s4", "s5"]);
    assert_eq!(ctx.counter, 4);
    assert_eq!(
        ctx.log
            .iter()
            .filter(|l| l.starts_with("rollback"))
            .collect::<Vec<_>>(),
        vec!["rollback s3"]
    );
    Ok(())
}

#[test]
fn every_failure_is_reported_in_order() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut transaction = Transaction::new(FailureType::ContinueOnFailure);
    transaction
        .add(stage("s1", true))
        .add(stage("s2", false))
        .add(stage("s3", true));

    let report = transaction.commit(&mut ctx)?;

    let failed: Vec<&str> = report
        .stage_failures
        .iter()
        .map(|f| f.stage.as_str())
        .collect();
    assert_eq!(failed, vec!["s1", "s3"]);
    assert_eq!(report.stage_failures[1].error.to_string(), "s3 failed");
    assert_eq!(transaction.committed_stages(), vec!["s2"]);
    Ok(())
}

#[test]
fn all_stages_failing_still_returns_ok() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut transaction = Transaction::new(FailureType::ContinueOnFailure);
    transaction.add(stage("s1", true)).add(stage("s2", true));

    let report = transaction.commit(&mut ctx)?;

    assert!(report.committed.is_empty());
    assert_eq!(report.stage_failures.len(), 2);
    assert_eq!(ctx.counter, 0);
    Ok(())
}
