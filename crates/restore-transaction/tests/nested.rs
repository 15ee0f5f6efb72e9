//! Integration tests for transactions nested as stages.

use restore_transaction::{FailureType, NestedTransaction, Stage, Transaction, TransactionError};

#[derive(Default)]
struct TestContext {
    log: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error("{0}")]
    Stage(String),
    #[error(transparent)]
    Nested(Box<TransactionError<TestError>>),
}

impl From<TransactionError<TestError>> for TestError {
    fn from(err: TransactionError<TestError>) -> Self {
        Self::Nested(Box::new(err))
    }
}

struct LoggingStage {
    name: &'static str,
    fail: bool,
}

impl Stage for LoggingStage {
    type Context = TestContext;
    type Error = TestError;

    fn name(&self) -> &'static str {
        self.name
    }

    fn commit(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        ctx.log.push(format!("commit {}", self.name));
        if self.fail {
            return Err(TestError::Stage(format!("{} failed", self.name)));
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        ctx.log.push(format!("cleanup {}", self.name));
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        ctx.log.push(format!("rollback {}", self.name));
        Ok(())
    }
}

fn ok(name: &'static str) -> LoggingStage {
    LoggingStage { name, fail: false }
}

fn failing(name: &'static str) -> LoggingStage {
    LoggingStage { name, fail: true }
}

fn count(log: &[String], line: &str) -> usize {
    log.iter().filter(|l| *l == line).count()
}

#[test]
fn repeated_lifecycle_calls_have_single_effect() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut nested = NestedTransaction::new("inner", FailureType::StopOnFailure);
    nested.add(ok("x")).add(ok("y"));

    nested.commit(&mut ctx)?;
    nested.commit(&mut ctx)?;
    nested.cleanup(&mut ctx)?;
    nested.cleanup(&mut ctx)?;
    nested.rollback(&mut ctx)?;
    nested.rollback(&mut ctx)?;

    assert_eq!(count(&ctx.log, "commit x"), 1);
    assert_eq!(count(&ctx.log, "commit y"), 1);
    assert_eq!(count(&ctx.log, "cleanup x"), 1);
    assert_eq!(count(&ctx.log, "cleanup y"), 1);
    assert_eq!(count(&ctx.log, "rollback x"), 1);
    assert_eq!(count(&ctx.log, "rollback y"), 1);
    Ok(())
}

#[test]
fn parent_cleanup_does_not_repeat_inner_cleanup() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut nested = NestedTransaction::new("inner", FailureType::StopOnFailure);
    nested.add(ok("x"));

    let mut outer = Transaction::new(FailureType::StopOnFailure);
    outer.add(ok("before")).add(nested).add(ok("after"));

    outer.commit(&mut ctx)?;

    assert_eq!(count(&ctx.log, "commit x"), 1);
    assert_eq!(count(&ctx.log, "cleanup x"), 1);
    assert_eq!(count(&ctx.log, "cleanup before"), 1);
    assert_eq!(count(&ctx.log, "cleanup after"), 1);
    Ok(())
}

#[test]
fn inner_failure_is_rolled_back_once() {
    let mut ctx = TestContext::default();
    let mut nested = NestedTransaction::new("inner", FailureType::StopOnFailure);
    nested.add(ok("x")).add(failing("y"));

    let mut outer = Transaction::new(FailureType::StopOnFailure);
    outer.add(ok("before")).add(nested);

    let err = outer.commit(&mut ctx).expect_err("inner fails");

    assert!(matches!(err, TransactionError::StageFailed { ref stage, .. } if stage == "inner"));
    assert_eq!(count(&ctx.log, "rollback y"), 1);
    assert_eq!(count(&ctx.log, "rollback x"), 1);
    assert_eq!(count(&ctx.log, "rollback before"), 1);
}

#[test]
fn later_failure_rolls_back_nested_stages() {
    let mut ctx = TestContext::default();
    let mut nested = NestedTransaction::new("inner", FailureType::StopOnFailure);
    nested.add(ok("x")).add(ok("y"));

    let mut outer = Transaction::new(FailureType::StopOnFailure);
    outer.add(nested).add(failing("after"));

    let _ = outer.commit(&mut ctx);

    let rollbacks: Vec<&str> = ctx
        .log
        .iter()
        .filter_map(|l| l.strip_prefix("rollback "))
        .collect();
    assert_eq!(rollbacks, vec!["after", "y", "x"]);
}

#[test]
fn flags_track_lifecycle() -> anyhow::Result<()> {
    let mut ctx = TestContext::default();
    let mut nested = NestedTransaction::new("inner", FailureType::StopOnFailure);
    nested.add(ok("x"));

    assert!(!nested.commit_occurred());
    nested.commit(&mut ctx)?;

    assert!(nested.commit_occurred());
    assert!(nested.cleanup_occurred());
    assert!(!nested.rollback_occurred());
    assert_eq!(nested.inner().committed_stages(), vec!["x"]);
    Ok(())
}
