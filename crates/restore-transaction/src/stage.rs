/// One reversible step of a multi-step operation.
///
/// A stage holds no state of its own between lifecycle calls beyond what it
/// needs to reach its collaborators; everything it produces for later stages
/// goes onto the shared context.
///
/// # Lifecycle
///
/// - `commit` performs the step.
/// - `rollback` undoes it. Called only when the owning transaction fails: for
///   every committed stage under [`FailureType::StopOnFailure`], or for the
///   failing stage alone under [`FailureType::ContinueOnFailure`].
/// - `cleanup` releases whatever the stage no longer needs, and is called
///   after the transaction finishes for every stage that committed.
///
/// [`FailureType::StopOnFailure`]: crate::FailureType::StopOnFailure
/// [`FailureType::ContinueOnFailure`]: crate::FailureType::ContinueOnFailure
pub trait Stage {
    /// Shared data passed to every stage of the same transaction.
    type Context;

    /// Error type for stage failures.
    type Error;

    /// Human-readable name for logging and error messages.
    fn name(&self) -> &'static str;

    /// Perform the step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step could not be completed. The transaction
    /// treats this as the signal to roll back.
    fn commit(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error>;

    /// Release resources that are not needed once the transaction is over.
    ///
    /// The default implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails. The transaction logs it and moves
    /// on to the next stage.
    fn cleanup(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        let _ = ctx;
        Ok(())
    }

    /// Undo the effects of `commit`.
    ///
    /// May be called for a stage whose `commit` failed part-way, so
    /// implementations should only undo what the context says was done.
    /// The default implementation is a no-op, suitable for read-only stages.
    ///
    /// # Errors
    ///
    /// Returns an error if rollback fails. The transaction logs it and moves
    /// on to the next stage.
    fn rollback(&mut self, ctx: &mut Self::Context) -> Result<(), Self::Error> {
        let _ = ctx;
        Ok(())
    }

    /// Human-readable description of what rollback will do.
    fn rollback_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
