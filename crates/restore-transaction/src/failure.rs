use std::fmt;

/// What a transaction does when one of its stages fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureType {
    /// Roll back the failing stage and every committed stage, most recent
    /// first, then abort with the stage's error.
    #[default]
    StopOnFailure,
    /// Roll back only the failing stage, keep earlier stages committed and
    /// carry on with the next stage.
    ContinueOnFailure,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopOnFailure => write!(f, "stop-on-failure"),
            Self::ContinueOnFailure => write!(f, "continue-on-failure"),
        }
    }
}
