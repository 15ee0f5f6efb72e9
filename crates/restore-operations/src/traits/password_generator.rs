/// Generates secrets for published targets.
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> String;
}
