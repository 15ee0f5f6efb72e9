use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::traits::PasswordGenerator;

/// CHAP secrets must be 12 to 16 characters.
const DEFAULT_LENGTH: usize = 16;

pub struct RandomPasswordGenerator {
    length: usize,
}

impl RandomPasswordGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: DEFAULT_LENGTH,
        }
    }

    #[must_use]
    pub fn with_length(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomPasswordGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}
