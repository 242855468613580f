use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::test_attempt::TestAttempt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;
use validator::Validate;

/// Fixture file for running the CLI without a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFile {
    pub tests: Vec<SeedTest>,
    #[serde(default)]
    pub attempts: Vec<TestAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SeedTest {
    pub id: Uuid,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub time_limit_seconds: Option<u32>,
    pub questions: Vec<Question>,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: SeedFile = serde_json::from_str(&raw)?;
        seed.check()?;
        Ok(seed)
    }

    pub fn check(&self) -> Result<()> {
        for test in &self.tests {
            test.validate()?;
            for question in &test.questions {
                question.validate()?;
            }
        }
        for attempt in &self.attempts {
            if !self.tests.iter().any(|t| t.id == attempt.test_id) {
                return Err(Error::BadRequest(format!(
                    "attempt {} references unknown test {}",
                    attempt.id, attempt.test_id
                )));
            }
        }
        Ok(())
    }

    pub fn test(&self, test_id: Uuid) -> Option<&SeedTest> {
        self.tests.iter().find(|t| t.id == test_id)
    }
}
