//! Domain primitives: StudentCode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest student code the `dataset` table accepts.
pub const MAX_STUDENT_CODE_LEN: usize = 5;

/// Error returned for a malformed student code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudentCodeError {
    #[error("student code must not be empty")]
    Empty,
    #[error("student code {0:?} is longer than {} characters", MAX_STUDENT_CODE_LEN)]
    TooLong(String),
}

/// Short participant code such as `S1` or `S10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentCode(String);

impl StudentCode {
    /// Parse a student code, trimming surrounding whitespace.
    pub fn parse(code: &str) -> Result<Self, StudentCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(StudentCodeError::Empty);
        }
        if code.chars().count() > MAX_STUDENT_CODE_LEN {
            return Err(StudentCodeError::TooLong(code.to_string()));
        }
        Ok(StudentCode(code.to_string()))
    }

    /// Get the code as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StudentCode {
    type Error = StudentCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StudentCode::parse(&value)
    }
}

impl From<StudentCode> for String {
    fn from(code: StudentCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for StudentCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
