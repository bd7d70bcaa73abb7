//! Fixed lookup values: exam terms and HRV parameters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Value that is not part of a lookup enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownLookupValue {
    pub kind: &'static str,
    pub value: String,
}

/// Exam term a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamTerm {
    Mid1,
    Mid2,
    Final,
}

impl ExamTerm {
    /// All terms in seed order.
    pub const ALL: [ExamTerm; 3] = [ExamTerm::Mid1, ExamTerm::Mid2, ExamTerm::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExamTerm::Mid1 => "mid1",
            ExamTerm::Mid2 => "mid2",
            ExamTerm::Final => "final",
        }
    }
}

impl std::fmt::Display for ExamTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamTerm {
    type Err = UnknownLookupValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExamTerm::ALL
            .into_iter()
            .find(|term| term.as_str() == s)
            .ok_or_else(|| UnknownLookupValue {
                kind: "exam term",
                value: s.to_string(),
            })
    }
}

/// HRV statistic computed per exam and per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrvParameter {
    /// Mean of the NN intervals.
    NniMean,
    /// Standard deviation of the NN intervals.
    Sdnn,
}

impl HrvParameter {
    /// All parameters in seed order.
    pub const ALL: [HrvParameter; 2] = [HrvParameter::NniMean, HrvParameter::Sdnn];

    pub fn as_str(&self) -> &'static str {
        match self {
            HrvParameter::NniMean => "nni_mean",
            HrvParameter::Sdnn => "sdnn",
        }
    }
}

impl std::fmt::Display for HrvParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HrvParameter {
    type Err = UnknownLookupValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HrvParameter::ALL
            .into_iter()
            .find(|param| param.as_str() == s)
            .ok_or_else(|| UnknownLookupValue {
                kind: "hrv parameter",
                value: s.to_string(),
            })
    }
}
