//! Rows written into the fact tables by ingestion.

use super::{ExamTerm, HrvParameter};
use serde::{Deserialize, Serialize};

/// One inter-beat interval of a raw recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbiSample {
    /// Position of the interval within the recording.
    pub ibi_value_id: i64,
    /// Milliseconds between two heartbeats.
    pub ibi_value: i64,
    pub timestamp: i64,
}

/// Per-exam aggregate for one student.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterDataRecord {
    pub term: ExamTerm,
    pub grade: i64,
    pub nni_mean: f64,
    pub sdnn: f64,
    pub number_of_ibi: i64,
    pub duration_in_h: f64,
}

/// HRV value computed over one window of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowValueRecord {
    pub window_id: i64,
    pub timestamp: i64,
    pub parameter: HrvParameter,
    pub hrv_value: f64,
    pub number_of_ibi: i64,
}
