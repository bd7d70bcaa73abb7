//! Domain types for the HRV dataset.
//!
//! This module provides:
//! - Lookup enumerations seeded at provisioning time: exam terms, HRV parameters
//! - The validated student code stored in `dataset`
//! - Record types written by ingestion into the fact tables

pub mod lookup;
pub mod primitives;
pub mod records;

pub use lookup::{ExamTerm, HrvParameter, UnknownLookupValue};
pub use primitives::{StudentCode, StudentCodeError};
pub use records::{IbiSample, MasterDataRecord, WindowValueRecord};
