//! Domain models for patient records.

mod doctor;
mod patient;

pub use doctor::*;
pub use patient::*;
