//! Domain models for lab-report records.

mod contaminants;
mod measurement;
mod report;

pub use contaminants::*;
pub use measurement::*;
pub use report::*;
