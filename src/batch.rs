//! Batch document generation.
//!
//! [`generate`] drives one run: rules are checked, the template is opened once,
//! and every dataset row becomes a named set of artifacts or a recorded
//! failure in the [`RunReport`].

pub mod executor;
pub mod naming;
pub mod report;

pub use executor::{BatchPlan, Progress, generate};
pub use naming::{BaseNames, NamingStrategy};
pub use report::{RowOutcome, RowStatus, RunReport};
