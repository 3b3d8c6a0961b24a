//! Field composition: turns a dataset row into placeholder values.
//!
//! - [`rules`]: the rule types read from configuration
//! - [`resolver`]: validation of rules against the dataset and per-row evaluation
//! - [`particle`]: Korean particle selection used by particle rules

pub mod particle;
pub mod resolver;
pub mod rules;

pub use particle::Particle;
pub use resolver::{Composer, FieldFailure, Resolution};
pub use rules::{FieldRule, FieldSpec, Literal};
