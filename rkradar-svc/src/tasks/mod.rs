//! Background jobs: lease gating, prediction resolution, error diagnosis,
//! improvement planning, and anomaly detection.

pub mod detect;
pub mod diagnose;
pub mod lease;
pub mod plan;
pub mod resolve;

pub use lease::{TaskLease, TaskLeases};
