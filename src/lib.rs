//! Propellant mixture optimization engine.
//!
//! Searches oxidizer/fuel ratio and chamber pressure for the highest blended
//! (physics + surrogate) thrust under a combustion temperature ceiling, and
//! runs each search as a cancellable background job.

pub mod core;
pub mod engine;
pub mod jobs;
pub mod solvers;
