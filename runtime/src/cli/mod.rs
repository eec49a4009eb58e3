//! Command implementations for the `livenav` binary.

pub mod capture;
pub mod output;
