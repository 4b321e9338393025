//! # Configuration Module
//!
//! Centralizes the on-disk layout and locking constants for chainhash.
//! Constants that depend on each other are co-located and their
//! relationships are enforced through compile-time assertions.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency notes

pub mod constants;
pub use constants::*;
