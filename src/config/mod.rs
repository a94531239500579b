//! Configuration module
//!
//! Handles loading and validating the gateway configuration.

mod gateway;

pub use gateway::*;
