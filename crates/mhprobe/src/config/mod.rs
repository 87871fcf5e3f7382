//! Probe configuration.
//!
//! This module defines the protocol tunables for probe nodes.

mod methods;
mod types;

pub use types::{ProbeConfig, ProbeConfigBuilder};
