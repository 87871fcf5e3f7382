//! Protocol module for probes.
//!
//! This module contains the wire enumerations, messages, outcomes and the
//! stream codec.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{CodecError, ProbeCodec};
pub use messages::{MessageKind, Outcome, ProbeMessage, ProbeRequest, ProbeValue};
pub use types::{ProbeError, ProbeType, UnknownCode};

/// Protocol name for probe messages
pub const PROBE_PROTOCOL: &str = "/mhprobe/probe/1.0";
