//! Probe protocol messages and outcomes.
//!
//! `ProbeMessage` is what travels between peers. `Outcome` is what a listener
//! observes once a probe attempt terminates. Relays convert between the two
//! in both directions, always building a new message instead of passing the
//! received one along.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ProbeError, ProbeType};

/// A validated probe request as seen at one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Identifier shared by every hop of one probe
    pub uid: u64,

    /// Remaining hop budget
    pub htl: u8,

    /// Requested statistic
    pub probe_type: ProbeType,
}

impl ProbeRequest {
    pub fn new(uid: u64, htl: u8, probe_type: ProbeType) -> Self {
        Self { uid, htl, probe_type }
    }

    /// Build a fresh wire message carrying only this request's fields.
    pub fn to_message(&self) -> ProbeMessage {
        ProbeMessage::Request { uid: self.uid, htl: self.htl, probe_type: self.probe_type.code() }
    }
}

/// Everything the probe protocol puts on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeMessage {
    /// Probe request. Type and HTL are kept raw so that unknown types and
    /// out-of-range HTL values reach the protocol layer instead of failing
    /// deserialization.
    Request { uid: u64, htl: u8, probe_type: u8 },
    Bandwidth { uid: u64, bandwidth: f32 },
    Build { uid: u64, build: i32 },
    Identifier { uid: u64, identifier: i64, uptime_percent: i8 },
    LinkLengths { uid: u64, link_lengths: Vec<f32> },
    Location { uid: u64, location: f32 },
    StoreSize { uid: u64, store_size: f32 },
    Uptime { uid: u64, uptime_percent: f32 },
    Refused { uid: u64 },
    /// `raw` carries the unrecognized byte behind an UNKNOWN or
    /// UNRECOGNIZED_TYPE error, when there is one.
    Error { uid: u64, error: u8, raw: Option<u8> },
}

/// Discriminant of a [`ProbeMessage`], used by reply filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Bandwidth,
    Build,
    Identifier,
    LinkLengths,
    Location,
    StoreSize,
    Uptime,
    Refused,
    Error,
}

impl ProbeType {
    /// The result message kind an endpoint answers this type with.
    pub const fn response_kind(self) -> MessageKind {
        match self {
            ProbeType::Bandwidth => MessageKind::Bandwidth,
            ProbeType::Build => MessageKind::Build,
            ProbeType::Identifier => MessageKind::Identifier,
            ProbeType::LinkLengths => MessageKind::LinkLengths,
            ProbeType::Location => MessageKind::Location,
            ProbeType::StoreSize => MessageKind::StoreSize,
            ProbeType::Uptime48h | ProbeType::Uptime7d => MessageKind::Uptime,
        }
    }
}

impl ProbeMessage {
    pub fn uid(&self) -> u64 {
        match self {
            ProbeMessage::Request { uid, .. }
            | ProbeMessage::Bandwidth { uid, .. }
            | ProbeMessage::Build { uid, .. }
            | ProbeMessage::Identifier { uid, .. }
            | ProbeMessage::LinkLengths { uid, .. }
            | ProbeMessage::Location { uid, .. }
            | ProbeMessage::StoreSize { uid, .. }
            | ProbeMessage::Uptime { uid, .. }
            | ProbeMessage::Refused { uid }
            | ProbeMessage::Error { uid, .. } => *uid,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ProbeMessage::Request { .. } => MessageKind::Request,
            ProbeMessage::Bandwidth { .. } => MessageKind::Bandwidth,
            ProbeMessage::Build { .. } => MessageKind::Build,
            ProbeMessage::Identifier { .. } => MessageKind::Identifier,
            ProbeMessage::LinkLengths { .. } => MessageKind::LinkLengths,
            ProbeMessage::Location { .. } => MessageKind::Location,
            ProbeMessage::StoreSize { .. } => MessageKind::StoreSize,
            ProbeMessage::Uptime { .. } => MessageKind::Uptime,
            ProbeMessage::Refused { .. } => MessageKind::Refused,
            ProbeMessage::Error { .. } => MessageKind::Error,
        }
    }

    /// Build the reply message which reports `outcome` for probe `uid`.
    pub fn from_outcome(uid: u64, outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Error { error, code, .. } => {
                let raw = code.filter(|_| error.carries_code());
                ProbeMessage::Error { uid, error: error.code(), raw }
            },
            Outcome::Refused => ProbeMessage::Refused { uid },
            Outcome::Value(value) => match value {
                ProbeValue::Bandwidth(bandwidth) => {
                    ProbeMessage::Bandwidth { uid, bandwidth: *bandwidth }
                },
                ProbeValue::Build(build) => ProbeMessage::Build { uid, build: *build },
                ProbeValue::Identifier { identifier, uptime_percent } => ProbeMessage::Identifier {
                    uid,
                    identifier: *identifier,
                    uptime_percent: *uptime_percent,
                },
                ProbeValue::LinkLengths(lengths) => {
                    ProbeMessage::LinkLengths { uid, link_lengths: lengths.clone() }
                },
                ProbeValue::Location(location) => {
                    ProbeMessage::Location { uid, location: *location }
                },
                ProbeValue::StoreSize(size) => ProbeMessage::StoreSize { uid, store_size: *size },
                ProbeValue::Uptime(percent) => {
                    ProbeMessage::Uptime { uid, uptime_percent: *percent }
                },
            },
        }
    }
}

/// A successfully obtained statistic.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeValue {
    /// KiB per second
    Bandwidth(f32),
    Build(i32),
    Identifier { identifier: i64, uptime_percent: i8 },
    LinkLengths(Vec<f32>),
    Location(f32),
    /// GiB
    StoreSize(f32),
    /// Percent, over either 48 hours or 7 days depending on the request
    Uptime(f32),
}

/// The terminal result of one probe attempt, as seen by one listener.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Error {
        error: ProbeError,
        /// Unrecognized raw byte, for UNKNOWN and UNRECOGNIZED_TYPE only
        code: Option<u8>,
        /// Whether the error was raised by this node rather than received
        local: bool,
    },
    /// The endpoint chose not to answer this type
    Refused,
    Value(ProbeValue),
}

impl Outcome {
    pub fn local_error(error: ProbeError) -> Self {
        Outcome::Error { error, code: None, local: true }
    }

    /// Decode a reply received from the next hop.
    ///
    /// Returns `None` for messages which are not replies.
    pub fn from_reply(message: ProbeMessage) -> Option<Self> {
        let outcome = match message {
            ProbeMessage::Request { .. } => return None,
            ProbeMessage::Bandwidth { bandwidth, .. } => {
                Outcome::Value(ProbeValue::Bandwidth(bandwidth))
            },
            ProbeMessage::Build { build, .. } => Outcome::Value(ProbeValue::Build(build)),
            ProbeMessage::Identifier { identifier, uptime_percent, .. } => {
                Outcome::Value(ProbeValue::Identifier { identifier, uptime_percent })
            },
            ProbeMessage::LinkLengths { link_lengths, .. } => {
                Outcome::Value(ProbeValue::LinkLengths(link_lengths))
            },
            ProbeMessage::Location { location, .. } => {
                Outcome::Value(ProbeValue::Location(location))
            },
            ProbeMessage::StoreSize { store_size, .. } => {
                Outcome::Value(ProbeValue::StoreSize(store_size))
            },
            ProbeMessage::Uptime { uptime_percent, .. } => {
                Outcome::Value(ProbeValue::Uptime(uptime_percent))
            },
            ProbeMessage::Refused { .. } => Outcome::Refused,
            ProbeMessage::Error { error, raw, .. } => match ProbeError::from_code(error) {
                Ok(error) => {
                    let code = raw.filter(|_| error.carries_code());
                    Outcome::Error { error, code, local: false }
                },
                // Not recognized locally.
                Err(unknown) => {
                    Outcome::Error { error: ProbeError::Unknown, code: Some(unknown.code), local: false }
                },
            },
        };
        Some(outcome)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Error { error, code, local } => {
                write!(f, "error {error}")?;
                if *local {
                    write!(f, " (local)")?;
                }
                if let Some(code) = code {
                    write!(f, " ({code})")?;
                }
                Ok(())
            },
            Outcome::Refused => write!(f, "refused"),
            Outcome::Value(ProbeValue::Bandwidth(kib)) => write!(f, "bandwidth limit {kib:.2} KiB/s"),
            Outcome::Value(ProbeValue::Build(build)) => write!(f, "build {build}"),
            Outcome::Value(ProbeValue::Identifier { identifier, uptime_percent }) => {
                write!(f, "identifier {identifier} with uptime {uptime_percent}%")
            },
            Outcome::Value(ProbeValue::LinkLengths(lengths)) => {
                write!(f, "link lengths {{ ")?;
                for length in lengths {
                    write!(f, "{length:.4} ")?;
                }
                write!(f, "}}")
            },
            Outcome::Value(ProbeValue::Location(location)) => write!(f, "location {location}"),
            Outcome::Value(ProbeValue::StoreSize(gib)) => write!(f, "store size {gib:.2} GiB"),
            Outcome::Value(ProbeValue::Uptime(percent)) => write!(f, "uptime {percent:.2}%"),
        }
    }
}
