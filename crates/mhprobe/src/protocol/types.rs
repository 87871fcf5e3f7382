//! Wire enumerations for the probe protocol.
//!
//! Both enums carry explicit byte codes which are part of the wire format.
//! The codes are never derived from declaration order, so variants may be
//! reordered in source without breaking compatibility between node versions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A byte which does not map to any variant this node knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("there is no {kind} with code {code}")]
pub struct UnknownCode {
    /// Which enumeration was being decoded
    pub kind: &'static str,
    /// The raw byte that failed to decode
    pub code: u8,
}

/// The statistic a probe asks the endpoint for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProbeType {
    /// Output bandwidth limit in KiB per second
    Bandwidth,
    /// Build number of the endpoint
    Build,
    /// Pseudonymous identifier with a quantized 7-day uptime percentage
    Identifier,
    /// Distances to each connected peer
    LinkLengths,
    /// Location of the endpoint in the overlay keyspace
    Location,
    /// Datastore size in GiB
    StoreSize,
    /// Uptime percentage over the last 48 hours
    Uptime48h,
    /// Uptime percentage over the last 7 days
    Uptime7d,
}

impl ProbeType {
    /// Every type, in code order.
    pub const ALL: [ProbeType; 8] = [
        ProbeType::Bandwidth,
        ProbeType::Build,
        ProbeType::Identifier,
        ProbeType::LinkLengths,
        ProbeType::Location,
        ProbeType::StoreSize,
        ProbeType::Uptime48h,
        ProbeType::Uptime7d,
    ];

    /// Stable wire code
    pub const fn code(self) -> u8 {
        match self {
            ProbeType::Bandwidth => 0,
            ProbeType::Build => 1,
            ProbeType::Identifier => 2,
            ProbeType::LinkLengths => 3,
            ProbeType::Location => 4,
            ProbeType::StoreSize => 5,
            ProbeType::Uptime48h => 6,
            ProbeType::Uptime7d => 7,
        }
    }

    /// Decode a wire code.
    pub const fn from_code(code: u8) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(ProbeType::Bandwidth),
            1 => Ok(ProbeType::Build),
            2 => Ok(ProbeType::Identifier),
            3 => Ok(ProbeType::LinkLengths),
            4 => Ok(ProbeType::Location),
            5 => Ok(ProbeType::StoreSize),
            6 => Ok(ProbeType::Uptime48h),
            7 => Ok(ProbeType::Uptime7d),
            _ => Err(UnknownCode { kind: "probe type", code }),
        }
    }

    /// Name used in logs and configuration keys
    pub const fn name(self) -> &'static str {
        match self {
            ProbeType::Bandwidth => "BANDWIDTH",
            ProbeType::Build => "BUILD",
            ProbeType::Identifier => "IDENTIFIER",
            ProbeType::LinkLengths => "LINK_LENGTHS",
            ProbeType::Location => "LOCATION",
            ProbeType::StoreSize => "STORE_SIZE",
            ProbeType::Uptime48h => "UPTIME_48H",
            ProbeType::Uptime7d => "UPTIME_7D",
        }
    }
}

impl From<ProbeType> for u8 {
    fn from(value: ProbeType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ProbeType {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProbeError {
    /// No peers to route to, or the awaited peer disconnected
    #[error("DISCONNECTED")]
    Disconnected,
    /// An admission ceiling was reached somewhere along the path
    #[error("OVERLOAD")]
    Overload,
    /// No reply arrived within the timeout
    #[error("TIMEOUT")]
    Timeout,
    /// A remote error code this node does not recognize
    #[error("UNKNOWN")]
    Unknown,
    /// The request asked for a type this node does not recognize
    #[error("UNRECOGNIZED_TYPE")]
    UnrecognizedType,
    /// Peers existed but none could be sent to within the attempt limit
    #[error("CANNOT_FORWARD")]
    CannotForward,
}

impl ProbeError {
    /// Every error, in code order.
    pub const ALL: [ProbeError; 6] = [
        ProbeError::Disconnected,
        ProbeError::Overload,
        ProbeError::Timeout,
        ProbeError::Unknown,
        ProbeError::UnrecognizedType,
        ProbeError::CannotForward,
    ];

    /// Stable wire code
    pub const fn code(self) -> u8 {
        match self {
            ProbeError::Disconnected => 0,
            ProbeError::Overload => 1,
            ProbeError::Timeout => 2,
            ProbeError::Unknown => 3,
            ProbeError::UnrecognizedType => 4,
            ProbeError::CannotForward => 5,
        }
    }

    /// Whether an error of this kind may carry the raw byte it failed on.
    pub const fn carries_code(self) -> bool {
        matches!(self, ProbeError::Unknown | ProbeError::UnrecognizedType)
    }

    /// Decode a wire code.
    pub const fn from_code(code: u8) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(ProbeError::Disconnected),
            1 => Ok(ProbeError::Overload),
            2 => Ok(ProbeError::Timeout),
            3 => Ok(ProbeError::Unknown),
            4 => Ok(ProbeError::UnrecognizedType),
            5 => Ok(ProbeError::CannotForward),
            _ => Err(UnknownCode { kind: "probe error", code }),
        }
    }
}

impl From<ProbeError> for u8 {
    fn from(value: ProbeError) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ProbeError {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}
