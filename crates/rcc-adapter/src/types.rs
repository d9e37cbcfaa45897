//! Data model shared by adapters, the registry and the orchestrator

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::RadioStatus;

/// Two frequencies closer than this are the same channel
const FREQUENCY_TOLERANCE_MHZ: f64 = 1e-6;

/// Unique identifier for a managed radio
///
/// Assigned when the fleet configuration is loaded and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadioId(String);

impl RadioId {
    /// Create a radio id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RadioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RadioId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RadioId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for RadioId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RadioId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Observed operational state of one radio
///
/// `channel_index` and `power_watts` stay `None` until the radio has reported
/// them at least once. `None` is not the same as zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadioState {
    /// Lifecycle status
    pub status: RadioStatus,
    /// Last applied channel index (1-based)
    pub channel_index: Option<u32>,
    /// Last applied transmit power in watts
    pub power_watts: Option<f64>,
}

impl RadioState {
    /// Create a state with the given status and no reported values
    pub fn with_status(status: RadioStatus) -> Self {
        Self {
            status,
            channel_index: None,
            power_watts: None,
        }
    }
}

/// Inclusive transmit power range in watts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
    /// Lowest accepted power
    pub min_watts: f64,
    /// Highest accepted power
    pub max_watts: f64,
}

impl PowerRange {
    /// Create a new range
    pub fn new(min_watts: f64, max_watts: f64) -> Self {
        Self {
            min_watts,
            max_watts,
        }
    }

    /// Check whether a power value lies inside the range (NaN never does)
    pub fn contains(&self, watts: f64) -> bool {
        watts.is_finite() && watts >= self.min_watts && watts <= self.max_watts
    }
}

impl fmt::Display for PowerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] W", self.min_watts, self.max_watts)
    }
}

/// Fixed capabilities of one adapter instance
///
/// The frequency list is kept sorted and free of duplicates, so the n-th
/// entry is channel `n` (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CapabilityFields")]
pub struct CapabilityInfo {
    supported_frequencies_mhz: Vec<f64>,
    power_range_watts: PowerRange,
}

#[derive(Deserialize)]
struct CapabilityFields {
    supported_frequencies_mhz: Vec<f64>,
    power_range_watts: PowerRange,
}

impl From<CapabilityFields> for CapabilityInfo {
    fn from(fields: CapabilityFields) -> Self {
        Self::new(fields.supported_frequencies_mhz, fields.power_range_watts)
    }
}

impl CapabilityInfo {
    /// Build capabilities, normalizing the frequency list into an ordered set
    pub fn new(frequencies_mhz: impl IntoIterator<Item = f64>, power_range: PowerRange) -> Self {
        let mut frequencies: Vec<f64> = frequencies_mhz
            .into_iter()
            .filter(|f| f.is_finite())
            .collect();
        frequencies.sort_by(f64::total_cmp);
        frequencies.dedup_by(|a, b| (*a - *b).abs() < FREQUENCY_TOLERANCE_MHZ);

        Self {
            supported_frequencies_mhz: frequencies,
            power_range_watts: power_range,
        }
    }

    /// Supported frequencies in ascending order
    pub fn supported_frequencies_mhz(&self) -> &[f64] {
        &self.supported_frequencies_mhz
    }

    /// Accepted transmit power range
    pub fn power_range_watts(&self) -> PowerRange {
        self.power_range_watts
    }

    /// Check whether a frequency is one of the supported channels
    pub fn supports_frequency(&self, frequency_mhz: f64) -> bool {
        self.channel_index_of(frequency_mhz).is_some()
    }

    /// Resolve a 1-based channel index to its frequency
    pub fn channel_frequency(&self, channel_index: u32) -> Option<f64> {
        let slot = usize::try_from(channel_index).ok()?.checked_sub(1)?;
        self.supported_frequencies_mhz.get(slot).copied()
    }

    /// Resolve a frequency to its 1-based channel index
    pub fn channel_index_of(&self, frequency_mhz: f64) -> Option<u32> {
        if !frequency_mhz.is_finite() {
            return None;
        }
        self.supported_frequencies_mhz
            .iter()
            .position(|f| (f - frequency_mhz).abs() < FREQUENCY_TOLERANCE_MHZ)
            .and_then(|slot| u32::try_from(slot + 1).ok())
    }
}

/// Outcome classification for every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    /// Command applied
    Ok,
    /// Caller-supplied value outside the adapter's capabilities
    InvalidRange,
    /// Radio is executing another command; retry later
    Busy,
    /// Adapter or link is down
    Unavailable,
    /// Invariant violation or unexpected fault
    InternalError,
    /// Caller lacks the required scope
    Unauthorized,
}

impl ResultCode {
    /// Stable string form used in audit records and telemetry payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidRange => "INVALID_RANGE",
            Self::Busy => "BUSY",
            Self::Unavailable => "UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result returned by every orchestrator operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Outcome classification
    pub code: ResultCode,
    /// Human-readable detail
    pub message: String,
}

impl CommandResult {
    /// Create a result with an explicit code
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Successful result
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Ok, message)
    }

    /// Range validation failure
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InvalidRange, message)
    }

    /// Contention on the target radio
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Busy, message)
    }

    /// Radio or link unavailable
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Unavailable, message)
    }

    /// Internal fault
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InternalError, message)
    }

    /// Authorization denial
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Unauthorized, message)
    }

    /// Check if the command succeeded
    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
