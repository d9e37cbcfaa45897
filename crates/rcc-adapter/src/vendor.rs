//! Vendor error token normalization
//!
//! Radios reject requests with vendor-specific tokens. These tables map the
//! tokens onto result codes deterministically: a case-insensitive substring
//! match, checked range first, then busy, then unavailable. Anything that
//! matches nothing is an internal error.
//!
//! To add a vendor, add a [`VendorTable`] and a match arm in [`vendor_table`].
//! Unknown vendors use the generic table.

use crate::error::AdapterError;
use crate::types::ResultCode;

/// Token lists for one vendor
#[derive(Debug)]
pub struct VendorTable {
    /// Tokens meaning the value was out of range
    pub range: &'static [&'static str],
    /// Tokens meaning the radio is temporarily busy
    pub busy: &'static [&'static str],
    /// Tokens meaning the radio cannot act right now
    pub unavailable: &'static [&'static str],
}

/// Silvus StreamCaster tokens
pub static SILVUS: VendorTable = VendorTable {
    range: &[
        "TX_POWER_OUT_OF_RANGE",
        "FREQUENCY_OUT_OF_RANGE",
        "INVALID_POWER_LEVEL",
        "INVALID_FREQUENCY",
        "PARAMETER_OUT_OF_RANGE",
        "VALUE_OUT_OF_BOUNDS",
        "INVALID_PARAMETER",
    ],
    busy: &[
        "RF_BUSY",
        "TRANSMITTER_BUSY",
        "RADIO_BUSY",
        "OPERATION_IN_PROGRESS",
        "COMMAND_QUEUE_FULL",
        "RATE_LIMITED",
    ],
    unavailable: &[
        "NODE_UNAVAILABLE",
        "RADIO_OFFLINE",
        "REBOOTING",
        "SOFT_BOOT_IN_PROGRESS",
        "SYSTEM_INITIALIZING",
        "NOT_READY",
        "OFFLINE",
    ],
};

/// Fallback tokens for vendors without a dedicated table
pub static GENERIC: VendorTable = VendorTable {
    range: &[
        "OUT_OF_RANGE",
        "INVALID_PARAMETER",
        "INVALID_RANGE",
        "BAD_VALUE",
        "RANGE_ERROR",
    ],
    busy: &["BUSY", "RETRY", "RATE_LIMIT", "TOO_MANY_REQUESTS", "BACKOFF"],
    unavailable: &["UNAVAILABLE", "REBOOT", "SOFT_BOOT", "OFFLINE", "NOT_READY"],
};

/// Look up the table for a vendor key
pub fn vendor_table(vendor: &str) -> &'static VendorTable {
    match vendor.to_ascii_lowercase().as_str() {
        "silvus" => &SILVUS,
        _ => &GENERIC,
    }
}

/// Map a vendor message onto a result code
pub fn classify(vendor: &str, message: &str) -> ResultCode {
    let table = vendor_table(vendor);
    let upper = message.to_ascii_uppercase();
    let hit = |tokens: &[&str]| tokens.iter().any(|token| upper.contains(token));

    if hit(table.range) {
        ResultCode::InvalidRange
    } else if hit(table.busy) {
        ResultCode::Busy
    } else if hit(table.unavailable) {
        ResultCode::Unavailable
    } else {
        ResultCode::InternalError
    }
}

/// Turn a vendor rejection into an adapter error, keeping the message
pub fn normalize_rejection(vendor: &str, message: &str) -> AdapterError {
    let detail = format!("{} (vendor: {})", message, vendor);
    match classify(vendor, message) {
        ResultCode::InvalidRange => AdapterError::InvalidRange(detail),
        ResultCode::Busy => AdapterError::Busy(detail),
        ResultCode::Unavailable => AdapterError::Unavailable(detail),
        _ => AdapterError::Internal(detail),
    }
}
