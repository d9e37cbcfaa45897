//! The radio adapter capability contract
//!
//! Every vendor driver implements [`RadioAdapter`]. Implementations serialize
//! their own internal mutations, so all methods may be called concurrently;
//! nothing is serialized across adapters. Single-flight semantics per radio
//! are the orchestrator's job.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::types::{CapabilityInfo, RadioId, RadioState};

/// Driver for one physical or virtual radio
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Radio this adapter controls
    fn id(&self) -> &RadioId;

    /// Adapter type key from the configuration (e.g. "silvus")
    fn adapter_type(&self) -> &str;

    /// Fixed capabilities, stable for the adapter's lifetime
    fn capabilities(&self) -> &CapabilityInfo;

    /// Establish or re-establish the link
    ///
    /// Calling this while `Ready` succeeds without touching the radio.
    async fn connect(&self) -> AdapterResult;

    /// Apply a transmit power in watts
    async fn set_power(&self, watts: f64) -> AdapterResult;

    /// Tune to a channel
    async fn set_channel(&self, channel_index: u32, frequency_mhz: f64) -> AdapterResult;

    /// Re-synchronize with the hardware; used for recovery probing
    async fn refresh_state(&self) -> AdapterResult;

    /// Close the link and move to `Offline`
    async fn teardown(&self);

    /// Last-known state snapshot
    fn state(&self) -> RadioState;
}

/// Time budgets and recovery threshold for one adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterTiming {
    /// Budget for establishing the link
    pub connect_timeout: Duration,
    /// Budget for a refresh probe
    pub refresh_timeout: Duration,
    /// Budget for a power change
    pub set_power_timeout: Duration,
    /// Budget for a channel change (radios may soft-boot on retune)
    pub set_channel_timeout: Duration,
    /// Consecutive failed refreshes before `Recovering` gives up to `Offline`
    pub max_refresh_failures: u32,
}

impl Default for AdapterTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            refresh_timeout: Duration::from_secs(5),
            set_power_timeout: Duration::from_secs(10),
            set_channel_timeout: Duration::from_secs(30),
            max_refresh_failures: 3,
        }
    }
}
