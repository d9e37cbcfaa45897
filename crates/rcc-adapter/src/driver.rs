//! Generic link-driven adapter
//!
//! [`LinkedAdapter`] implements the whole [`RadioAdapter`] contract on top of
//! any [`RadioLink`]: capability checks, the status state machine, adapter-level
//! timeouts and vendor error normalization. Vendor drivers only provide I/O.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterTiming, RadioAdapter};
use crate::error::{AdapterError, AdapterResult, LinkError};
use crate::link::RadioLink;
use crate::status::{LinkEvent, RadioStatus, StateCell};
use crate::types::{CapabilityInfo, RadioId, RadioState};
use crate::vendor::normalize_rejection;

/// Adapter built from a capability set and a link
pub struct LinkedAdapter<L> {
    id: RadioId,
    adapter_type: String,
    capabilities: CapabilityInfo,
    timing: AdapterTiming,
    cell: Mutex<StateCell>,
    link: L,
}

/// A command handed to the link
///
/// If the command future is dropped before it settles (caller cancelled, or
/// the link panicked), the radio can no longer be trusted to be idle and the
/// link is treated as lost.
struct InFlight<'a> {
    cell: &'a Mutex<StateCell>,
    id: &'a RadioId,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut cell = self.cell.lock();
        if cell.status() == RadioStatus::Busy {
            warn!("Command on radio {} abandoned in flight, marking link lost", self.id);
            let _ = cell.apply(LinkEvent::LinkLost);
        }
    }
}

fn millis(budget: Duration) -> u64 {
    u64::try_from(budget.as_millis()).unwrap_or(u64::MAX)
}

impl<L: RadioLink> LinkedAdapter<L> {
    /// Create an adapter in `Discovering`
    pub fn new(
        id: RadioId,
        adapter_type: impl Into<String>,
        capabilities: CapabilityInfo,
        timing: AdapterTiming,
        link: L,
    ) -> Self {
        Self {
            id,
            adapter_type: adapter_type.into(),
            capabilities,
            timing,
            cell: Mutex::new(StateCell::new(timing.max_refresh_failures)),
            link,
        }
    }

    /// The underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Time budgets in effect
    pub fn timing(&self) -> &AdapterTiming {
        &self.timing
    }

    fn status(&self) -> RadioStatus {
        self.cell.lock().status()
    }

    fn transition(&self, event: LinkEvent) -> RadioStatus {
        let mut cell = self.cell.lock();
        match cell.apply(event) {
            Ok(status) => status,
            Err(err) => {
                warn!("Radio {}: {}", self.id, err);
                cell.status()
            }
        }
    }

    fn begin_command(&self) -> AdapterResult<InFlight<'_>> {
        let mut cell = self.cell.lock();
        match cell.status() {
            RadioStatus::Ready => {
                cell.apply(LinkEvent::CommandStarted)
                    .map_err(|err| AdapterError::Internal(err.to_string()))?;
                Ok(InFlight {
                    cell: &self.cell,
                    id: &self.id,
                    armed: true,
                })
            }
            RadioStatus::Busy => Err(AdapterError::Busy(format!(
                "radio {} is executing another command",
                self.id
            ))),
            status => Err(AdapterError::Unavailable(format!(
                "radio {} is {}",
                self.id, status
            ))),
        }
    }

    fn settle(
        &self,
        in_flight: InFlight<'_>,
        operation: &'static str,
        budget: Duration,
        outcome: Result<Result<(), LinkError>, Elapsed>,
        on_applied: impl FnOnce(&mut StateCell),
    ) -> AdapterResult {
        in_flight.disarm();

        let mut cell = self.cell.lock();
        let (event, result) = match outcome {
            Ok(Ok(())) => {
                on_applied(&mut cell);
                (LinkEvent::CommandFinished, Ok(()))
            }
            Ok(Err(err)) => {
                let event = if err.link_survives() {
                    LinkEvent::CommandFinished
                } else {
                    LinkEvent::LinkLost
                };
                let error = match err {
                    LinkError::Rejected(token) => {
                        debug!("Radio {} rejected {}: {}", self.id, operation, token);
                        normalize_rejection(self.link.vendor(), &token)
                    }
                    other => {
                        warn!("Radio {} lost link during {}: {}", self.id, operation, other);
                        AdapterError::Unavailable(other.to_string())
                    }
                };
                (event, Err(error))
            }
            Err(_) => {
                warn!(
                    "Radio {} did not answer {} within {}ms",
                    self.id,
                    operation,
                    millis(budget)
                );
                (
                    LinkEvent::LinkLost,
                    Err(AdapterError::Timeout {
                        operation,
                        after_ms: millis(budget),
                    }),
                )
            }
        };

        if let Err(err) = cell.apply(event) {
            warn!("Radio {}: {}", self.id, err);
        }
        result
    }
}

#[async_trait]
impl<L: RadioLink> RadioAdapter for LinkedAdapter<L> {
    fn id(&self) -> &RadioId {
        &self.id
    }

    fn adapter_type(&self) -> &str {
        &self.adapter_type
    }

    fn capabilities(&self) -> &CapabilityInfo {
        &self.capabilities
    }

    async fn connect(&self) -> AdapterResult {
        match self.status() {
            RadioStatus::Ready => {
                debug!("Radio {} already connected", self.id);
                return Ok(());
            }
            RadioStatus::Busy => {
                return Err(AdapterError::Busy(format!(
                    "radio {} is executing another command",
                    self.id
                )));
            }
            _ => {}
        }

        let budget = self.timing.connect_timeout;
        match timeout(budget, self.link.open()).await {
            Ok(Ok(())) => {
                self.transition(LinkEvent::ConnectSucceeded);
                info!("Radio {} connected ({})", self.id, self.adapter_type);
                Ok(())
            }
            Ok(Err(err)) => {
                self.transition(LinkEvent::ConnectFailed);
                warn!("Radio {} failed to connect: {}", self.id, err);
                Err(AdapterError::Unavailable(err.to_string()))
            }
            Err(_) => {
                self.transition(LinkEvent::ConnectFailed);
                warn!(
                    "Radio {} connect timed out after {}ms",
                    self.id,
                    millis(budget)
                );
                Err(AdapterError::Timeout {
                    operation: "connect",
                    after_ms: millis(budget),
                })
            }
        }
    }

    async fn set_power(&self, watts: f64) -> AdapterResult {
        let range = self.capabilities.power_range_watts();
        if !range.contains(watts) {
            return Err(AdapterError::InvalidRange(format!(
                "power {} W outside {}",
                watts, range
            )));
        }

        let in_flight = self.begin_command()?;
        let budget = self.timing.set_power_timeout;
        let outcome = timeout(budget, self.link.apply_power(watts)).await;
        self.settle(in_flight, "set_power", budget, outcome, |cell| {
            cell.set_power(watts)
        })
    }

    async fn set_channel(&self, channel_index: u32, frequency_mhz: f64) -> AdapterResult {
        if channel_index == 0 {
            return Err(AdapterError::InvalidRange(
                "channel indices start at 1".to_string(),
            ));
        }
        if !self.capabilities.supports_frequency(frequency_mhz) {
            return Err(AdapterError::InvalidRange(format!(
                "frequency {} MHz not supported by radio {}",
                frequency_mhz, self.id
            )));
        }

        let in_flight = self.begin_command()?;
        let budget = self.timing.set_channel_timeout;
        let outcome = timeout(
            budget,
            self.link.apply_channel(channel_index, frequency_mhz),
        )
        .await;
        self.settle(in_flight, "set_channel", budget, outcome, |cell| {
            cell.set_channel(channel_index)
        })
    }

    async fn refresh_state(&self) -> AdapterResult {
        if self.status() == RadioStatus::Busy {
            return Err(AdapterError::Busy(format!(
                "radio {} is executing another command",
                self.id
            )));
        }

        let budget = self.timing.refresh_timeout;
        let error = match timeout(budget, self.link.probe()).await {
            Ok(Ok(())) => {
                let status = self.transition(LinkEvent::RefreshSucceeded);
                debug!("Radio {} refreshed, now {}", self.id, status);
                return Ok(());
            }
            Ok(Err(err)) => AdapterError::Unavailable(err.to_string()),
            Err(_) => AdapterError::Timeout {
                operation: "refresh",
                after_ms: millis(budget),
            },
        };

        let mut cell = self.cell.lock();
        match cell.record_refresh_failure() {
            Ok(status) => debug!(
                "Radio {} refresh failed ({} in a row), now {}",
                self.id,
                cell.refresh_failures(),
                status
            ),
            Err(err) => warn!("Radio {}: {}", self.id, err),
        }
        Err(error)
    }

    async fn teardown(&self) {
        self.link.close().await;
        self.transition(LinkEvent::Teardown);
        info!("Radio {} torn down", self.id);
    }

    fn state(&self) -> RadioState {
        self.cell.lock().state()
    }
}
