//! Radio lifecycle status and its state machine
//!
//! Every status change an adapter makes goes through [`RadioStatus::apply`],
//! which only accepts the transitions listed below. Anything else is rejected
//! with [`InvalidTransition`] and the status is left alone.
//!
//! | From                         | Event              | To         |
//! |------------------------------|--------------------|------------|
//! | Discovering, Offline         | connect success    | Ready      |
//! | Discovering, Offline         | connect failure    | Offline    |
//! | Ready                        | connect success    | Ready      |
//! | Recovering                   | connect success    | Ready      |
//! | Recovering                   | connect failure    | Recovering |
//! | any but Busy                 | refresh success    | Ready      |
//! | Ready, Recovering            | refresh failure    | Recovering |
//! | Discovering, Offline         | refresh failure    | Offline    |
//! | Recovering                   | refresh exhausted  | Offline    |
//! | Ready                        | command started    | Busy       |
//! | Busy                         | command finished   | Ready      |
//! | Ready, Busy                  | link lost          | Recovering |
//! | any                          | teardown           | Offline    |

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::RadioState;

/// Lifecycle status of a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioStatus {
    /// Connection attempted and failed, or torn down
    Offline,
    /// Loaded from configuration, no connect attempt finished yet
    #[default]
    Discovering,
    /// Link up and idle
    Ready,
    /// Executing a command
    Busy,
    /// Link lost, waiting for a successful refresh
    Recovering,
}

/// Events that drive status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    /// The link was established
    ConnectSucceeded,
    /// The link could not be established
    ConnectFailed,
    /// A refresh probe reached the radio
    RefreshSucceeded,
    /// A refresh probe failed
    RefreshFailed,
    /// Too many consecutive refresh failures while recovering
    RefreshExhausted,
    /// A command was handed to the radio
    CommandStarted,
    /// The radio answered a command (applied or rejected)
    CommandFinished,
    /// The link dropped or a command timed out
    LinkLost,
    /// The adapter is being shut down
    Teardown,
}

/// Rejected status transition
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid status transition: {event:?} while {from}")]
pub struct InvalidTransition {
    /// Status before the event
    pub from: RadioStatus,
    /// Event that does not apply in that status
    pub event: LinkEvent,
}

impl RadioStatus {
    /// Get the lowercase name used in telemetry
    pub fn name(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Recovering => "recovering",
        }
    }

    /// Compute the status that follows `event`
    pub fn apply(self, event: LinkEvent) -> Result<RadioStatus, InvalidTransition> {
        use LinkEvent::*;
        use RadioStatus::*;

        let next = match (self, event) {
            (_, Teardown) => Offline,
            (Discovering | Offline | Ready | Recovering, ConnectSucceeded) => Ready,
            (Discovering | Offline, ConnectFailed) => Offline,
            (Recovering, ConnectFailed) => Recovering,
            (Discovering | Offline | Ready | Recovering, RefreshSucceeded) => Ready,
            (Ready | Recovering, RefreshFailed) => Recovering,
            (Discovering | Offline, RefreshFailed) => Offline,
            (Recovering, RefreshExhausted) => Offline,
            (Ready, CommandStarted) => Busy,
            (Busy, CommandFinished) => Ready,
            (Ready | Busy, LinkLost) => Recovering,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

impl std::fmt::Display for RadioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Adapter-owned state plus the bookkeeping for recovery
///
/// Adapters keep one of these behind their own lock. The failure counter
/// only runs while the radio is `Recovering`; reaching the threshold applies
/// [`LinkEvent::RefreshExhausted`].
#[derive(Debug, Clone)]
pub struct StateCell {
    state: RadioState,
    refresh_failures: u32,
    max_refresh_failures: u32,
}

impl StateCell {
    /// Create a cell in `Discovering` with no reported values
    pub fn new(max_refresh_failures: u32) -> Self {
        Self {
            state: RadioState::default(),
            refresh_failures: 0,
            max_refresh_failures: max_refresh_failures.max(1),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> RadioState {
        self.state.clone()
    }

    /// Current status
    pub fn status(&self) -> RadioStatus {
        self.state.status
    }

    /// Consecutive failed refreshes in the current recovery episode
    pub fn refresh_failures(&self) -> u32 {
        self.refresh_failures
    }

    /// Apply an event through the state machine
    pub fn apply(&mut self, event: LinkEvent) -> Result<RadioStatus, InvalidTransition> {
        let from = self.state.status;
        let next = from.apply(event)?;
        if next != from {
            debug!("Status {} -> {} on {:?}", from, next, event);
        }
        if next != RadioStatus::Recovering {
            self.refresh_failures = 0;
        }
        self.state.status = next;
        Ok(next)
    }

    /// Record a failed refresh, escalating to `Offline` at the threshold
    pub fn record_refresh_failure(&mut self) -> Result<RadioStatus, InvalidTransition> {
        let was_recovering = self.state.status == RadioStatus::Recovering;
        let next = self.apply(LinkEvent::RefreshFailed)?;
        if next != RadioStatus::Recovering {
            return Ok(next);
        }

        self.refresh_failures = if was_recovering {
            self.refresh_failures + 1
        } else {
            1
        };
        if self.refresh_failures >= self.max_refresh_failures {
            return self.apply(LinkEvent::RefreshExhausted);
        }
        Ok(next)
    }

    /// Record an applied transmit power
    pub fn set_power(&mut self, watts: f64) {
        self.state.power_watts = Some(watts);
    }

    /// Record an applied channel
    pub fn set_channel(&mut self, channel_index: u32) {
        self.state.channel_index = Some(channel_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_STATUSES: [RadioStatus; 5] = [
        RadioStatus::Offline,
        RadioStatus::Discovering,
        RadioStatus::Ready,
        RadioStatus::Busy,
        RadioStatus::Recovering,
    ];

    #[test]
    fn test_connect_from_discovering() {
        assert_eq!(
            RadioStatus::Discovering.apply(LinkEvent::ConnectSucceeded),
            Ok(RadioStatus::Ready)
        );
        assert_eq!(
            RadioStatus::Discovering.apply(LinkEvent::ConnectFailed),
            Ok(RadioStatus::Offline)
        );
    }

    #[test]
    fn test_offline_connect_failure_is_unchanged() {
        assert_eq!(
            RadioStatus::Offline.apply(LinkEvent::ConnectFailed),
            Ok(RadioStatus::Offline)
        );
    }

    #[test]
    fn test_command_cycle() {
        let busy = RadioStatus::Ready.apply(LinkEvent::CommandStarted).unwrap();
        assert_eq!(busy, RadioStatus::Busy);
        assert_eq!(busy.apply(LinkEvent::CommandFinished), Ok(RadioStatus::Ready));
    }

    #[test]
    fn test_link_loss_from_ready_and_busy() {
        assert_eq!(
            RadioStatus::Ready.apply(LinkEvent::LinkLost),
            Ok(RadioStatus::Recovering)
        );
        assert_eq!(
            RadioStatus::Busy.apply(LinkEvent::LinkLost),
            Ok(RadioStatus::Recovering)
        );
        assert!(RadioStatus::Offline.apply(LinkEvent::LinkLost).is_err());
    }

    #[test]
    fn test_recovering_paths() {
        assert_eq!(
            RadioStatus::Recovering.apply(LinkEvent::RefreshSucceeded),
            Ok(RadioStatus::Ready)
        );
        assert_eq!(
            RadioStatus::Recovering.apply(LinkEvent::RefreshExhausted),
            Ok(RadioStatus::Offline)
        );
    }

    #[test]
    fn test_commands_rejected_unless_ready() {
        for status in ALL_STATUSES {
            let result = status.apply(LinkEvent::CommandStarted);
            if status == RadioStatus::Ready {
                assert_eq!(result, Ok(RadioStatus::Busy));
            } else {
                assert_eq!(
                    result,
                    Err(InvalidTransition {
                        from: status,
                        event: LinkEvent::CommandStarted
                    })
                );
            }
        }
    }

    #[test]
    fn test_teardown_always_offline() {
        for status in ALL_STATUSES {
            assert_eq!(status.apply(LinkEvent::Teardown), Ok(RadioStatus::Offline));
        }
    }

    #[test]
    fn test_cell_escalates_after_threshold() {
        let mut cell = StateCell::new(3);
        cell.apply(LinkEvent::ConnectSucceeded).unwrap();

        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Recovering));
        assert_eq!(cell.refresh_failures(), 1);
        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Recovering));
        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Offline));
        assert_eq!(cell.refresh_failures(), 0);
    }

    #[test]
    fn test_cell_counter_resets_on_recovery() {
        let mut cell = StateCell::new(2);
        cell.apply(LinkEvent::ConnectSucceeded).unwrap();
        cell.apply(LinkEvent::LinkLost).unwrap();

        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Recovering));
        cell.apply(LinkEvent::RefreshSucceeded).unwrap();
        assert_eq!(cell.refresh_failures(), 0);

        cell.apply(LinkEvent::LinkLost).unwrap();
        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Recovering));
        assert_eq!(cell.record_refresh_failure(), Ok(RadioStatus::Offline));
    }

    #[test]
    fn test_cell_rejected_event_keeps_status() {
        let mut cell = StateCell::new(3);
        assert!(cell.apply(LinkEvent::CommandFinished).is_err());
        assert_eq!(cell.status(), RadioStatus::Discovering);
    }

    #[test]
    fn test_cell_keeps_reported_values_across_transitions() {
        let mut cell = StateCell::new(3);
        cell.apply(LinkEvent::ConnectSucceeded).unwrap();
        cell.set_power(2.0);
        cell.set_channel(3);
        cell.apply(LinkEvent::Teardown).unwrap();

        let state = cell.state();
        assert_eq!(state.status, RadioStatus::Offline);
        assert_eq!(state.power_watts, Some(2.0));
        assert_eq!(state.channel_index, Some(3));
    }

    fn link_event() -> impl Strategy<Value = LinkEvent> {
        prop_oneof![
            Just(LinkEvent::ConnectSucceeded),
            Just(LinkEvent::ConnectFailed),
            Just(LinkEvent::RefreshSucceeded),
            Just(LinkEvent::RefreshFailed),
            Just(LinkEvent::RefreshExhausted),
            Just(LinkEvent::CommandStarted),
            Just(LinkEvent::CommandFinished),
            Just(LinkEvent::LinkLost),
            Just(LinkEvent::Teardown),
        ]
    }

    proptest! {
        #[test]
        fn busy_only_entered_from_ready(events in prop::collection::vec(link_event(), 0..64)) {
            let mut status = RadioStatus::Discovering;
            for event in events {
                if let Ok(next) = status.apply(event) {
                    if next == RadioStatus::Busy {
                        prop_assert_eq!(status, RadioStatus::Ready);
                        prop_assert_eq!(event, LinkEvent::CommandStarted);
                    }
                    status = next;
                }
            }
        }

        #[test]
        fn discovering_never_reentered(events in prop::collection::vec(link_event(), 1..64)) {
            let mut status = RadioStatus::Discovering;
            for event in events {
                if let Ok(next) = status.apply(event) {
                    prop_assert_ne!(next, RadioStatus::Discovering);
                    status = next;
                }
            }
        }

        #[test]
        fn cell_never_exceeds_threshold(
            threshold in 1u32..6,
            events in prop::collection::vec(link_event(), 0..64)
        ) {
            let mut cell = StateCell::new(threshold);
            for event in events {
                if event == LinkEvent::RefreshFailed {
                    let _ = cell.record_refresh_failure();
                } else {
                    let _ = cell.apply(event);
                }
                prop_assert!(cell.refresh_failures() < threshold);
            }
        }
    }
}
