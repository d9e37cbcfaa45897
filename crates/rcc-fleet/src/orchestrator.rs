//! Command orchestration
//!
//! The [`Orchestrator`] is the only way an intent reaches a radio. Each
//! dispatch follows the same shape:
//!
//! 1. Check the caller may control radios (denials are audited)
//! 2. Resolve the radio's adapter handle from the registry
//! 3. Take the radio's command lock according to the [`BusyPolicy`]
//! 4. Re-validate the request against the adapter's capabilities
//! 5. Run the adapter call in its own task, catching panics
//! 6. Commit the adapter's state to the registry and publish telemetry
//! 7. Write exactly one audit record
//!
//! Steps 5 to 7 run in a spawned task that owns the lock guard, so a caller
//! that gives up waiting cannot cut a dispatch short: the state commit and
//! the audit record still happen, and the next command on the radio only
//! starts after them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use rcc_adapter::{
    AdapterResult, CapabilityInfo, CommandResult, RadioAdapter, RadioId, RadioState, ResultCode,
};
use serde_json::{json, Value};
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::audit::{AuditRecord, AuditSink, CorrelationId};
use crate::auth::{AccessLevel, AuthDecision};
use crate::config::BusyPolicy;
use crate::registry::{AdapterHandle, RadioDescriptor, RadioRegistry};
use crate::telemetry::{FleetEvent, TelemetryPublisher};

/// Audit actor for startup connects
pub const ACTOR_SYSTEM: &str = "system";
/// Audit actor for background refreshes
pub const ACTOR_PROBER: &str = "system:prober";

/// How long shutdown waits for an in-flight command before tearing down anyway
const SHUTDOWN_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Operation performed on a radio under its command lock
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Connect,
    Refresh,
    SetPower { watts: f64 },
    SetChannel { channel_index: u32, frequency_mhz: f64 },
}

impl Command {
    fn action(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::Refresh => "refresh",
            Command::SetPower { .. } => "setPower",
            Command::SetChannel { .. } => "setChannel",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            Command::Connect | Command::Refresh => json!({}),
            Command::SetPower { watts } => json!({"watts": watts}),
            Command::SetChannel {
                channel_index,
                frequency_mhz,
            } => json!({"channel_index": channel_index, "frequency_mhz": frequency_mhz}),
        }
    }

    /// Whether the command changes a radio setting
    fn is_setting(&self) -> bool {
        matches!(self, Command::SetPower { .. } | Command::SetChannel { .. })
    }

    fn validate(&self, capabilities: &CapabilityInfo) -> Result<(), CommandResult> {
        match *self {
            Command::SetPower { watts } => {
                let range = capabilities.power_range_watts();
                if range.contains(watts) {
                    Ok(())
                } else {
                    Err(CommandResult::invalid_range(format!(
                        "power {} W outside {}",
                        watts, range
                    )))
                }
            }
            Command::SetChannel {
                channel_index,
                frequency_mhz,
            } => {
                if channel_index == 0 {
                    Err(CommandResult::invalid_range("channel indices start at 1"))
                } else if !capabilities.supports_frequency(frequency_mhz) {
                    Err(CommandResult::invalid_range(format!(
                        "frequency {} MHz not supported",
                        frequency_mhz
                    )))
                } else {
                    Ok(())
                }
            }
            Command::Connect | Command::Refresh => Ok(()),
        }
    }

    async fn run(&self, adapter: &dyn RadioAdapter) -> AdapterResult {
        match *self {
            Command::Connect => adapter.connect().await,
            Command::Refresh => adapter.refresh_state().await,
            Command::SetPower { watts } => adapter.set_power(watts).await,
            Command::SetChannel {
                channel_index,
                frequency_mhz,
            } => adapter.set_channel(channel_index, frequency_mhz).await,
        }
    }

    fn success_message(&self, radio_id: &RadioId) -> String {
        match self {
            Command::Connect => format!("radio {} connected", radio_id),
            Command::Refresh => format!("radio {} refreshed", radio_id),
            Command::SetPower { watts } => format!("radio {} power set to {} W", radio_id, watts),
            Command::SetChannel {
                channel_index,
                frequency_mhz,
            } => format!(
                "radio {} tuned to channel {} ({} MHz)",
                radio_id, channel_index, frequency_mhz
            ),
        }
    }
}

/// One command on its way to a radio
struct Dispatch {
    actor: String,
    correlation_id: CorrelationId,
    radio_id: RadioId,
    command: Command,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn acquire(
    handle: &AdapterHandle,
    policy: BusyPolicy,
) -> Option<OwnedMutexGuard<()>> {
    let lock = handle.command_lock();
    match policy {
        BusyPolicy::FailFast => lock.try_lock_owned().ok(),
        BusyPolicy::Wait(wait) => timeout(wait, lock.lock_owned()).await.ok(),
    }
}

/// Entry point for every radio command
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<RadioRegistry>,
    audit: Arc<dyn AuditSink>,
    telemetry: Arc<dyn TelemetryPublisher>,
    busy_policy: BusyPolicy,
    container_id: Arc<str>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RadioRegistry>,
        audit: Arc<dyn AuditSink>,
        telemetry: Arc<dyn TelemetryPublisher>,
    ) -> Self {
        Self {
            registry,
            audit,
            telemetry,
            busy_policy: BusyPolicy::default(),
            container_id: Arc::from("rcc"),
        }
    }

    /// Set what happens when a radio's command lock is held
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Set the name reported in `radio.ready`
    pub fn with_container_id(mut self, container_id: impl AsRef<str>) -> Self {
        self.container_id = Arc::from(container_id.as_ref());
        self
    }

    pub fn registry(&self) -> &Arc<RadioRegistry> {
        &self.registry
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Make `radio_id` the active radio
    pub async fn select_radio(
        &self,
        caller: &AuthDecision,
        correlation_id: CorrelationId,
        radio_id: &RadioId,
    ) -> CommandResult {
        let result = if !caller.permits(AccessLevel::Control) {
            Self::denied(caller)
        } else if self.registry.set_active_radio(radio_id) {
            CommandResult::ok(format!("radio {} selected", radio_id))
        } else {
            CommandResult::unavailable(format!("radio {} not found", radio_id))
        };

        self.audit.record(AuditRecord::new(
            caller.subject.clone(),
            "selectRadio",
            radio_id.clone(),
            json!({}),
            &result,
            correlation_id,
        ));
        result
    }

    /// Set transmit power in watts
    pub async fn set_power(
        &self,
        caller: &AuthDecision,
        correlation_id: CorrelationId,
        radio_id: &RadioId,
        watts: f64,
    ) -> CommandResult {
        self.command(caller, correlation_id, radio_id, Command::SetPower { watts })
            .await
    }

    /// Tune to a channel given by index and frequency
    pub async fn set_channel(
        &self,
        caller: &AuthDecision,
        correlation_id: CorrelationId,
        radio_id: &RadioId,
        channel_index: u32,
        frequency_mhz: f64,
    ) -> CommandResult {
        let command = Command::SetChannel {
            channel_index,
            frequency_mhz,
        };
        self.command(caller, correlation_id, radio_id, command).await
    }

    /// Tune to the `channel_index`-th supported frequency (1-based)
    pub async fn set_channel_by_index(
        &self,
        caller: &AuthDecision,
        correlation_id: CorrelationId,
        radio_id: &RadioId,
        channel_index: u32,
    ) -> CommandResult {
        let frequency = self
            .registry
            .get_adapter(radio_id)
            .ok()
            .map(|handle| handle.adapter().capabilities().channel_frequency(channel_index));

        match frequency {
            Some(Some(frequency_mhz)) => {
                self.set_channel(caller, correlation_id, radio_id, channel_index, frequency_mhz)
                    .await
            }
            // Unknown radio: the regular path reports it
            None => {
                self.set_channel(caller, correlation_id, radio_id, channel_index, f64::NAN)
                    .await
            }
            Some(None) => {
                let result = if caller.permits(AccessLevel::Control) {
                    CommandResult::invalid_range(format!(
                        "channel {} not in the channel plan of radio {}",
                        channel_index, radio_id
                    ))
                } else {
                    Self::denied(caller)
                };
                let dispatch = Dispatch {
                    actor: caller.subject.clone(),
                    correlation_id,
                    radio_id: radio_id.clone(),
                    command: Command::SetChannel {
                        channel_index,
                        frequency_mhz: f64::NAN,
                    },
                };
                self.finish(&dispatch, &result, None);
                result
            }
        }
    }

    /// Re-synchronize one radio; used by the recovery prober
    ///
    /// Never waits for the command lock: a radio that is busy is simply
    /// probed on the next round.
    pub async fn refresh(&self, radio_id: &RadioId) -> CommandResult {
        let dispatch = Dispatch {
            actor: ACTOR_PROBER.to_string(),
            correlation_id: CorrelationId::new(),
            radio_id: radio_id.clone(),
            command: Command::Refresh,
        };
        self.dispatch(dispatch, BusyPolicy::FailFast).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Snapshots of every radio
    pub fn list_radios(&self, caller: &AuthDecision) -> Result<Vec<RadioDescriptor>, CommandResult> {
        if !caller.permits(AccessLevel::Telemetry) {
            return Err(Self::denied(caller));
        }
        Ok(self.registry.list_radios())
    }

    /// Cached state of one radio
    pub fn get_state(
        &self,
        caller: &AuthDecision,
        radio_id: &RadioId,
    ) -> Result<RadioState, CommandResult> {
        if !caller.permits(AccessLevel::Telemetry) {
            return Err(Self::denied(caller));
        }
        self.registry
            .get_state(radio_id)
            .ok_or_else(|| CommandResult::unavailable(format!("radio {} not found", radio_id)))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect every radio, then announce `radio.ready`
    pub async fn start(&self) -> Vec<(RadioId, CommandResult)> {
        let ids = self.registry.ids().to_vec();
        info!("Starting fleet {} with {} radio(s)", self.container_id, ids.len());

        for id in &ids {
            if let Some(state) = self.registry.get_state(id) {
                self.telemetry.publish(FleetEvent::State {
                    radio_id: id.clone(),
                    state,
                });
            }
        }

        let connects = ids.iter().map(|id| {
            let dispatch = Dispatch {
                actor: ACTOR_SYSTEM.to_string(),
                correlation_id: CorrelationId::new(),
                radio_id: id.clone(),
                command: Command::Connect,
            };
            async move { (id.clone(), self.dispatch(dispatch, BusyPolicy::FailFast).await) }
        });
        let results = join_all(connects).await;

        let ready = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!("Fleet {} ready: {}/{} radio(s) connected", self.container_id, ready, ids.len());
        self.telemetry.publish(FleetEvent::Ready {
            container_id: self.container_id.to_string(),
            radios: ids,
        });
        results
    }

    /// Tear every adapter down
    pub async fn shutdown(&self) {
        for id in self.registry.ids() {
            let Ok(handle) = self.registry.get_adapter(id) else {
                continue;
            };
            let guard = acquire(&handle, BusyPolicy::Wait(SHUTDOWN_LOCK_WAIT)).await;
            if guard.is_none() {
                warn!("Radio {} still busy, tearing down anyway", id);
            }

            handle.adapter().teardown().await;
            self.commit(id, handle.adapter().state());
        }
        info!("Fleet {} shut down", self.container_id);
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    fn denied(caller: &AuthDecision) -> CommandResult {
        CommandResult::unauthorized(format!(
            "{} is not permitted to control radios",
            caller.subject
        ))
    }

    async fn command(
        &self,
        caller: &AuthDecision,
        correlation_id: CorrelationId,
        radio_id: &RadioId,
        command: Command,
    ) -> CommandResult {
        let dispatch = Dispatch {
            actor: caller.subject.clone(),
            correlation_id,
            radio_id: radio_id.clone(),
            command,
        };

        if !caller.permits(AccessLevel::Control) {
            let result = Self::denied(caller);
            self.finish(&dispatch, &result, None);
            return result;
        }

        self.dispatch(dispatch, self.busy_policy).await
    }

    async fn dispatch(&self, dispatch: Dispatch, policy: BusyPolicy) -> CommandResult {
        let handle = match self.registry.get_adapter(&dispatch.radio_id) {
            Ok(handle) => handle,
            Err(e) => {
                let result = CommandResult::unavailable(e.to_string());
                self.finish(&dispatch, &result, None);
                return result;
            }
        };

        let Some(guard) = acquire(&handle, policy).await else {
            let result = CommandResult::busy(format!(
                "radio {} is executing another command",
                dispatch.radio_id
            ));
            self.finish(&dispatch, &result, None);
            return result;
        };

        if let Err(result) = dispatch.command.validate(handle.adapter().capabilities()) {
            self.finish(&dispatch, &result, None);
            return result;
        }

        let this = self.clone();
        let radio_id = dispatch.radio_id.clone();
        let action = dispatch.command.action();
        let task = tokio::spawn(async move { this.run_locked(guard, handle, dispatch).await });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Dispatch of {} on {} aborted: {}", action, radio_id, e);
                CommandResult::internal(format!("{} on {} aborted: {}", action, radio_id, e))
            }
        }
    }

    async fn run_locked(
        self,
        _guard: OwnedMutexGuard<()>,
        handle: AdapterHandle,
        dispatch: Dispatch,
    ) -> CommandResult {
        let adapter = handle.shared_adapter();
        let outcome = AssertUnwindSafe(dispatch.command.run(adapter.as_ref()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(())) => CommandResult::ok(dispatch.command.success_message(&dispatch.radio_id)),
            Ok(Err(e)) => CommandResult::from(e),
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                warn!(
                    "Adapter for {} panicked during {}: {}",
                    dispatch.radio_id,
                    dispatch.command.action(),
                    cause
                );
                CommandResult::internal(format!(
                    "adapter fault during {}: {}",
                    dispatch.command.action(),
                    cause
                ))
            }
        };

        let state = adapter.state();
        let states = self
            .registry
            .commit_state(&dispatch.radio_id, state.clone())
            .ok()
            .map(|previous| (previous, state));
        self.finish(&dispatch, &result, states);
        result
    }

    /// Commit a state outside a dispatch and announce it
    fn commit(&self, radio_id: &RadioId, state: RadioState) {
        if self.registry.commit_state(radio_id, state.clone()).is_ok() {
            self.telemetry.publish(FleetEvent::State {
                radio_id: radio_id.clone(),
                state,
            });
        }
    }

    /// Publish telemetry for a resolved command and audit it
    fn finish(
        &self,
        dispatch: &Dispatch,
        result: &CommandResult,
        states: Option<(RadioState, RadioState)>,
    ) {
        let radio_id = &dispatch.radio_id;
        let command = dispatch.command;

        if let Some((previous, state)) = states {
            if command == Command::Connect || previous.status != state.status {
                self.telemetry.publish(FleetEvent::State {
                    radio_id: radio_id.clone(),
                    state,
                });
            }
        }

        if result.is_ok() {
            match command {
                Command::SetPower { watts } => self.telemetry.publish(FleetEvent::PowerChanged {
                    radio_id: radio_id.clone(),
                    power_watts: watts,
                }),
                Command::SetChannel {
                    channel_index,
                    frequency_mhz,
                } => self.telemetry.publish(FleetEvent::ChannelChanged {
                    radio_id: radio_id.clone(),
                    channel_index,
                    frequency_mhz,
                }),
                Command::Connect | Command::Refresh => {}
            }
        } else if command.is_setting()
            && result.code != ResultCode::Unauthorized
            && self.registry.contains(radio_id)
        {
            self.telemetry.publish(FleetEvent::Fault {
                radio_id: radio_id.clone(),
                code: result.code,
                message: result.message.clone(),
            });
        }

        match result.code {
            ResultCode::Ok => info!(
                "{} {} on {}: {}",
                dispatch.actor,
                command.action(),
                radio_id,
                result.message
            ),
            ResultCode::Unavailable | ResultCode::InternalError => warn!(
                "{} {} on {} failed: {}",
                dispatch.actor, command.action(), radio_id, result
            ),
            _ => debug!(
                "{} {} on {} rejected: {}",
                dispatch.actor, command.action(), radio_id, result
            ),
        }

        self.audit.record(AuditRecord::new(
            dispatch.actor.clone(),
            command.action(),
            radio_id.clone(),
            command.parameters(),
            result,
            dispatch.correlation_id.clone(),
        ));
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("container_id", &self.container_id)
            .field("radios", &self.registry.len())
            .field("busy_policy", &self.busy_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rcc_adapter::PowerRange;

    use super::*;

    fn caps() -> CapabilityInfo {
        CapabilityInfo::new([2412.0, 2437.0], PowerRange::new(0.1, 5.0))
    }

    #[test]
    fn test_validate_power() {
        assert!(Command::SetPower { watts: 5.0 }.validate(&caps()).is_ok());
        let err = Command::SetPower { watts: 7.0 }.validate(&caps()).unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidRange);
        assert!(Command::SetPower { watts: f64::NAN }
            .validate(&caps())
            .is_err());
    }

    #[test]
    fn test_validate_channel() {
        let ok = Command::SetChannel {
            channel_index: 3,
            frequency_mhz: 2437.0,
        };
        assert!(ok.validate(&caps()).is_ok());

        let zero = Command::SetChannel {
            channel_index: 0,
            frequency_mhz: 2437.0,
        };
        assert_eq!(zero.validate(&caps()).unwrap_err().code, ResultCode::InvalidRange);

        let off_plan = Command::SetChannel {
            channel_index: 1,
            frequency_mhz: 2400.0,
        };
        assert!(off_plan.validate(&caps()).is_err());
    }

    #[test]
    fn test_parameters() {
        assert_eq!(
            Command::SetPower { watts: 2.0 }.parameters(),
            json!({"watts": 2.0})
        );
        assert_eq!(Command::Refresh.parameters(), json!({}));
        assert_eq!(
            Command::SetChannel {
                channel_index: 2,
                frequency_mhz: 2437.0
            }
            .action(),
            "setChannel"
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
