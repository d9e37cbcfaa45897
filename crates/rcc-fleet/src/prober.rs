//! Background recovery probing
//!
//! Every radio is refreshed on a cadence that depends on its status:
//!
//! | Status                | First probe after | Growth  | Cap   |
//! |-----------------------|-------------------|---------|-------|
//! | Ready                 | 30 s              | fixed   |       |
//! | Recovering            | 5 s               | x1.5    | 15 s  |
//! | Offline, Discovering  | 10 s              | x2.0    | 300 s |
//! | Busy                  | not probed        |         |       |
//!
//! (defaults, see [`RecoveryConfig`]). The delay grows while a radio stays in
//! the same status and starts over when the status changes. Refreshes go
//! through [`Orchestrator::refresh`], so they are serialized with commands
//! and audited.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use rcc_adapter::{RadioId, RadioStatus};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::RecoveryConfig;
use crate::orchestrator::Orchestrator;

/// Growing delay with an upper bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Backoff {
    /// Delay following `previous`, or the initial delay
    pub fn next(&self, previous: Option<Duration>) -> Duration {
        match previous {
            None => self.initial.min(self.max),
            Some(previous) => {
                let grown = previous.as_secs_f64() * self.factor.max(1.0);
                Duration::try_from_secs_f64(grown)
                    .unwrap_or(self.max)
                    .min(self.max)
            }
        }
    }
}

/// Probe cadence per status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSchedule {
    pub normal: Duration,
    pub recovering: Backoff,
    pub offline: Backoff,
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

impl ProbeSchedule {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            normal: Duration::from_millis(config.normal_interval_ms),
            recovering: Backoff {
                initial: Duration::from_millis(config.recovering_initial_ms),
                factor: config.recovering_backoff,
                max: Duration::from_millis(config.recovering_max_ms),
            },
            offline: Backoff {
                initial: Duration::from_millis(config.offline_initial_ms),
                factor: config.offline_backoff,
                max: Duration::from_millis(config.offline_max_ms),
            },
        }
    }

    /// Delay before the next probe of a radio in `status`
    ///
    /// `previous` is the last delay used while the radio stayed in the same
    /// status. `None` means the radio is not probed at all.
    pub fn delay(&self, status: RadioStatus, previous: Option<Duration>) -> Option<Duration> {
        match status {
            RadioStatus::Busy => None,
            RadioStatus::Ready => Some(self.normal),
            RadioStatus::Recovering => Some(self.recovering.next(previous)),
            RadioStatus::Offline | RadioStatus::Discovering => Some(self.offline.next(previous)),
        }
    }
}

#[derive(Debug)]
struct Track {
    status: RadioStatus,
    delay: Option<Duration>,
    due: Instant,
}

impl Track {
    fn start(schedule: &ProbeSchedule, status: RadioStatus, now: Instant) -> Self {
        let delay = schedule.delay(status, None);
        Self {
            status,
            delay,
            due: now + delay.unwrap_or(Duration::ZERO),
        }
    }

    fn advance(&mut self, schedule: &ProbeSchedule, now: Instant) {
        self.delay = schedule.delay(self.status, self.delay);
        self.due = now + self.delay.unwrap_or(Duration::ZERO);
    }
}

/// Periodic refresher for the whole fleet
#[derive(Debug)]
pub struct Prober {
    orchestrator: Orchestrator,
    schedule: ProbeSchedule,
    tick: Duration,
    tracks: HashMap<RadioId, Track>,
}

impl Prober {
    pub fn new(orchestrator: Orchestrator, schedule: ProbeSchedule) -> Self {
        Self {
            orchestrator,
            schedule,
            tick: Duration::from_secs(1),
            tracks: HashMap::new(),
        }
    }

    /// How often due radios are looked for
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Probe until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Recovery prober started");
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let due = tokio::select! {
                _ = ticker.tick() => true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };
            if due {
                self.round(Instant::now()).await;
            }
        }
        info!("Recovery prober stopped");
    }

    /// Refresh every radio that is due; returns the ids probed
    pub async fn round(&mut self, now: Instant) -> Vec<RadioId> {
        let registry = self.orchestrator.registry().clone();
        let mut due = Vec::new();

        for descriptor in registry.list_radios() {
            let status = descriptor.state.status;
            let track = self
                .tracks
                .entry(descriptor.id.clone())
                .or_insert_with(|| Track::start(&self.schedule, status, now));

            if track.status != status {
                *track = Track::start(&self.schedule, status, now);
            }
            if track.delay.is_some() && now >= track.due {
                due.push(descriptor.id);
            }
        }

        let orchestrator = &self.orchestrator;
        let shared = registry.as_ref();
        let results = join_all(due.iter().map(|id| async move {
            let before = shared.get_state(id).map(|s| s.status);
            let result = orchestrator.refresh(id).await;
            (id, before, result)
        }))
        .await;

        let after_round = Instant::now();
        for (id, before, result) in results {
            let after = registry.get_state(id).map(|s| s.status);
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            match after {
                Some(status) if Some(status) != before || status != track.status => {
                    debug!("Radio {} now {} after probe", id, status);
                    *track = Track::start(&self.schedule, status, after_round);
                }
                _ => {
                    track.advance(&self.schedule, after_round);
                    debug!(
                        "Radio {} probe: {} (next in {:?})",
                        id, result.code, track.delay
                    );
                }
            }
        }

        due
    }
}
