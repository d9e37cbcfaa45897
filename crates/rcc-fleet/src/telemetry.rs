//! Fleet telemetry
//!
//! State changes are published as [`FleetEvent`]s. The [`TelemetryHub`]
//! numbers them, keeps a short per-radio history for resuming subscribers,
//! and fans them out over a broadcast channel. Publishing never fails: with
//! no subscribers the event is simply buffered.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rcc_adapter::{RadioId, RadioState, ResultCode};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::config::TelemetryConfig;

/// Event emitted by the fleet
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Startup finished; every radio has had its first connect attempt
    Ready {
        container_id: String,
        radios: Vec<RadioId>,
    },

    /// A radio's status or settings changed
    State { radio_id: RadioId, state: RadioState },

    // -------------------------------------------------------------------------
    // Command outcomes
    // -------------------------------------------------------------------------
    ChannelChanged {
        radio_id: RadioId,
        channel_index: u32,
        frequency_mhz: f64,
    },

    PowerChanged { radio_id: RadioId, power_watts: f64 },

    /// A command failed; settings are unchanged
    Fault {
        radio_id: RadioId,
        code: ResultCode,
        message: String,
    },

    /// Liveness tick
    Heartbeat,
}

impl FleetEvent {
    /// Event name as seen by subscribers
    pub fn tag(&self) -> &'static str {
        match self {
            FleetEvent::Ready { .. } => "radio.ready",
            FleetEvent::State { .. } => "radio.state",
            FleetEvent::ChannelChanged { .. } => "radio.channel.changed",
            FleetEvent::PowerChanged { .. } => "radio.power.changed",
            FleetEvent::Fault { .. } => "radio.fault",
            FleetEvent::Heartbeat => "heartbeat",
        }
    }

    /// Radio the event is about, if any
    pub fn radio_id(&self) -> Option<&RadioId> {
        match self {
            FleetEvent::State { radio_id, .. }
            | FleetEvent::ChannelChanged { radio_id, .. }
            | FleetEvent::PowerChanged { radio_id, .. }
            | FleetEvent::Fault { radio_id, .. } => Some(radio_id),
            FleetEvent::Ready { .. } | FleetEvent::Heartbeat => None,
        }
    }

    /// Structured payload
    pub fn payload(&self) -> Value {
        match self {
            FleetEvent::Ready {
                container_id,
                radios,
            } => json!({"container_id": container_id, "radios": radios}),
            FleetEvent::State { radio_id, state } => json!({
                "radio_id": radio_id,
                "status": state.status,
                "channel_index": state.channel_index,
                "power_watts": state.power_watts,
            }),
            FleetEvent::ChannelChanged {
                radio_id,
                channel_index,
                frequency_mhz,
            } => json!({
                "radio_id": radio_id,
                "channel_index": channel_index,
                "frequency_mhz": frequency_mhz,
            }),
            FleetEvent::PowerChanged {
                radio_id,
                power_watts,
            } => json!({"radio_id": radio_id, "power_watts": power_watts}),
            FleetEvent::Fault {
                radio_id,
                code,
                message,
            } => json!({"radio_id": radio_id, "code": code, "message": message}),
            FleetEvent::Heartbeat => json!({}),
        }
    }
}

/// A published event with its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Monotonic across the whole hub, starting at 1
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub event: FleetEvent,
}

impl TelemetryRecord {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp.to_rfc3339(),
            "event": self.event.tag(),
            "data": self.event.payload(),
        })
    }
}

/// Destination for fleet events
pub trait TelemetryPublisher: Send + Sync {
    fn publish(&self, event: FleetEvent);
}

/// Numbering, buffering and fan-out of fleet events
#[derive(Debug)]
pub struct TelemetryHub {
    next_id: AtomicU64,
    buffers: Mutex<HashMap<RadioId, VecDeque<TelemetryRecord>>>,
    tx: broadcast::Sender<TelemetryRecord>,
    buffer_size: usize,
    retention: Duration,
    shutdown: watch::Sender<bool>,
}

impl TelemetryHub {
    pub fn new(buffer_size: usize, retention: Duration, channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            tx,
            buffer_size: buffer_size.max(1),
            retention,
            shutdown,
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            config.buffer_size,
            Duration::from_secs(config.retention_secs),
            config.channel_capacity,
        )
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.tx.subscribe()
    }

    /// Buffered events for `radio_id` newer than `last_event_id`
    pub fn replay_since(&self, radio_id: &RadioId, last_event_id: u64) -> Vec<TelemetryRecord> {
        let mut buffers = self.buffers.lock();
        let Some(buffer) = buffers.get_mut(radio_id) else {
            return Vec::new();
        };
        self.prune(buffer, Utc::now());
        buffer
            .iter()
            .filter(|record| record.id > last_event_id)
            .cloned()
            .collect()
    }

    /// Id the next event will get
    pub fn next_event_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Publish `heartbeat` every `every` until [`shutdown`](Self::shutdown)
    pub fn spawn_heartbeat(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut stop = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => hub.publish(FleetEvent::Heartbeat),
                    _ = stop.wait_for(|stopped| *stopped) => break,
                }
            }
            debug!("Heartbeat stopped");
        })
    }

    /// Stop background tasks started by the hub
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    fn prune(&self, buffer: &mut VecDeque<TelemetryRecord>, now: DateTime<Utc>) {
        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }
        while let Some(oldest) = buffer.front() {
            let age = (now - oldest.timestamp).to_std().unwrap_or(Duration::ZERO);
            if age <= self.retention {
                break;
            }
            buffer.pop_front();
        }
    }
}

impl TelemetryPublisher for TelemetryHub {
    fn publish(&self, event: FleetEvent) {
        // Ids are assigned under the lock so subscribers see them in order
        let mut buffers = self.buffers.lock();
        let record = TelemetryRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            event,
        };

        if let Some(radio_id) = record.event.radio_id() {
            let buffer = buffers.entry(radio_id.clone()).or_default();
            buffer.push_back(record.clone());
            self.prune(buffer, record.timestamp);
        }

        // No receivers is fine
        let _ = self.tx.send(record);
    }
}
