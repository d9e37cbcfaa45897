//! Fault injection and observation for simulated radios
//!
//! A [`SimControl`] is shared between a [`SimLink`](crate::SimLink) and the
//! test or bench that drives it. Tests flip reachability, add latency, queue
//! vendor rejections or panics, and read back the ordered call log.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Operation the link was asked to perform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimOp {
    Open,
    Power { watts: f64 },
    Channel { index: u32, frequency_mhz: f64 },
    Probe,
    Close,
}

impl SimOp {
    /// Whether this operation changes radio settings
    pub fn is_command(&self) -> bool {
        matches!(self, SimOp::Power { .. } | SimOp::Channel { .. })
    }
}

impl fmt::Display for SimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimOp::Open => write!(f, "open"),
            SimOp::Power { watts } => write!(f, "power {} W", watts),
            SimOp::Channel {
                index,
                frequency_mhz,
            } => write!(f, "channel {} ({} MHz)", index, frequency_mhz),
            SimOp::Probe => write!(f, "probe"),
            SimOp::Close => write!(f, "close"),
        }
    }
}

/// Whether a log entry marks the start or the end of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Start,
    End,
}

/// One entry in the call log
#[derive(Debug, Clone, PartialEq)]
pub struct SimCall {
    /// Position in the log, starting at 1
    pub seq: u64,
    pub op: SimOp,
    pub phase: CallPhase,
    pub at: Instant,
}

/// Settings the simulated radio has actually applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AppliedSettings {
    pub power_watts: Option<f64>,
    pub channel_index: Option<u32>,
    pub frequency_mhz: Option<f64>,
}

/// Shared handle controlling one simulated radio
#[derive(Debug)]
pub struct SimControl {
    reachable: AtomicBool,
    hang: AtomicBool,
    panic_next: AtomicBool,
    latency: Mutex<Duration>,
    rejections: Mutex<VecDeque<String>>,
    applied: Mutex<AppliedSettings>,
    log: Mutex<Vec<SimCall>>,
    next_seq: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for SimControl {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            rejections: Mutex::new(VecDeque::new()),
            applied: Mutex::new(AppliedSettings::default()),
            log: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl SimControl {
    /// Create a reachable radio with no latency
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a reachable radio answering after `latency`
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        let control = Self::default();
        *control.latency.lock() = latency;
        Arc::new(control)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    /// Make every call stall forever (until cleared)
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn is_hung(&self) -> bool {
        self.hang.load(Ordering::SeqCst)
    }

    /// Reject the next command with a vendor token
    pub fn reject_next(&self, token: impl Into<String>) {
        self.rejections.lock().push_back(token.into());
    }

    /// Panic inside the next call, simulating a driver bug
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_panic(&self) -> bool {
        self.panic_next.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_rejection(&self) -> Option<String> {
        self.rejections.lock().pop_front()
    }

    pub(crate) fn record_applied(&self, op: SimOp) {
        let mut applied = self.applied.lock();
        match op {
            SimOp::Power { watts } => applied.power_watts = Some(watts),
            SimOp::Channel {
                index,
                frequency_mhz,
            } => {
                applied.channel_index = Some(index);
                applied.frequency_mhz = Some(frequency_mhz);
            }
            _ => {}
        }
    }

    /// Settings the radio has accepted so far
    pub fn applied(&self) -> AppliedSettings {
        *self.applied.lock()
    }

    /// Snapshot of the call log, in order
    pub fn calls(&self) -> Vec<SimCall> {
        self.log.lock().clone()
    }

    /// Started power and channel commands, in order
    pub fn commands(&self) -> Vec<SimOp> {
        self.log
            .lock()
            .iter()
            .filter(|call| call.phase == CallPhase::Start && call.op.is_command())
            .map(|call| call.op)
            .collect()
    }

    /// Highest number of calls ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Whether any two logged calls overlapped in time
    pub fn saw_overlap(&self) -> bool {
        let mut open = 0usize;
        for call in self.log.lock().iter() {
            match call.phase {
                CallPhase::Start => {
                    open += 1;
                    if open > 1 {
                        return true;
                    }
                }
                CallPhase::End => open = open.saturating_sub(1),
            }
        }
        false
    }

    fn push(&self, op: SimOp, phase: CallPhase) {
        // Sequence and append under one lock so the log order is the seq order
        let mut log = self.log.lock();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        log.push(SimCall {
            seq,
            op,
            phase,
            at: Instant::now(),
        });
    }

    /// Log the start of a call; the returned guard logs its end
    pub(crate) fn enter(self: &Arc<Self>, op: SimOp) -> CallGuard {
        self.push(op, CallPhase::Start);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        CallGuard {
            control: Arc::clone(self),
            op,
        }
    }
}

/// Marks a call as in flight until dropped
pub(crate) struct CallGuard {
    control: Arc<SimControl>,
    op: SimOp,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.control.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.control.push(self.op, CallPhase::End);
    }
}
