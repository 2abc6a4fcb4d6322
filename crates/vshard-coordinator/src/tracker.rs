//! Part timeout tracker.
//!
//! Keeps every dispatched unit in a registry and counts ticks while it is
//! outstanding. Durations of completed units feed a ring buffer whose mean is
//! the service-time estimate; a unit that stays outstanding for
//! `estimate * multiplier` ticks is reported once as a timeout failure.
//!
//! [`PartTracker`] is the state machine; [`TrackerHandle`] runs it on its own
//! task and drives the tick.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vshard_models::{EncodeAttributes, FailureKind, JobId, UnitId, WorkUnitFailure, WorkerReply};

use crate::config::TrackerConfig;
use crate::metrics;

/// One outstanding unit.
#[derive(Debug, Clone)]
pub struct TrackedUnit {
    pub attributes: EncodeAttributes,
    pub elapsed_ticks: u64,
    pub timed_out: bool,
}

/// Registry of outstanding units and the adaptive service-time estimate.
#[derive(Debug)]
pub struct PartTracker {
    entries: HashMap<UnitId, TrackedUnit>,
    history: VecDeque<u64>,
    capacity: usize,
    average: f64,
    multiplier: f64,
}

impl PartTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            entries: HashMap::new(),
            history: VecDeque::with_capacity(config.history_capacity),
            capacity: config.history_capacity.max(1),
            average: config.default_service_time,
            multiplier: config.timeout_multiplier,
        }
    }

    /// Start tracking a unit. Re-registering restarts its clock.
    pub fn register(&mut self, unit_id: UnitId, attributes: EncodeAttributes) {
        self.entries.insert(
            unit_id,
            TrackedUnit {
                attributes,
                elapsed_ticks: 0,
                timed_out: false,
            },
        );
    }

    /// Zero a unit's clock. Returns false for unknown units.
    pub fn reset(&mut self, unit_id: &UnitId) -> bool {
        match self.entries.get_mut(unit_id) {
            Some(entry) => {
                entry.elapsed_ticks = 0;
                entry.timed_out = false;
                true
            }
            None => false,
        }
    }

    /// Stop tracking a completed unit and fold its duration into the estimate.
    pub fn untrack(&mut self, unit_id: &UnitId) -> Option<u64> {
        let entry = self.entries.remove(unit_id)?;
        self.record_duration(entry.elapsed_ticks);
        Some(entry.elapsed_ticks)
    }

    /// Forget every unit of a job without touching the history.
    pub fn drop_job(&mut self, job_id: &JobId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|unit_id, _| unit_id.job_id().map_or(true, |owner| &owner != job_id));
        before - self.entries.len()
    }

    /// Push a completed duration into the ring and recompute the mean.
    ///
    /// An empty ring or a zero sum keeps the current estimate.
    pub fn record_duration(&mut self, ticks: u64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(ticks);

        let sum: u64 = self.history.iter().sum();
        if !self.history.is_empty() && sum > 0 {
            self.average = sum as f64 / self.history.len() as f64;
        }
    }

    /// Advance every clock by one tick and collect units that just timed out.
    pub fn tick(&mut self) -> Vec<WorkUnitFailure> {
        let deadline = self.deadline();
        let mut failures = Vec::new();

        for (unit_id, entry) in self.entries.iter_mut() {
            entry.elapsed_ticks += 1;
            if !entry.timed_out && entry.elapsed_ticks as f64 >= deadline {
                entry.timed_out = true;
                failures.push(WorkUnitFailure::new(
                    FailureKind::Timeout,
                    format!("Part timed out: {}", entry.elapsed_ticks),
                    unit_id.clone(),
                    entry.attributes.clone(),
                ));
            }
        }

        failures
    }

    /// Current service-time estimate in ticks.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Ticks after which a unit times out.
    pub fn deadline(&self) -> f64 {
        self.average * self.multiplier
    }

    pub fn get(&self, unit_id: &UnitId) -> Option<&TrackedUnit> {
        self.entries.get(unit_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracker inbox.
#[derive(Debug)]
enum TrackerMessage {
    Register {
        unit_id: UnitId,
        attributes: EncodeAttributes,
    },
    Untrack {
        unit_id: UnitId,
    },
    Reset {
        unit_id: UnitId,
    },
    DropJob {
        job_id: JobId,
    },
    Tick,
}

/// Address of a running tracker task.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tx: mpsc::UnboundedSender<TrackerMessage>,
    average: watch::Receiver<f64>,
    tracked: watch::Receiver<usize>,
}

impl TrackerHandle {
    /// Start the tracker. Timeout failures are delivered on `failures`.
    pub fn spawn(config: TrackerConfig, failures: mpsc::UnboundedSender<WorkerReply>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = PartTracker::new(&config);
        let (average_tx, average) = watch::channel(tracker.average());
        let (tracked_tx, tracked) = watch::channel(0);

        let task = TrackerTask {
            tracker,
            rx,
            inbox: tx.downgrade(),
            tick_interval: config.tick_interval,
            ticker: None,
            failures,
            average_tx,
            tracked_tx,
        };
        tokio::spawn(task.run());

        Self {
            tx,
            average,
            tracked,
        }
    }

    pub fn register(&self, unit_id: UnitId, attributes: EncodeAttributes) {
        self.send(TrackerMessage::Register {
            unit_id,
            attributes,
        });
    }

    pub fn untrack(&self, unit_id: UnitId) {
        self.send(TrackerMessage::Untrack { unit_id });
    }

    pub fn reset(&self, unit_id: UnitId) {
        self.send(TrackerMessage::Reset { unit_id });
    }

    pub fn drop_job(&self, job_id: JobId) {
        self.send(TrackerMessage::DropJob { job_id });
    }

    /// Last published service-time estimate.
    pub fn average(&self) -> f64 {
        *self.average.borrow()
    }

    /// Number of units registered as of the last processed message.
    pub fn tracked(&self) -> usize {
        *self.tracked.borrow()
    }

    /// Watch the service-time estimate.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.average.clone()
    }

    fn send(&self, msg: TrackerMessage) {
        if self.tx.send(msg).is_err() {
            warn!("Tracker task is gone, dropping message");
        }
    }
}

struct TrackerTask {
    tracker: PartTracker,
    rx: mpsc::UnboundedReceiver<TrackerMessage>,
    inbox: mpsc::WeakUnboundedSender<TrackerMessage>,
    tick_interval: Duration,
    ticker: Option<JoinHandle<()>>,
    failures: mpsc::UnboundedSender<WorkerReply>,
    average_tx: watch::Sender<f64>,
    tracked_tx: watch::Sender<usize>,
}

impl TrackerTask {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg);
            let len = self.tracker.len();
            self.tracked_tx.send_if_modified(|tracked| {
                let changed = *tracked != len;
                *tracked = len;
                changed
            });
        }
        self.stop_ticker();
        debug!("Tracker stopped");
    }

    fn handle(&mut self, msg: TrackerMessage) {
        match msg {
            TrackerMessage::Register {
                unit_id,
                attributes,
            } => {
                debug!(unit_id = %unit_id, "Tracking unit");
                self.tracker.register(unit_id, attributes);
                self.start_ticker();
            }
            TrackerMessage::Untrack { unit_id } => {
                match self.tracker.untrack(&unit_id) {
                    Some(ticks) => {
                        debug!(unit_id = %unit_id, ticks, "Unit finished");
                        self.publish_average();
                    }
                    None => debug!(unit_id = %unit_id, "Untrack for unknown unit"),
                }
                self.stop_ticker_if_idle();
            }
            TrackerMessage::Reset { unit_id } => {
                if !self.tracker.reset(&unit_id) {
                    warn!(unit_id = %unit_id, "Reset for unknown unit");
                }
            }
            TrackerMessage::DropJob { job_id } => {
                let dropped = self.tracker.drop_job(&job_id);
                debug!(job_id = %job_id, dropped, "Dropped job units");
                self.stop_ticker_if_idle();
            }
            TrackerMessage::Tick => {
                for failure in self.tracker.tick() {
                    info!(
                        unit_id = %failure.unit_id,
                        deadline = self.tracker.deadline(),
                        "{}", failure.reason
                    );
                    if self.failures.send(WorkerReply::Failure(failure)).is_err() {
                        warn!("Failure sink closed, dropping timeout");
                    }
                }
                self.stop_ticker_if_idle();
            }
        }
    }

    fn publish_average(&self) {
        let average = self.tracker.average();
        self.average_tx.send_replace(average);
        metrics::set_service_time(average);
    }

    fn start_ticker(&mut self) {
        if self.ticker.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let inbox = self.inbox.clone();
        let period = self.tick_interval;
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = inbox.upgrade() else { break };
                if tx.send(TrackerMessage::Tick).is_err() {
                    break;
                }
            }
        }));
        debug!(period_ms = period.as_millis() as u64, "Tracker tick started");
    }

    fn stop_ticker_if_idle(&mut self) {
        if self.tracker.is_empty() {
            self.stop_ticker();
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            debug!("Tracker tick stopped");
        }
    }
}
