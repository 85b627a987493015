//! Scheduler implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::orchestrator::{ChannelOrchestrator, CycleOutcome, CycleReport, OrchestratorError};
use crate::store::{Channel, ChannelFilter, StateStore, StoreError};

use super::config::SchedulerConfig;
use super::types::{ChannelTimerStatus, SchedulerError, SchedulerStatus};

/// Reply slot of a forced check; `None` for fire-and-forget triggers.
type ForceRequest = Option<oneshot::Sender<Result<CycleReport, SchedulerError>>>;

type TimerMap = Arc<Mutex<HashMap<String, ChannelTimer>>>;

type CycleLock = Arc<tokio::sync::Mutex<()>>;

struct ChannelTimer {
    generation: u64,
    interval_tx: watch::Sender<u64>,
    force_tx: mpsc::Sender<ForceRequest>,
    state: Arc<Mutex<ChannelTimerStatus>>,
    task: JoinHandle<()>,
}

/// Drives cycles for all active channels.
pub struct Scheduler {
    config: SchedulerConfig,
    orchestrator: Arc<ChannelOrchestrator>,
    store: Arc<dyn StateStore>,
    workers: Arc<Semaphore>,
    timers: TimerMap,
    /// Held for the duration of a channel's cycle.
    cycle_locks: Mutex<HashMap<String, CycleLock>>,
    generation: AtomicU64,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        orchestrator: Arc<ChannelOrchestrator>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));

        Self {
            config,
            orchestrator,
            store,
            workers,
            timers: Arc::new(Mutex::new(HashMap::new())),
            cycle_locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Arm timers for every active channel in the store.
    pub async fn start(&self) -> Result<usize, StoreError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return Ok(lock(&self.timers).len());
        }

        let channels = match self.store.list_channels(&ChannelFilter::active_only()) {
            Ok(channels) => channels,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let now = Utc::now();
        for channel in &channels {
            let delay = first_fire_delay(channel, now) + self.jitter();
            self.arm(channel, delay);
        }

        info!(
            channels = channels.len(),
            workers = self.config.worker_pool_size,
            "Scheduler started"
        );
        Ok(channels.len())
    }

    /// Stop all timers, letting in-flight cycles finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = lock(&self.timers).drain().map(|(_, t)| t.task).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("Channel timer task failed: {}", e);
                }
            }
        }
        info!("Scheduler stopped");
    }

    /// Arm a timer for a channel. An already scheduled channel only has its
    /// interval updated. Returns false when the scheduler is not running or
    /// the channel is inactive.
    pub fn schedule(&self, channel: &Channel) -> bool {
        if !self.is_running() || !channel.active {
            return false;
        }
        if self.reschedule(&channel.id, channel.poll_interval_secs) {
            return true;
        }

        let delay = first_fire_delay(channel, Utc::now()) + self.jitter();
        self.arm(channel, delay);
        true
    }

    /// Change a channel's interval. The next fire moves to one new interval
    /// after the last completed cycle (or now, if that has passed).
    pub fn reschedule(&self, channel_id: &str, interval_secs: u64) -> bool {
        lock(&self.timers)
            .get(channel_id)
            .map(|timer| timer.interval_tx.send(interval_secs).is_ok())
            .unwrap_or(false)
    }

    /// Stop future cycles for a channel. Idempotent; an in-flight cycle
    /// runs to completion.
    pub fn cancel(&self, channel_id: &str) -> bool {
        match lock(&self.timers).remove(channel_id) {
            Some(timer) => {
                timer.task.abort();
                debug!(channel_id = %channel_id, "Channel timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, channel_id: &str) -> bool {
        lock(&self.timers).contains_key(channel_id)
    }

    /// Ask a channel's timer to run a forced cycle now without waiting for it.
    pub fn trigger_now(&self, channel_id: &str) -> bool {
        lock(&self.timers)
            .get(channel_id)
            .map(|timer| timer.force_tx.try_send(None).is_ok())
            .unwrap_or(false)
    }

    /// Run a forced cycle now and wait for its report.
    ///
    /// A scheduled channel's pending wait is cut short and its timer re-arms
    /// from the completion time. Channels without a timer run directly.
    pub async fn check_now(&self, channel_id: &str) -> Result<CycleReport, SchedulerError> {
        let force_tx = lock(&self.timers)
            .get(channel_id)
            .map(|timer| timer.force_tx.clone());

        match force_tx {
            Some(force_tx) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                force_tx
                    .send(Some(reply_tx))
                    .await
                    .map_err(|_| SchedulerError::Stopped)?;
                reply_rx.await.map_err(|_| SchedulerError::Stopped)?
            }
            None => {
                let _permit = self
                    .workers
                    .acquire()
                    .await
                    .map_err(|_| SchedulerError::Stopped)?;
                let cycle_lock = self.cycle_lock(channel_id);
                let _guard = cycle_lock.lock().await;
                Ok(self.orchestrator.run_cycle(channel_id, true).await?)
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let timers = lock(&self.timers);
        let mut channels: Vec<ChannelTimerStatus> =
            timers.values().map(|t| lock(&t.state).clone()).collect();
        channels.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));

        SchedulerStatus {
            running: self.is_running(),
            worker_pool_size: self.config.worker_pool_size,
            available_workers: self.workers.available_permits(),
            scheduled_channels: channels.len(),
            channels,
        }
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.config.jitter_max_ms))
    }

    fn cycle_lock(&self, channel_id: &str) -> CycleLock {
        lock(&self.cycle_locks)
            .entry(channel_id.to_string())
            .or_default()
            .clone()
    }

    fn arm(&self, channel: &Channel, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let (interval_tx, interval_rx) = watch::channel(channel.poll_interval_secs);
        let (force_tx, force_rx) = mpsc::channel(8);
        let state = Arc::new(Mutex::new(ChannelTimerStatus {
            channel_id: channel.id.clone(),
            interval_secs: channel.poll_interval_secs,
            next_fire_at: Some(Utc::now() + to_chrono(delay)),
            ..Default::default()
        }));

        let task = ChannelTask {
            channel_id: channel.id.clone(),
            generation,
            orchestrator: self.orchestrator.clone(),
            workers: self.workers.clone(),
            cycle_lock: self.cycle_lock(&channel.id),
            timers: self.timers.clone(),
            state: state.clone(),
            shutdown: self.shutdown_tx.subscribe(),
            interval_rx,
            force_rx,
        };
        // Registered before the task can run, so a task that retires at once
        // still finds and removes its own entry.
        let mut timers = lock(&self.timers);
        let handle = tokio::spawn(task.run(Instant::now() + delay, channel.poll_interval_secs));
        let previous = timers.insert(
            channel.id.clone(),
            ChannelTimer {
                generation,
                interval_tx,
                force_tx,
                state,
                task: handle,
            },
        );
        drop(timers);

        debug!(
            channel_id = %channel.id,
            delay_ms = delay.as_millis() as u64,
            interval_secs = channel.poll_interval_secs,
            "Channel timer armed"
        );

        if let Some(previous) = previous {
            previous.task.abort();
        }
    }
}

/// Delay before a channel's first fire: what is left of its interval since
/// the last check, or nothing if that has already passed.
fn first_fire_delay(channel: &Channel, now: DateTime<Utc>) -> Duration {
    match channel.last_check {
        Some(last) => {
            let due = last + chrono::Duration::seconds(channel.poll_interval_secs as i64);
            (due - now).to_std().unwrap_or(Duration::ZERO)
        }
        None => Duration::ZERO,
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_default()
}

/// The timer loop of one channel.
struct ChannelTask {
    channel_id: String,
    generation: u64,
    orchestrator: Arc<ChannelOrchestrator>,
    workers: Arc<Semaphore>,
    cycle_lock: CycleLock,
    timers: TimerMap,
    state: Arc<Mutex<ChannelTimerStatus>>,
    shutdown: broadcast::Receiver<()>,
    interval_rx: watch::Receiver<u64>,
    force_rx: mpsc::Receiver<ForceRequest>,
}

impl ChannelTask {
    /// `armed_secs` is the interval the receiver was created with. Anything
    /// sent after that, even before the first poll, arrives via `changed()`.
    async fn run(mut self, first_fire: Instant, armed_secs: u64) {
        let mut interval = Duration::from_secs(armed_secs);
        let mut next_fire = first_fire;
        let mut last_done: Option<Instant> = None;

        loop {
            let (forced, reply) = tokio::select! {
                _ = self.shutdown.recv() => break,
                request = self.force_rx.recv() => match request {
                    Some(reply) => (true, reply),
                    None => break,
                },
                changed = self.interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    interval = Duration::from_secs(*self.interval_rx.borrow_and_update());
                    let now = Instant::now();
                    next_fire = match last_done {
                        Some(done) => (done + interval).max(now),
                        None => next_fire.min(now + interval),
                    };
                    self.set_next_fire(next_fire, Some(interval));
                    continue;
                }
                _ = sleep_until(next_fire) => (false, None),
            };

            let Some(result) = self.run_cycle(forced).await else {
                break;
            };

            let done = Instant::now();
            last_done = Some(done);

            let mut follow_up = false;
            let mut retire = false;
            match &result {
                Ok(report) => {
                    follow_up = report.follow_up;
                    retire = report.outcome == CycleOutcome::Deactivated;
                }
                Err(SchedulerError::Cycle(
                    OrchestratorError::ChannelInactive(_) | OrchestratorError::ChannelNotFound(_),
                )) => retire = true,
                Err(e) => error!(
                    channel_id = %self.channel_id,
                    error = %e,
                    "Cycle failed, re-arming for the next interval"
                ),
            }

            self.record(&result);
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }

            if retire {
                info!(channel_id = %self.channel_id, "Channel no longer active, timer stopped");
                break;
            }

            next_fire = if follow_up { done } else { done + interval };
            self.set_next_fire(next_fire, None);
        }

        let mut timers = lock(&self.timers);
        if timers
            .get(&self.channel_id)
            .is_some_and(|t| t.generation == self.generation)
        {
            timers.remove(&self.channel_id);
        }
    }

    /// Run one cycle on a worker. `None` means the scheduler shut down while
    /// waiting for a worker.
    async fn run_cycle(&mut self, forced: bool) -> Option<Result<CycleReport, SchedulerError>> {
        let permit = tokio::select! {
            permit = self.workers.clone().acquire_owned() => permit.ok()?,
            _ = self.shutdown.recv() => return None,
        };

        lock(&self.state).running = true;

        let orchestrator = self.orchestrator.clone();
        let cycle_lock = self.cycle_lock.clone();
        let channel_id = self.channel_id.clone();
        let handle = tokio::spawn(async move {
            let _guard = cycle_lock.lock_owned().await;
            let _permit = permit;
            orchestrator.run_cycle(&channel_id, forced).await
        });

        let result = match handle.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(SchedulerError::Cycle(e)),
            Err(e) => Err(SchedulerError::Panicked(e.to_string())),
        };

        lock(&self.state).running = false;
        Some(result)
    }

    fn record(&self, result: &Result<CycleReport, SchedulerError>) {
        let mut state = lock(&self.state);
        state.cycles += 1;
        state.last_run_at = Some(Utc::now());
        match result {
            Ok(report) => {
                state.last_outcome = Some(report.outcome);
                state.last_error = report.error.clone();
            }
            Err(e) => {
                state.last_outcome = None;
                state.last_error = Some(e.to_string());
            }
        }
    }

    fn set_next_fire(&self, next_fire: Instant, interval: Option<Duration>) {
        let wait = next_fire.saturating_duration_since(Instant::now());
        let mut state = lock(&self.state);
        state.next_fire_at = Some(Utc::now() + to_chrono(wait));
        if let Some(interval) = interval {
            state.interval_secs = interval.as_secs();
        }
    }
}
