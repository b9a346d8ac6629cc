//! Countdown timers
//!
//! Local state is authoritative. Every operation applies its change at once,
//! persists it to the durable cache and then syncs to the backend in the
//! background; a failed sync is logged and recorded but never reverted.
//!
//! ## Ticker
//!
//! At most one timer runs at a time. While it runs, a ticker task owned by
//! the store decrements it once per tick interval. The ticker is aborted by
//! `pause`, `stop`, `reset` or `delete` of the running timer and when the
//! store is dropped, and it ends itself once nothing is running.
//!
//! ## Sync ordering
//!
//! Each timer carries a local version that every mutation bumps. A sync
//! response is applied only if the timer's version has not moved since the
//! request was sent. Server ids replace local ids (`local-...`) when a
//! create succeeds; if the timer changed meanwhile an update follows.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::entity_path;
use crate::api::{ApiRequest, Gateway};
use crate::config::TimerConfig;
use crate::error::{Error, Result, StoreError};
use crate::storage::KeyValueCache;
use crate::types::{NewTimer, Timer, TimerPatch, TimerPhase, Validate};

use super::lock;
use super::mutation::{self, Pending, RollbackPolicy, Snapshot};

/// Cache key holding the persisted timers
pub const TIMERS_KEY: &str = "timers";

const EVENT_CAPACITY: usize = 16;

/// Notification emitted by the countdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A running timer reached zero
    Completed { id: String, title: String },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTimers {
    saved_at: DateTime<Utc>,
    timers: Vec<Timer>,
}

/// Wire body for `POST /timers` and `PUT /timers/:id`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimerPayload<'a> {
    title: &'a str,
    duration: u32,
    remaining_time: u32,
    is_running: bool,
    is_paused: bool,
    is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
}

impl<'a> From<&'a Timer> for TimerPayload<'a> {
    fn from(timer: &'a Timer) -> Self {
        Self {
            title: &timer.title,
            duration: timer.duration,
            remaining_time: timer.remaining_time,
            is_running: timer.is_running,
            is_paused: timer.is_paused,
            is_completed: timer.is_completed,
            task_id: timer.task_id.as_deref(),
        }
    }
}

#[derive(Debug)]
enum SyncOp {
    Create(Timer),
    Update(Timer),
    Delete(String),
}

/// A sync operation tagged with the timer version it carries
type PlannedSync = (SyncOp, u64);

/// Result of one local state transition
struct Change {
    timer: Timer,
    ops: Vec<PlannedSync>,
    start_ticker: bool,
}

enum Tick {
    Idle,
    Counted,
    Completed(Timer, Vec<PlannedSync>),
}

// ============================================
// State
// ============================================

#[derive(Default)]
struct TimerState {
    timers: Vec<Timer>,
    active_id: Option<String>,
    versions: HashMap<String, u64>,
    /// Local ids whose create request is in flight
    creating: HashSet<String>,
    ticker: Option<JoinHandle<()>>,
    ticker_generation: u64,
    last_persist: Option<Instant>,
    error: Option<StoreError>,
}

impl Snapshot for TimerState {
    type Saved = Vec<Timer>;

    fn save(&self) -> Vec<Timer> {
        self.timers.clone()
    }

    fn restore(&mut self, saved: Vec<Timer>) {
        self.timers = saved;
    }
}

impl TimerState {
    fn position(&self, id: &str) -> Option<usize> {
        self.timers.iter().position(|t| t.id == id)
    }

    fn require(&self, id: &str) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| Error::not_found("timer", id))
    }

    fn version(&self, id: &str) -> u64 {
        self.versions.get(id).copied().unwrap_or(0)
    }

    /// Stamp a local change on the timer at `i`
    fn touch(&mut self, i: usize) {
        let timer = &mut self.timers[i];
        timer.updated_at = Some(Utc::now());
        *self.versions.entry(timer.id.clone()).or_insert(0) += 1;
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    /// Release the active slot if `id` holds it
    fn deactivate(&mut self, id: &str) {
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
            self.stop_ticker();
        }
    }

    fn plan_sync(&mut self, id: &str) -> Option<PlannedSync> {
        let timer = self.timers[self.position(id)?].clone();
        let version = self.version(id);
        if !timer.is_local() {
            return Some((SyncOp::Update(timer), version));
        }
        // An in-flight create carries this change through its follow-up
        if !self.creating.insert(timer.id.clone()) {
            return None;
        }
        Some((SyncOp::Create(timer), version))
    }

    fn changed(&mut self, i: usize, start_ticker: bool) -> Change {
        self.touch(i);
        let id = self.timers[i].id.clone();
        Change {
            timer: self.timers[i].clone(),
            ops: self.plan_sync(&id).into_iter().collect(),
            start_ticker,
        }
    }

    fn create(&mut self, draft: &NewTimer) -> Result<Change> {
        draft.validate()?;
        let mut timer = Timer::new_local(draft.title.trim(), draft.duration_minutes);
        timer.task_id = draft.task_id.clone();
        self.timers.push(timer);
        Ok(self.changed(self.timers.len() - 1, false))
    }

    fn update(&mut self, id: &str, patch: &TimerPatch) -> Result<Change> {
        let i = self.require(id)?;
        patch.validate()?;

        let timer = &mut self.timers[i];
        if let Some(title) = &patch.title {
            timer.title = title.trim().to_string();
        }
        if let Some(minutes) = patch.duration_minutes {
            timer.duration = minutes;
            match timer.phase() {
                TimerPhase::Idle | TimerPhase::Completed => {
                    timer.remaining_time = timer.duration_secs();
                    timer.is_completed = false;
                }
                TimerPhase::Running | TimerPhase::Paused => {
                    timer.remaining_time = timer.remaining_time.min(timer.duration_secs());
                }
            }
        }
        Ok(self.changed(i, false))
    }

    fn delete(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        self.deactivate(id);
        let timer = self.timers.remove(i);
        self.versions.remove(id);

        // A local timer mid-create is deleted remotely once its id is known
        let ops = if timer.is_local() {
            Vec::new()
        } else {
            vec![(SyncOp::Delete(timer.id.clone()), 0)]
        };
        Ok(Change {
            timer,
            ops,
            start_ticker: false,
        })
    }

    fn start(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        match self.timers[i].phase() {
            TimerPhase::Completed => {
                return Err(Error::validation(format!(
                    "timer {:?} has finished; reset it before starting again",
                    self.timers[i].title
                )))
            }
            TimerPhase::Running => {
                return Ok(Change {
                    timer: self.timers[i].clone(),
                    ops: Vec::new(),
                    start_ticker: self.ticker.is_none(),
                })
            }
            TimerPhase::Idle | TimerPhase::Paused => {}
        }

        let mut ops = Vec::new();
        let others: Vec<String> = self
            .timers
            .iter()
            .filter(|t| t.is_running && t.id != id)
            .map(|t| t.id.clone())
            .collect();
        for other in others {
            if let Some(j) = self.position(&other) {
                self.timers[j].is_running = false;
                self.timers[j].is_paused = true;
                self.touch(j);
                ops.extend(self.plan_sync(&other));
                tracing::debug!(id = %other, "Paused timer to start another");
            }
        }

        self.stop_ticker();
        self.active_id = Some(id.to_string());
        let timer = &mut self.timers[i];
        timer.is_running = true;
        timer.is_paused = false;

        let mut change = self.changed(i, true);
        ops.append(&mut change.ops);
        change.ops = ops;
        Ok(change)
    }

    fn resume(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        if self.timers[i].phase() != TimerPhase::Paused {
            return Err(Error::validation(format!(
                "timer {:?} is not paused",
                self.timers[i].title
            )));
        }
        self.start(id)
    }

    fn pause(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        if self.timers[i].phase() != TimerPhase::Running {
            return Err(Error::validation(format!(
                "timer {:?} is not running",
                self.timers[i].title
            )));
        }
        self.deactivate(id);
        let timer = &mut self.timers[i];
        timer.is_running = false;
        timer.is_paused = true;
        Ok(self.changed(i, false))
    }

    fn stop(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        if !matches!(self.timers[i].phase(), TimerPhase::Running | TimerPhase::Paused) {
            return Err(Error::validation(format!(
                "timer {:?} is not running",
                self.timers[i].title
            )));
        }
        self.deactivate(id);
        let timer = &mut self.timers[i];
        timer.remaining_time = 0;
        timer.is_running = false;
        timer.is_paused = false;
        timer.is_completed = true;
        Ok(self.changed(i, false))
    }

    fn reset(&mut self, id: &str) -> Result<Change> {
        let i = self.require(id)?;
        self.deactivate(id);
        let timer = &mut self.timers[i];
        timer.remaining_time = timer.duration_secs();
        timer.is_running = false;
        timer.is_paused = false;
        timer.is_completed = false;
        Ok(self.changed(i, false))
    }

    fn tick(&mut self) -> Tick {
        let Some(i) = self.active_id.as_deref().and_then(|id| self.position(id)) else {
            self.active_id = None;
            return Tick::Idle;
        };
        if !self.timers[i].is_running {
            self.active_id = None;
            return Tick::Idle;
        }

        let timer = &mut self.timers[i];
        timer.remaining_time = timer.remaining_time.saturating_sub(1);
        if timer.remaining_time > 0 {
            return Tick::Counted;
        }

        timer.is_running = false;
        timer.is_paused = false;
        timer.is_completed = true;
        self.active_id = None;
        let change = self.changed(i, false);
        Tick::Completed(change.timer, change.ops)
    }
}

// ============================================
// Store
// ============================================

struct Inner {
    gateway: Arc<Gateway>,
    cache: Arc<dyn KeyValueCache>,
    config: TimerConfig,
    state: Mutex<TimerState>,
    events: broadcast::Sender<TimerEvent>,
    syncs: Mutex<Vec<JoinHandle<()>>>,
}

pub struct TimerStore {
    inner: Arc<Inner>,
}

impl TimerStore {
    pub fn new(gateway: Arc<Gateway>, cache: Arc<dyn KeyValueCache>, config: TimerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gateway,
                cache,
                config,
                state: Mutex::new(TimerState::default()),
                events,
                syncs: Mutex::new(Vec::new()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        lock(&self.inner.state)
    }

    // ------------------------------------------
    // Reads
    // ------------------------------------------

    pub fn timers(&self) -> Vec<Timer> {
        self.state().timers.clone()
    }

    pub fn get(&self, id: &str) -> Option<Timer> {
        let state = self.state();
        state.position(id).map(|i| state.timers[i].clone())
    }

    /// The running timer, if any
    pub fn active(&self) -> Option<Timer> {
        let state = self.state();
        let id = state.active_id.as_deref()?;
        state.position(id).map(|i| state.timers[i].clone())
    }

    pub fn is_ticking(&self) -> bool {
        self.state()
            .ticker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    /// Completion events for every running timer that reaches zero
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.inner.events.subscribe()
    }

    // ------------------------------------------
    // Mutations
    // ------------------------------------------

    pub fn create(&self, draft: &NewTimer) -> Result<Timer> {
        self.apply("create", &draft.title, |state| state.create(draft))
    }

    pub fn update(&self, id: &str, patch: &TimerPatch) -> Result<Timer> {
        self.apply("update", id, |state| state.update(id, patch))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.apply("delete", id, |state| state.delete(id)).map(|_| ())
    }

    /// Start counting down, pausing whichever other timer was running
    pub fn start(&self, id: &str) -> Result<Timer> {
        self.require_runtime("start", id)?;
        self.apply("start", id, |state| state.start(id))
    }

    pub fn resume(&self, id: &str) -> Result<Timer> {
        self.require_runtime("resume", id)?;
        self.apply("resume", id, |state| state.resume(id))
    }

    pub fn pause(&self, id: &str) -> Result<Timer> {
        self.apply("pause", id, |state| state.pause(id))
    }

    /// Finish early; the timer ends Completed with nothing remaining
    pub fn stop(&self, id: &str) -> Result<Timer> {
        self.apply("stop", id, |state| state.stop(id))
    }

    pub fn reset(&self, id: &str) -> Result<Timer> {
        self.apply("reset", id, |state| state.reset(id))
    }

    /// Advance the running timer by one step. Returns false when nothing is
    /// left running.
    pub fn tick(&self) -> bool {
        self.inner.tick(None)
    }

    fn apply(
        &self,
        verb: &str,
        id: &str,
        change: impl FnOnce(&mut TimerState) -> Result<Change>,
    ) -> Result<Timer> {
        let mut outcome: Result<Change> =
            Err(Error::Unexpected(format!("{} timer was not applied", verb)));
        let pending = mutation::begin(
            &self.inner.state,
            RollbackPolicy::KeepLocal,
            format!("{} timer {}", verb, id),
            |state| outcome = change(state),
        );

        let change = match outcome {
            Ok(change) => change,
            Err(e) => {
                let subject = self.subject(id);
                return Err(self.inner.record(format!("Failed to {} {}", verb, subject), e));
            }
        };

        tracing::debug!(id = %change.timer.id, verb, "Timer changed");
        self.inner.persist(true);
        if change.start_ticker {
            match Handle::try_current() {
                Ok(runtime) => self.inner.spawn_ticker(&runtime),
                Err(_) => tracing::warn!(id = %change.timer.id, "No runtime to drive the countdown"),
            }
        }
        let notice = format!("Failed to sync {}", change.timer.title);
        self.inner.spawn_sync(pending, change.ops, notice);
        Ok(change.timer)
    }

    fn require_runtime(&self, verb: &str, id: &str) -> Result<()> {
        if Handle::try_current().is_ok() {
            return Ok(());
        }
        let subject = self.subject(id);
        Err(self.inner.record(
            format!("Failed to {} {}", verb, subject),
            Error::Unexpected("the countdown needs a running tokio runtime".to_string()),
        ))
    }

    fn subject(&self, id: &str) -> String {
        let state = self.state();
        state
            .position(id)
            .map(|i| state.timers[i].title.clone())
            .unwrap_or_else(|| id.to_string())
    }

    // ------------------------------------------
    // Persistence and remote state
    // ------------------------------------------

    /// Load persisted timers, replacing the in-memory ones.
    ///
    /// A timer that was running keeps running, minus the wall-clock seconds
    /// since the snapshot was written; if that uses up its time it comes
    /// back Completed. Returns the number of timers restored.
    pub fn restore(&self) -> Result<usize> {
        let Some(saved) = self.inner.cache.load::<PersistedTimers>(TIMERS_KEY)? else {
            return Ok(0);
        };
        let elapsed = (Utc::now() - saved.saved_at).num_seconds().max(0);
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);

        let (count, running) = {
            let mut state = self.state();
            state.stop_ticker();
            state.timers = saved.timers;
            state.versions.clear();
            state.creating.clear();
            state.active_id = None;

            for timer in state.timers.iter_mut().filter(|t| t.is_running) {
                timer.remaining_time = timer.remaining_time.saturating_sub(elapsed);
                if timer.remaining_time == 0 {
                    timer.is_running = false;
                    timer.is_completed = true;
                }
            }

            // Only one timer may keep running
            let mut running = None;
            for timer in state.timers.iter_mut().filter(|t| t.is_running) {
                if running.is_none() {
                    running = Some(timer.id.clone());
                } else {
                    timer.is_running = false;
                    timer.is_paused = true;
                }
            }
            state.active_id = running.clone();
            (state.timers.len(), running)
        };

        tracing::info!(count, elapsed_secs = elapsed, running = ?running, "Restored timers");
        if running.is_some() {
            match Handle::try_current() {
                Ok(runtime) => self.inner.spawn_ticker(&runtime),
                Err(_) => tracing::warn!("No runtime to drive the restored countdown"),
            }
        }
        Ok(count)
    }

    /// Merge the server's timers. Timers already known locally keep their
    /// local state; new ones are added and never start running here.
    /// Returns the number of timers added.
    pub async fn pull_remote(&self) -> Result<usize> {
        let remote = match self.inner.gateway.fetch::<Vec<Timer>>(&ApiRequest::get("/timers")).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.inner.record("Failed to load timers".to_string(), e)),
        };

        let added = {
            let mut state = self.state();
            let mut added = 0;
            for mut timer in remote {
                if state.position(&timer.id).is_some() {
                    continue;
                }
                if timer.is_running {
                    timer.is_running = false;
                    timer.is_paused = true;
                }
                state.timers.push(timer);
                added += 1;
            }
            added
        };

        if added > 0 {
            self.inner.persist(true);
        }
        tracing::debug!(added, "Merged remote timers");
        Ok(added)
    }

    /// Wait for every background sync, including follow-ups, to finish
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.syncs));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Timer sync task panicked");
                    }
                }
            }
        }
    }
}

impl Drop for TimerStore {
    fn drop(&mut self) {
        self.state().stop_ticker();
    }
}

impl Inner {
    fn record(&self, notice: String, error: Error) -> Error {
        tracing::warn!(error = %error, "{}", notice);
        lock(&self.state).error = Some(StoreError::new(notice, &error));
        error
    }

    /// Write the timers to the cache; unforced writes are throttled to the
    /// configured interval.
    fn persist(&self, force: bool) {
        let snapshot = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            let recent = state
                .last_persist
                .is_some_and(|at| now.duration_since(at) < self.config.persist_interval());
            if !force && recent {
                return;
            }
            state.last_persist = Some(now);
            PersistedTimers {
                saved_at: Utc::now(),
                timers: state.timers.clone(),
            }
        };

        if let Err(e) = self.cache.save(TIMERS_KEY, &snapshot) {
            tracing::warn!(error = %e, "Failed to persist timers");
        }
    }

    fn spawn_ticker(self: &Arc<Self>, runtime: &Handle) {
        let mut state = lock(&self.state);
        state.stop_ticker();
        state.ticker_generation += 1;
        let generation = state.ticker_generation;
        let ticker = run_ticker(Arc::downgrade(self), self.config.tick_interval(), generation);
        state.ticker = Some(runtime.spawn(ticker));
    }

    /// One countdown step. `generation` identifies the calling ticker; a
    /// ticker that has been replaced stops without touching state.
    fn tick(self: &Arc<Self>, generation: Option<u64>) -> bool {
        let mut outcome = Tick::Idle;
        let pending = mutation::begin(
            &self.state,
            RollbackPolicy::KeepLocal,
            "complete timer",
            |state| {
                if generation.is_some_and(|g| g != state.ticker_generation) {
                    return;
                }
                outcome = state.tick();
                if !matches!(outcome, Tick::Counted) {
                    state.stop_ticker();
                }
            },
        );

        match outcome {
            Tick::Idle => false,
            Tick::Counted => {
                self.persist(false);
                true
            }
            Tick::Completed(timer, ops) => {
                tracing::info!(id = %timer.id, title = %timer.title, "Timer completed");
                self.persist(true);
                // No subscribers is fine
                let _ = self.events.send(TimerEvent::Completed {
                    id: timer.id.clone(),
                    title: timer.title.clone(),
                });
                self.spawn_sync(pending, ops, format!("Failed to sync {}", timer.title));
                false
            }
        }
    }

    fn spawn_sync(self: &Arc<Self>, pending: Pending<TimerState>, ops: Vec<PlannedSync>, notice: String) {
        if ops.is_empty() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No runtime for background sync; timer change stays local");
            return;
        };

        let task = runtime.spawn(self.clone().run_sync(pending, ops, notice));
        let mut syncs = lock(&self.syncs);
        syncs.retain(|handle| !handle.is_finished());
        syncs.push(task);
    }

    async fn run_sync(self: Arc<Self>, pending: Pending<TimerState>, ops: Vec<PlannedSync>, notice: String) {
        let mut queue: VecDeque<PlannedSync> = ops.into();
        let mut outcome = Ok(());

        while let Some((op, version)) = queue.pop_front() {
            match self.sync_one(op, version).await {
                Ok(Some(follow_up)) => queue.push_back(follow_up),
                Ok(None) => {}
                Err(e) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }

        if let Err(e) = pending.settle(&self.state, outcome) {
            self.record(notice, e);
        }
    }

    async fn sync_one(&self, op: SyncOp, version: u64) -> Result<Option<PlannedSync>> {
        match op {
            SyncOp::Create(timer) => {
                let result = match ApiRequest::post("/timers").json(&TimerPayload::from(&timer)) {
                    Ok(request) => self.gateway.fetch::<Timer>(&request).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(server) => Ok(self.adopt_created(&timer.id, server, version)),
                    Err(e) => {
                        lock(&self.state).creating.remove(&timer.id);
                        Err(e)
                    }
                }
            }
            SyncOp::Update(timer) => {
                let request = ApiRequest::put(entity_path("timers", &timer.id, None))
                    .json(&TimerPayload::from(&timer))?;
                let envelope = self.gateway.send::<Timer>(&request).await?;
                if let Some(server) = envelope.data {
                    self.accept(server, version);
                }
                Ok(None)
            }
            SyncOp::Delete(id) => {
                self.gateway
                    .execute(&ApiRequest::delete(entity_path("timers", &id, None)))
                    .await?;
                tracing::debug!(id = %id, "Timer deleted remotely");
                Ok(None)
            }
        }
    }

    /// Swap in the server id for a created timer. Returns the follow-up
    /// needed when the timer changed or vanished while the create was in
    /// flight.
    fn adopt_created(&self, local_id: &str, server: Timer, version: u64) -> Option<PlannedSync> {
        let follow_up = {
            let mut state = lock(&self.state);
            state.creating.remove(local_id);

            let Some(i) = state.position(local_id) else {
                tracing::debug!(local_id, id = %server.id, "Timer deleted while being created");
                return Some((SyncOp::Delete(server.id), 0));
            };

            let current = state.version(local_id);
            let timer = &mut state.timers[i];
            timer.id = server.id.clone();
            timer.updated_at = server.updated_at.or(timer.updated_at);
            if current == version {
                timer.title = server.title;
                timer.task_id = server.task_id;
            }

            if state.active_id.as_deref() == Some(local_id) {
                state.active_id = Some(server.id.clone());
            }
            state.versions.remove(local_id);
            state.versions.insert(server.id.clone(), current);

            tracing::info!(local_id, id = %server.id, "Timer created remotely");
            (current > version).then(|| (SyncOp::Update(state.timers[i].clone()), current))
        };

        self.persist(true);
        follow_up
    }

    /// Apply a sync response unless the timer moved on since it was sent.
    /// The countdown itself always stays local.
    fn accept(&self, server: Timer, version: u64) {
        let mut state = lock(&self.state);
        if state.version(&server.id) != version {
            tracing::debug!(id = %server.id, version, "Discarding stale timer sync response");
            return;
        }
        if let Some(i) = state.position(&server.id) {
            let timer = &mut state.timers[i];
            timer.title = server.title;
            timer.task_id = server.task_id;
            timer.updated_at = server.updated_at.or(timer.updated_at);
        }
    }
}

async fn run_ticker(inner: Weak<Inner>, period: Duration, generation: u64) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.tick(Some(generation)) {
            break;
        }
    }
    tracing::debug!(generation, "Timer ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryCache;
    use crate::stores::test_support::{gateway, ok, unreachable_gateway};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Ticks far apart enough that tests drive the countdown by hand
    fn manual() -> TimerConfig {
        TimerConfig {
            tick_millis: 3_600_000,
            persist_interval_millis: 1000,
        }
    }

    fn draft(title: &str, minutes: u32) -> NewTimer {
        NewTimer {
            title: title.to_string(),
            duration_minutes: minutes,
            task_id: None,
        }
    }

    fn offline_store(config: TimerConfig) -> (TimerStore, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let store = TimerStore::new(unreachable_gateway(), cache.clone(), config);
        (store, cache)
    }

    fn server_timer(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "duration": 25,
            "remainingTime": 1500,
            "isRunning": false,
            "isPaused": false,
            "isCompleted": false,
            "updatedAt": "2026-10-18T08:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_starting_one_timer_pauses_the_other() {
        let (store, _) = offline_store(manual());
        let a = store.create(&draft("Focus", 25)).unwrap();
        let b = store.create(&draft("Break", 5)).unwrap();

        store.start(&a.id).unwrap();
        store.start(&b.id).unwrap();

        let a = store.get(&a.id).unwrap();
        assert!(!a.is_running);
        assert_eq!(a.phase(), TimerPhase::Paused);
        assert_eq!(store.active().unwrap().id, b.id);
        assert_eq!(store.timers().iter().filter(|t| t.is_running).count(), 1);
    }

    #[tokio::test]
    async fn test_manual_ticks_count_down_to_completion() {
        let (store, _) = offline_store(manual());
        let timer = store.create(&draft("Tea", 1)).unwrap();
        store.start(&timer.id).unwrap();
        let mut events = store.subscribe();

        let mut last = store.get(&timer.id).unwrap().remaining_time;
        assert_eq!(last, 60);
        while store.tick() {
            let now = store.get(&timer.id).unwrap().remaining_time;
            assert_eq!(now, last - 1);
            last = now;
        }

        let timer = store.get(&timer.id).unwrap();
        assert_eq!(timer.remaining_time, 0);
        assert_eq!(timer.phase(), TimerPhase::Completed);
        assert!(store.active().is_none());
        assert!(!store.tick());
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 0);

        match events.try_recv().unwrap() {
            TimerEvent::Completed { id, title } => {
                assert_eq!(id, timer.id);
                assert_eq!(title, "Tea");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_runs_on_the_clock() {
        let (store, _) = offline_store(TimerConfig::default());
        let timer = store.create(&draft("Focus", 1)).unwrap();
        let mut events = store.subscribe();

        store.start(&timer.id).unwrap();
        assert!(store.is_ticking());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 57);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 56);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let done = store.get(&timer.id).unwrap();
        assert_eq!(done.remaining_time, 0);
        assert!(done.is_completed);
        assert!(!store.is_ticking());
        assert!(matches!(events.try_recv(), Ok(TimerEvent::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_the_ticker() {
        let (store, _) = offline_store(TimerConfig::default());
        let timer = store.create(&draft("Focus", 5)).unwrap();
        store.start(&timer.id).unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        store.pause(&timer.id).unwrap();
        assert!(!store.is_ticking());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 298);

        store.resume(&timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 297);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_persistence_is_throttled() {
        let config = TimerConfig {
            tick_millis: 1000,
            persist_interval_millis: 3000,
        };
        let (store, cache) = offline_store(config);
        let timer = store.create(&draft("Focus", 5)).unwrap();
        store.start(&timer.id).unwrap();
        let writes = cache.write_count();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        // Ticks at 3s, 6s and 9s are the only ones written
        assert_eq!(cache.write_count(), writes + 3);
    }

    #[tokio::test]
    async fn test_state_machine_rules() {
        let (store, _) = offline_store(manual());
        let timer = store.create(&draft("Focus", 25)).unwrap();

        let err = store.pause(&timer.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.resume(&timer.id).is_err());
        assert!(store.stop(&timer.id).is_err());

        store.start(&timer.id).unwrap();
        let stopped = store.stop(&timer.id).unwrap();
        assert_eq!(stopped.remaining_time, 0);
        assert_eq!(stopped.phase(), TimerPhase::Completed);
        assert!(!store.is_ticking());

        let err = store.start(&timer.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.error().unwrap().notice, "Failed to start Focus");

        let reset = store.reset(&timer.id).unwrap();
        assert_eq!(reset.remaining_time, 1500);
        assert_eq!(reset.phase(), TimerPhase::Idle);

        assert_eq!(
            store.start("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_update_duration_resets_idle_countdown() {
        let (store, _) = offline_store(manual());
        let timer = store.create(&draft("Focus", 25)).unwrap();

        let patch = TimerPatch {
            title: Some("Deep work".to_string()),
            duration_minutes: Some(50),
        };
        let updated = store.update(&timer.id, &patch).unwrap();
        assert_eq!(updated.title, "Deep work");
        assert_eq!(updated.remaining_time, 3000);

        let bad = TimerPatch {
            duration_minutes: Some(0),
            ..Default::default()
        };
        assert!(store.update(&timer.id, &bad).is_err());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_local_state() {
        let (store, _) = offline_store(manual());
        let timer = store.create(&draft("Focus", 25)).unwrap();
        store.start(&timer.id).unwrap();
        store.settle().await;

        let timer = store.get(&timer.id).unwrap();
        assert!(timer.is_local());
        assert!(timer.is_running);
        let slot = store.error().unwrap();
        assert_eq!(slot.kind, ErrorKind::Connectivity);
        assert_eq!(slot.notice, "Failed to sync Focus");
    }

    #[tokio::test]
    async fn test_local_id_replaced_and_followed_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/timers"))
            .and(body_partial_json(json!({"title": "Focus", "remainingTime": 1500})))
            .respond_with(ok(server_timer("srv-1", "Focus")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/timers/srv-1"))
            .and(body_partial_json(json!({"title": "Deep work"})))
            .respond_with(ok(server_timer("srv-1", "Deep work")))
            .expect(1)
            .mount(&server)
            .await;

        let store = TimerStore::new(gateway(&server), Arc::new(MemoryCache::new()), manual());
        let local = store.create(&draft("Focus", 25)).unwrap();
        assert!(local.is_local());
        // Changed before the create response arrives
        store
            .update(
                &local.id,
                &TimerPatch {
                    title: Some("Deep work".to_string()),
                    duration_minutes: None,
                },
            )
            .unwrap();
        store.settle().await;

        let timers = store.timers();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].id, "srv-1");
        assert_eq!(timers[0].title, "Deep work");
        assert!(store.get(&local.id).is_none());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_delete_during_create_removes_server_copy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/timers"))
            .respond_with(ok(server_timer("srv-7", "Focus")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/timers/srv-7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = TimerStore::new(gateway(&server), Arc::new(MemoryCache::new()), manual());
        let local = store.create(&draft("Focus", 25)).unwrap();
        store.delete(&local.id).unwrap();
        assert!(store.timers().is_empty());

        store.settle().await;
        assert!(store.timers().is_empty());
    }

    #[tokio::test]
    async fn test_stale_sync_response_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timers"))
            .respond_with(ok(json!([server_timer("srv-1", "Focus")])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/timers/srv-1"))
            .and(body_partial_json(json!({"title": "First"})))
            .respond_with(
                ok(server_timer("srv-1", "First")).set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/timers/srv-1"))
            .and(body_partial_json(json!({"title": "Second"})))
            .respond_with(ok(server_timer("srv-1", "Second")))
            .expect(1)
            .mount(&server)
            .await;

        let store = TimerStore::new(gateway(&server), Arc::new(MemoryCache::new()), manual());
        assert_eq!(store.pull_remote().await.unwrap(), 1);

        for title in ["First", "Second"] {
            let patch = TimerPatch {
                title: Some(title.to_string()),
                duration_minutes: None,
            };
            store.update("srv-1", &patch).unwrap();
        }
        store.settle().await;

        assert_eq!(store.get("srv-1").unwrap().title, "Second");
    }

    #[tokio::test]
    async fn test_pull_remote_keeps_local_state() {
        let server = MockServer::start().await;
        let mut running = server_timer("srv-2", "Remote run");
        running["isRunning"] = json!(true);
        Mock::given(method("GET"))
            .and(path("/timers"))
            .respond_with(ok(json!([server_timer("srv-1", "Renamed remotely"), running])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ok(json!(null)))
            .mount(&server)
            .await;

        let store = TimerStore::new(gateway(&server), Arc::new(MemoryCache::new()), manual());
        assert_eq!(store.pull_remote().await.unwrap(), 2);
        store
            .update(
                "srv-1",
                &TimerPatch {
                    title: Some("Local title".to_string()),
                    duration_minutes: None,
                },
            )
            .unwrap();
        store.settle().await;

        assert_eq!(store.pull_remote().await.unwrap(), 0);
        assert_eq!(store.get("srv-1").unwrap().title, "Local title");
        assert_eq!(store.get("srv-2").unwrap().phase(), TimerPhase::Paused);
    }

    #[tokio::test]
    async fn test_restore_deducts_elapsed_time() {
        let (store, cache) = offline_store(manual());
        let mut running = Timer::new_local("Focus", 25);
        running.is_running = true;
        running.remaining_time = 100;
        let mut short = Timer::new_local("Tea", 3);
        short.is_paused = true;
        short.remaining_time = 5;

        let snapshot = PersistedTimers {
            saved_at: Utc::now() - chrono::Duration::seconds(10),
            timers: vec![running.clone(), short.clone()],
        };
        let dyn_cache: &dyn KeyValueCache = &*cache;
        dyn_cache.save(TIMERS_KEY, &snapshot).unwrap();

        assert_eq!(store.restore().unwrap(), 2);
        let restored = store.get(&running.id).unwrap();
        assert!((89..=90).contains(&restored.remaining_time));
        assert!(restored.is_running);
        assert_eq!(store.active().unwrap().id, running.id);
        assert!(store.is_ticking());
        // Paused timers do not lose time
        assert_eq!(store.get(&short.id).unwrap().remaining_time, 5);
    }

    #[tokio::test]
    async fn test_restore_completes_expired_timer() {
        let (store, cache) = offline_store(manual());
        let mut running = Timer::new_local("Focus", 1);
        running.is_running = true;
        running.remaining_time = 30;

        let snapshot = PersistedTimers {
            saved_at: Utc::now() - chrono::Duration::seconds(45),
            timers: vec![running.clone()],
        };
        let dyn_cache: &dyn KeyValueCache = &*cache;
        dyn_cache.save(TIMERS_KEY, &snapshot).unwrap();

        store.restore().unwrap();
        let restored = store.get(&running.id).unwrap();
        assert_eq!(restored.phase(), TimerPhase::Completed);
        assert!(store.active().is_none());
        assert!(!store.is_ticking());
    }

    #[tokio::test]
    async fn test_mutations_persist_immediately() {
        let (store, cache) = offline_store(manual());
        store.create(&draft("Focus", 25)).unwrap();

        let dyn_cache: &dyn KeyValueCache = &*cache;
        let saved: PersistedTimers = dyn_cache.load(TIMERS_KEY).unwrap().unwrap();
        assert_eq!(saved.timers.len(), 1);
        assert_eq!(saved.timers[0].title, "Focus");
    }
}
