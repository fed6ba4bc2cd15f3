use crate::cache::{CacheKey, QueryCache};
use crate::clock::{Clock, SystemClock};
use crate::completion::reconcile;
use crate::config::StoreConfig;
use crate::db::{RecordStore, SqliteRecordStore};
use crate::errors::{AppError, AppResult};
use crate::models::{CreateEvent, Event, StoreSnapshot, StoreState, UpdateEvent};
use crate::scheduler::{CompletionScheduler, ExecutorFuture};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Reactive container for the events of the current view.
///
/// Every mutation writes through to the [`RecordStore`], drops all cached
/// listings, and reloads the current view. Reloads reconcile past-due events
/// and re-arm completion checks for the ones still ahead.
pub struct EventStore {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    cache: Mutex<QueryCache>,
    scheduler: CompletionScheduler,
    state: Mutex<StoreState>,
    snapshot: watch::Sender<StoreSnapshot>,
    refresh_seq: AtomicU64,
}

impl EventStore {
    pub fn new(records: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: &StoreConfig) -> Arc<Self> {
        let (snapshot, _) = watch::channel(StoreSnapshot::default());
        let scheduler = CompletionScheduler::new();

        let this = Arc::new(Self {
            records,
            clock,
            cache: Mutex::new(QueryCache::new(config.cache_ttl())),
            scheduler: scheduler.clone(),
            state: Mutex::new(StoreState::Uninitialized),
            snapshot,
            refresh_seq: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&this);
        scheduler.set_executor(Arc::new(move |event_id: i64| -> ExecutorFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(strong) = weak.upgrade() {
                    strong.complete_due_event(event_id).await;
                }
            })
        }));

        this
    }

    /// SQLite-backed store on the configured path, driven by the system clock.
    pub fn open(config: &StoreConfig) -> Arc<Self> {
        let records = Arc::new(SqliteRecordStore::new(&config.database_path));
        Self::new(records, Arc::new(SystemClock), config)
    }

    pub fn state(&self) -> StoreState {
        *self.lock_state()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn scheduler(&self) -> &CompletionScheduler {
        &self.scheduler
    }

    pub async fn initialize(&self) -> AppResult<()> {
        {
            let mut state = self.lock_state();
            if matches!(*state, StoreState::Ready | StoreState::Initializing) {
                return Ok(());
            }
            *state = StoreState::Initializing;
        }
        self.publish(|snapshot| {
            snapshot.loading = true;
            snapshot.error = None;
        });

        match self.records.init().await {
            Ok(()) => {
                *self.lock_state() = StoreState::Ready;
                self.publish(|snapshot| snapshot.is_ready = true);
                tracing::info!("event store ready");
                self.refresh().await;
                Ok(())
            }
            Err(error) => {
                *self.lock_state() = StoreState::Failed;
                tracing::error!(error = %error, "event store initialization failed");
                self.publish(|snapshot| {
                    snapshot.loading = false;
                    snapshot.is_ready = false;
                    snapshot.error = Some(error.to_string());
                });
                Err(error)
            }
        }
    }

    pub async fn fetch_events(&self) {
        if !self.ready_for_read("fetch events") {
            return;
        }
        self.load(CacheKey::All).await;
    }

    pub async fn fetch_events_by_date(&self, date: NaiveDate) {
        if !self.ready_for_read("fetch events by date") {
            return;
        }
        self.load(CacheKey::Date(date)).await;
    }

    /// Reloads whatever view is selected: one day, or everything.
    pub async fn refresh(&self) {
        if !self.ready_for_read("refresh events") {
            return;
        }
        let key = CacheKey::for_selection(self.snapshot.borrow().selected_date);
        self.load(key).await;
    }

    pub async fn set_selected_date(&self, date: Option<NaiveDate>) {
        self.publish(|snapshot| {
            snapshot.loading = true;
            snapshot.selected_date = date;
        });
        if !self.ready_for_read("select a date") {
            self.publish(|snapshot| snapshot.loading = false);
            return;
        }
        self.refresh().await;
    }

    pub async fn add_event(&self, payload: CreateEvent) -> AppResult<i64> {
        self.ensure_ready("add an event")?;
        if let Err(error) = payload.validate() {
            return Err(self.fail("add event", error));
        }
        self.publish(|snapshot| snapshot.loading = true);

        match self.records.insert(payload).await {
            Ok(id) => {
                tracing::info!(event_id = id, "event added");
                self.invalidate_cache();
                self.refresh().await;
                Ok(id)
            }
            Err(error) => Err(self.fail("add event", error)),
        }
    }

    pub async fn update_event(&self, id: i64, changes: UpdateEvent) -> AppResult<()> {
        self.ensure_ready("update an event")?;
        if let Err(error) = changes.validate() {
            return Err(self.fail("update event", error));
        }
        self.publish(|snapshot| snapshot.loading = true);

        match self.records.update(id, changes).await {
            Ok(()) => {
                self.scheduler.cancel(id);
                self.invalidate_cache();
                self.refresh().await;
                Ok(())
            }
            Err(error) => Err(self.fail("update event", error)),
        }
    }

    pub async fn delete_event(&self, id: i64) -> AppResult<()> {
        self.ensure_ready("delete an event")?;
        self.scheduler.cancel(id);
        self.publish(|snapshot| snapshot.loading = true);

        match self.records.delete(id).await {
            Ok(()) => {
                tracing::info!(event_id = id, "event deleted");
                self.invalidate_cache();
                self.refresh().await;
                Ok(())
            }
            Err(error) => Err(self.fail("delete event", error)),
        }
    }

    pub async fn mark_event_as_completed(&self, id: i64, completed: bool) -> AppResult<()> {
        self.ensure_ready("change completion")?;
        if completed {
            self.scheduler.cancel(id);
        }
        self.publish(|snapshot| snapshot.loading = true);

        match self.records.update(id, UpdateEvent::completed(completed)).await {
            Ok(()) => {
                self.invalidate_cache();
                self.refresh().await;
                Ok(())
            }
            Err(error) => Err(self.fail("change completion", error)),
        }
    }

    pub fn clear_error(&self) {
        self.publish(|snapshot| snapshot.error = None);
    }

    pub fn clear_cache(&self) {
        self.invalidate_cache();
    }

    /// Cancels every armed completion check. The published snapshot is kept.
    pub fn teardown(&self) {
        let cancelled = self.scheduler.cancel_all();
        tracing::info!(cancelled, "event store torn down");
    }

    async fn load(&self, key: CacheKey) {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(|snapshot| snapshot.loading = true);
        let now = self.clock.now();

        let cached = self.lock_cache().get(&key);
        let events = match cached {
            Some(events) => {
                tracing::debug!(key = %key, "event cache hit");
                let (events, flipped) = reconcile(events, now);
                if !flipped.is_empty() {
                    self.lock_cache().replace_events(&key, events.clone());
                    self.persist_completions(flipped);
                }
                events
            }
            None => {
                tracing::debug!(key = %key, "event cache miss");
                let fetched = match key {
                    CacheKey::All => self.records.get_all().await,
                    CacheKey::Date(date) => self.records.get_by_date(date).await,
                };
                // A newer reload started while this one awaited storage; its
                // result owns the cache, the timers and the snapshot.
                if !self.is_latest_refresh(seq) {
                    tracing::debug!(key = %key, seq, "dropping superseded refresh result");
                    return;
                }
                match fetched {
                    Ok(events) => self.absorb_fetched(key, events, now),
                    Err(error) => {
                        tracing::warn!(key = %key, error = %error, "failed to load events");
                        self.publish(|snapshot| {
                            snapshot.loading = false;
                            snapshot.error = Some(error.to_string());
                        });
                        return;
                    }
                }
            }
        };

        if !self.is_latest_refresh(seq) {
            tracing::debug!(key = %key, seq, "dropping superseded refresh result");
            return;
        }
        self.publish(|snapshot| {
            snapshot.events = events;
            snapshot.loading = false;
            snapshot.error = None;
        });
    }

    fn absorb_fetched(&self, key: CacheKey, events: Vec<Event>, now: NaiveDateTime) -> Vec<Event> {
        let (events, flipped) = reconcile(events, now);
        self.persist_completions(flipped);
        for event in &events {
            self.scheduler.arm(event, now);
        }
        self.lock_cache().put(key, events.clone());
        events
    }

    /// Writes completion flags found by a reconcile pass. Failures are only
    /// logged; the refresh that found them carries on regardless.
    fn persist_completions(&self, flipped: Vec<i64>) {
        for id in flipped {
            self.scheduler.cancel(id);
            let records = self.records.clone();
            tokio::spawn(async move {
                if let Err(error) = records.update(id, UpdateEvent::completed(true)).await {
                    tracing::warn!(event_id = id, error = %error, "failed to persist auto-completion");
                }
            });
        }
    }

    async fn complete_due_event(&self, id: i64) {
        if let Err(error) = self.records.update(id, UpdateEvent::completed(true)).await {
            tracing::warn!(event_id = id, error = %error, "failed to persist scheduled completion");
        }
        self.invalidate_cache();
        self.refresh().await;
    }

    fn ensure_ready(&self, operation: &str) -> AppResult<()> {
        if self.state() == StoreState::Ready {
            return Ok(());
        }
        let error = AppError::NotReady(format!("cannot {} before the event store is initialized", operation));
        Err(self.fail(operation, error))
    }

    fn ready_for_read(&self, operation: &str) -> bool {
        let state = self.state();
        if state == StoreState::Ready {
            return true;
        }
        tracing::warn!(operation, state = state.as_str(), "event store not initialized; ignoring read");
        false
    }

    fn fail(&self, operation: &str, error: AppError) -> AppError {
        tracing::warn!(operation, error = %error, "event store operation failed");
        self.publish(|snapshot| {
            snapshot.loading = false;
            snapshot.error = Some(error.to_string());
        });
        error
    }

    fn is_latest_refresh(&self, seq: u64) -> bool {
        self.refresh_seq.load(Ordering::SeqCst) == seq
    }

    fn invalidate_cache(&self) {
        self.lock_cache().invalidate_all();
    }

    fn publish(&self, update: impl FnOnce(&mut StoreSnapshot)) {
        self.snapshot.send_modify(update);
    }

    fn lock_cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
