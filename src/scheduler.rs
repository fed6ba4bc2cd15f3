use crate::models::Event;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;

pub type ExecutorFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Executor = Arc<dyn Fn(i64) -> ExecutorFuture + Send + Sync>;

struct ScheduledCheck {
    generation: u64,
    due_at: NaiveDateTime,
    handle: JoinHandle<()>,
}

/// One-shot completion timers keyed by event id.
///
/// At most one timer is live per id: arming again aborts the previous task
/// before the new one is registered. A firing timer drops its own
/// registration before running the executor, and only if the registration
/// still carries its generation.
#[derive(Clone, Default)]
pub struct CompletionScheduler {
    checks: Arc<Mutex<HashMap<i64, ScheduledCheck>>>,
    executor: Arc<RwLock<Option<Executor>>>,
    next_generation: Arc<AtomicU64>,
}

impl CompletionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_executor(&self, executor: Executor) {
        let mut writer = self
            .executor
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *writer = Some(executor);
    }

    /// Arms a check for `event` unless it is completed or not in the future.
    /// Returns whether a timer is now armed for it.
    pub fn arm(&self, event: &Event, now: NaiveDateTime) -> bool {
        if event.completed {
            return false;
        }
        let due_at = event.due_at();
        let delay = match (due_at - now).to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => return false,
        };

        let id = event.id;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut checks = self.lock_checks();
        if let Some(previous) = checks.remove(&id) {
            previous.handle.abort();
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !scheduler.release(id, generation) {
                return;
            }
            tracing::debug!(event_id = id, "scheduled completion check fired");
            scheduler.execute(id).await;
        });
        checks.insert(
            id,
            ScheduledCheck {
                generation,
                due_at,
                handle,
            },
        );
        tracing::debug!(
            event_id = id,
            due_at = %due_at,
            delay = ?delay,
            "armed completion check"
        );
        true
    }

    pub fn cancel(&self, id: i64) -> bool {
        let removed = self.lock_checks().remove(&id);
        match removed {
            Some(check) => {
                check.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained = self.lock_checks().drain().collect::<Vec<_>>();
        for (_, check) in &drained {
            check.handle.abort();
        }
        drained.len()
    }

    pub fn is_armed(&self, id: i64) -> bool {
        self.lock_checks().contains_key(&id)
    }

    pub fn due_at(&self, id: i64) -> Option<NaiveDateTime> {
        self.lock_checks().get(&id).map(|check| check.due_at)
    }

    pub fn armed_count(&self) -> usize {
        self.lock_checks().len()
    }

    fn release(&self, id: i64, generation: u64) -> bool {
        let mut checks = self.lock_checks();
        match checks.get(&id) {
            Some(check) if check.generation == generation => {
                checks.remove(&id);
                true
            }
            _ => false,
        }
    }

    async fn execute(&self, id: i64) {
        let executor = self
            .executor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match executor {
            Some(executor) => executor(id).await,
            None => tracing::warn!(event_id = id, "completion check fired without an executor"),
        }
    }

    fn lock_checks(&self) -> MutexGuard<'_, HashMap<i64, ScheduledCheck>> {
        self.checks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
