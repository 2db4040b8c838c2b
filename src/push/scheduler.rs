use crate::ports;
use crate::types::push::NotificationId;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("scheduler is shut down")]
    ShutDown,
}

struct ScheduledJob {
    run_at: OffsetDateTime,
    scheduled_at: OffsetDateTime,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    entries: HashMap<NotificationId, ScheduledJob>,
    next_generation: u64,
    closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJobInfo {
    pub notification_id: NotificationId,
    pub run_at: OffsetDateTime,
    pub scheduled_at: OffsetDateTime,
}

/// In-memory one-shot timers keyed by notification id.
///
/// A job leaves the map the moment it fires, before its callback runs, so
/// `cancel` can only ever stop a timer that has not fired yet.
pub(crate) struct Scheduler<T> {
    time: T,
    jobs: Arc<Mutex<Jobs>>,
}

impl<T> Scheduler<T>
where
    T: ports::TimeProvider,
{
    pub(crate) fn new(time: T) -> Self {
        Self {
            time,
            jobs: Arc::new(Mutex::new(Jobs::default())),
        }
    }

    /// Registers a timer for `id`, replacing any timer already registered
    /// for it. A `run_at` in the past fires immediately.
    pub(crate) fn schedule<F, Fut>(
        &self,
        id: NotificationId,
        run_at: OffsetDateTime,
        fire: F,
    ) -> Result<(), ScheduleError>
    where
        F: FnOnce(NotificationId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().expect("scheduler jobs lock");
        if jobs.closed {
            return Err(ScheduleError::ShutDown);
        }
        jobs.next_generation += 1;
        let generation = jobs.next_generation;

        let time = self.time.clone();
        let registry = Arc::clone(&self.jobs);
        let handle = tokio::spawn(async move {
            if let Some(delay) = compute_delay(&time, run_at) {
                time.sleep(delay).await;
            }
            if claim(&registry, id, generation) {
                fire(id).await;
            }
        });

        let job = ScheduledJob {
            run_at,
            scheduled_at: self.time.now(),
            generation,
            handle,
        };
        if let Some(previous) = jobs.entries.insert(id, job) {
            previous.handle.abort();
            tracing::debug!(notification_id = id, "replaced scheduled job");
        }
        Ok(())
    }

    /// Returns `false` when no job was registered for `id`.
    pub(crate) fn cancel(&self, id: NotificationId) -> bool {
        let removed = self
            .jobs
            .lock()
            .expect("scheduler jobs lock")
            .entries
            .remove(&id);
        match removed {
            Some(job) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: NotificationId) -> bool {
        self.jobs
            .lock()
            .expect("scheduler jobs lock")
            .entries
            .contains_key(&id)
    }

    /// Scheduled jobs ordered by due time.
    pub(crate) fn jobs(&self) -> Vec<ScheduledJobInfo> {
        let jobs = self.jobs.lock().expect("scheduler jobs lock");
        let mut infos: Vec<ScheduledJobInfo> = jobs
            .entries
            .iter()
            .map(|(id, job)| ScheduledJobInfo {
                notification_id: *id,
                run_at: job.run_at,
                scheduled_at: job.scheduled_at,
            })
            .collect();
        infos.sort_by(|a, b| {
            a.run_at
                .cmp(&b.run_at)
                .then(a.notification_id.cmp(&b.notification_id))
        });
        infos
    }

    /// Aborts every timer and refuses new ones.
    pub(crate) fn shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("scheduler jobs lock");
        jobs.closed = true;
        for (_, job) in jobs.entries.drain() {
            job.handle.abort();
        }
    }
}

/// Removes the job if it is still the registered one for `id`.
fn claim(jobs: &Mutex<Jobs>, id: NotificationId, generation: u64) -> bool {
    let mut jobs = jobs.lock().expect("scheduler jobs lock");
    match jobs.entries.get(&id) {
        Some(job) if job.generation == generation => {
            jobs.entries.remove(&id);
            true
        }
        _ => false,
    }
}

fn compute_delay<T: ports::TimeProvider>(time: &T, at: OffsetDateTime) -> Option<Duration> {
    let now = time.now();
    let delay = at - now;
    if delay.is_positive() {
        match delay.try_into() {
            Ok(std_delay) => Some(std_delay),
            Err(_) => Some(Duration::MAX),
        }
    } else {
        None
    }
}
