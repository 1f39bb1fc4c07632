//! Daily trigger driving the relay cycle.
//!
//! [`DailySchedule`] is the pure fire-time calculation. [`DailyTask`] wraps
//! it in a background loop that sleeps until the next fire time, runs one
//! cycle to completion, and repeats. Cycles never overlap because the loop
//! awaits each one before computing the next wait.

pub mod clock;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::ScheduleConfig;

pub use self::clock::{Clock, SystemClock};

/// A fixed wall-clock time of day in one timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    timezone: Tz,
    fire_time: NaiveTime,
}

impl DailySchedule {
    /// Fire every day at `fire_time` local time in `timezone`.
    #[must_use]
    pub fn new(timezone: Tz, fire_time: NaiveTime) -> Self {
        Self {
            timezone,
            fire_time,
        }
    }

    /// Build from the `[schedule]` config section.
    #[must_use]
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.timezone, config.fire_time)
    }

    /// Timezone the fire time is expressed in.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire instant strictly after `after`.
    ///
    /// An ambiguous local time (clocks going back) resolves to the earlier
    /// instant. A local time skipped by a DST jump fires one hour later on
    /// the wall clock.
    #[must_use]
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = after.with_timezone(&self.timezone).date_naive();
        for offset in 0..=2 {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                continue;
            };
            if let Some(at) = self.instant_on(date) {
                if at > after {
                    return at;
                }
            }
        }
        after + chrono::Duration::days(1)
    }

    fn instant_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local = date.and_time(self.fire_time);
        let resolved = match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(at) => Some(at),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => self
                .timezone
                .from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest(),
        };
        resolved.map(|at| at.with_timezone(&Utc))
    }
}

/// Observable state of the daily task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the next fire time.
    Idle,
    /// A cycle is running.
    Firing,
}

/// Builder for the daily background task.
///
/// Call [`spawn`](Self::spawn) to start the loop.
pub struct DailyTask {
    schedule: DailySchedule,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl DailyTask {
    /// Construct the task (does not start it yet).
    #[must_use]
    pub fn new(schedule: DailySchedule, clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        Self {
            schedule,
            clock,
            cancel,
        }
    }

    /// Spawn the loop; `cycle` is invoked once per firing.
    #[must_use]
    pub fn spawn<F, Fut>(self, cycle: F) -> DailyTaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let firing = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicU64::new(0));
        let cancel = self.cancel.clone();

        let join_handle = tokio::spawn(
            Self::run(
                self.schedule,
                self.clock,
                self.cancel,
                Arc::clone(&firing),
                Arc::clone(&completed),
                cycle,
            )
            .instrument(info_span!("daily_task")),
        );

        DailyTaskHandle {
            firing,
            completed,
            cancel,
            join_handle: Some(join_handle),
        }
    }

    async fn run<F, Fut>(
        schedule: DailySchedule,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        firing: Arc<AtomicBool>,
        completed: Arc<AtomicU64>,
        mut cycle: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut last = clock.now();

        loop {
            let now = clock.now();
            let mut next = schedule.next_fire_after(last);
            if next < now {
                // The previous cycle ran past this slot; start right away,
                // but only once.
                warn!(missed = %next, "previous cycle overran the next slot");
                next = now;
            }
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(
                next_fire = %next.with_timezone(&schedule.timezone()),
                wait_seconds = wait.as_secs(),
                "next daily post scheduled"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("daily task shutting down");
                    break;
                }
                () = tokio::time::sleep(wait) => {}
            }

            firing.store(true, Ordering::SeqCst);
            cycle().await;
            firing.store(false, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
            last = next;
        }
    }
}

/// Handle returned from [`DailyTask::spawn`].
pub struct DailyTaskHandle {
    firing: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for DailyTaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DailyTaskHandle {
    /// Whether a cycle is currently running.
    #[must_use]
    pub fn state(&self) -> TaskState {
        if self.firing.load(Ordering::SeqCst) {
            TaskState::Firing
        } else {
            TaskState::Idle
        }
    }

    /// Number of cycles that ran to completion.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Stop waiting for further firings and wait for the loop to exit.
    ///
    /// A cycle already in flight runs to completion first.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
