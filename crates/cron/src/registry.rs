//! In-memory registry of live jobs, keyed by task id.
//!
//! Every mutation happens under one lock, so a replace is atomic with
//! respect to the firing loop: a tick sees either the old job or the new
//! one, never a mix.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::{
    callback::TaskCallback,
    expr::ScheduleDescriptor,
    trigger::next_fire_after,
    types::{TaskId, TriggerKind},
};

/// Fires this late or later count as missed rather than on time.
pub const ON_TIME_SLACK: Duration = Duration::from_secs(60);

struct RegisteredJob {
    name: String,
    descriptor: Arc<ScheduleDescriptor>,
    callback: Arc<dyn TaskCallback>,
    next_fire_at: Option<DateTime<Utc>>,
    last_fired_at: Option<DateTime<Utc>>,
}

/// Read-only view of one registered job.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobSnapshot {
    pub task_id: TaskId,
    pub name: String,
    pub expression: String,
    pub timezone: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

/// A job that came due and should run now.
pub struct Firing {
    pub task_id: TaskId,
    pub name: String,
    pub scheduled_for: DateTime<Utc>,
    pub kind: TriggerKind,
    pub callback: Arc<dyn TaskCallback>,
}

/// A fire time that was dropped because it fell outside the grace window.
#[derive(Debug, Clone, PartialEq)]
pub struct MissedFire {
    pub task_id: TaskId,
    pub name: String,
    pub scheduled_for: DateTime<Utc>,
    pub late_by: Duration,
}

/// Everything one tick found due.
#[derive(Default)]
pub struct DueJobs {
    pub firings: Vec<Firing>,
    pub dropped: Vec<MissedFire>,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<TaskId, RegisteredJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, RegisteredJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register or replace the job for `task_id`. Any previous trigger state
    /// is discarded; the next fire is computed from `now`.
    pub fn add(
        &self,
        task_id: TaskId,
        name: &str,
        descriptor: ScheduleDescriptor,
        callback: Arc<dyn TaskCallback>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.add_with_missed(task_id, name, descriptor, callback, now, None)
    }

    /// Like [`add`](Self::add), but a `missed_at` at or before `now` becomes
    /// the pending fire so the next tick can catch it up or drop it.
    pub fn add_with_missed(
        &self,
        task_id: TaskId,
        name: &str,
        descriptor: ScheduleDescriptor,
        callback: Arc<dyn TaskCallback>,
        now: DateTime<Utc>,
        missed_at: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let next_fire_at = missed_at
            .filter(|t| *t <= now)
            .or_else(|| next_fire_after(&descriptor, now));
        let job = RegisteredJob {
            name: name.to_string(),
            descriptor: Arc::new(descriptor),
            callback,
            next_fire_at,
            last_fired_at: None,
        };
        let replaced = self.lock().insert(task_id, job).is_some();
        debug!(task_id, replaced, next_fire_at = ?next_fire_at, "registered job");
        next_fire_at
    }

    /// Remove the job. Removing an unknown id is not an error.
    pub fn remove(&self, task_id: TaskId) -> bool {
        let removed = self.lock().remove(&task_id).is_some();
        if !removed {
            warn!(task_id, "job not registered, nothing to remove");
        }
        removed
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.lock().contains_key(&task_id)
    }

    pub fn next_fire_time(&self, task_id: TaskId) -> Option<DateTime<Utc>> {
        self.lock().get(&task_id).and_then(|j| j.next_fire_at)
    }

    pub fn descriptor(&self, task_id: TaskId) -> Option<Arc<ScheduleDescriptor>> {
        self.lock().get(&task_id).map(|j| Arc::clone(&j.descriptor))
    }

    pub fn callback(&self, task_id: TaskId) -> Option<Arc<dyn TaskCallback>> {
        self.lock().get(&task_id).map(|j| Arc::clone(&j.callback))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Earliest pending fire across all jobs.
    pub fn earliest_fire(&self) -> Option<DateTime<Utc>> {
        self.lock().values().filter_map(|j| j.next_fire_at).min()
    }

    /// Snapshots sorted by task id.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self
            .lock()
            .iter()
            .map(|(id, j)| JobSnapshot {
                task_id: *id,
                name: j.name.clone(),
                expression: j.descriptor.expression().to_string(),
                timezone: j.descriptor.timezone().name().to_string(),
                next_fire_at: j.next_fire_at,
                last_fired_at: j.last_fired_at,
            })
            .collect();
        out.sort_by_key(|s| s.task_id);
        out
    }

    /// Collect every job whose fire time has passed and advance its trigger
    /// past `now`.
    ///
    /// Any number of missed fire times collapse into at most one firing,
    /// judged by the newest of them. A job whose newest fire is late by less
    /// than [`ON_TIME_SLACK`] fires as scheduled; a later one fires once as
    /// a catch-up if within `grace`, otherwise the miss is reported in
    /// [`DueJobs::dropped`].
    pub fn take_due(&self, now: DateTime<Utc>, grace: Duration) -> DueJobs {
        let mut due = DueJobs::default();
        let mut jobs = self.lock();
        for (task_id, job) in jobs.iter_mut() {
            let Some(scheduled_for) = job.next_fire_at else {
                continue;
            };
            if scheduled_for > now {
                continue;
            }
            job.next_fire_at = next_fire_after(&job.descriptor, now);
            let oldest = scheduled_for;
            let scheduled_for = latest_fire_at_or_before(&job.descriptor, oldest, now, grace);
            if scheduled_for > oldest {
                debug!(task_id = *task_id, %oldest, %scheduled_for, "collapsed missed fires");
            }

            let late_by = (now - scheduled_for).to_std().unwrap_or_default();
            let kind = if late_by < ON_TIME_SLACK {
                TriggerKind::Scheduled
            } else if late_by <= grace {
                TriggerKind::CatchUp
            } else {
                due.dropped.push(MissedFire {
                    task_id: *task_id,
                    name: job.name.clone(),
                    scheduled_for,
                    late_by,
                });
                continue;
            };

            job.last_fired_at = Some(now);
            due.firings.push(Firing {
                task_id: *task_id,
                name: job.name.clone(),
                scheduled_for,
                kind,
                callback: Arc::clone(&job.callback),
            });
        }
        due.firings.sort_by_key(|f| (f.scheduled_for, f.task_id));
        due
    }
}

/// Newest fire time in `(oldest, now]`, or `oldest` when there is none.
///
/// Only fires inside the grace window can change the outcome, so the walk
/// starts at the window's edge instead of at `oldest`.
fn latest_fire_at_or_before(
    descriptor: &ScheduleDescriptor,
    oldest: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(grace.max(ON_TIME_SLACK))
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .and_then(|edge| edge.checked_sub_signed(chrono::Duration::seconds(1)));
    let mut latest = oldest;
    if let Some(edge) = window.filter(|edge| *edge > oldest)
        && let Some(first) = next_fire_after(descriptor, edge).filter(|t| *t <= now)
    {
        latest = first;
    }
    while let Some(next) = next_fire_after(descriptor, latest).filter(|t| *t <= now) {
        latest = next;
    }
    latest
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            callback::{RunReport, callback_fn},
            expr::parse_schedule,
        },
        chrono::TimeZone,
        chrono_tz::UTC,
    };

    const HOUR: Duration = Duration::from_secs(3600);

    fn noop() -> Arc<dyn TaskCallback> {
        callback_fn(|_| async { Ok(RunReport::default()) })
    }

    fn desc(expr: &str) -> ScheduleDescriptor {
        parse_schedule(expr, UTC).unwrap()
    }

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, s).unwrap()
    }

    #[test]
    fn add_computes_next_fire() {
        let reg = JobRegistry::new();
        let next = reg.add(1, "daily", desc("0 9 * * *"), noop(), t(8, 0, 0));
        assert_eq!(next, Some(t(9, 0, 0)));
        assert_eq!(reg.next_fire_time(1), Some(t(9, 0, 0)));
        assert!(reg.contains(1));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn replace_discards_old_trigger() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        reg.add(1, "a", desc("30 8 * * *"), noop(), t(8, 0, 0));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.next_fire_time(1), Some(t(8, 30, 0)));
        assert_eq!(reg.descriptor(1).unwrap().expression(), "30 8 * * *");
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        assert!(reg.remove(1));
        assert!(!reg.remove(1));
        assert!(reg.is_empty());
        assert_eq!(reg.next_fire_time(1), None);
    }

    #[test]
    fn nothing_due_before_fire_time() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        let due = reg.take_due(t(8, 59, 59), HOUR);
        assert!(due.firings.is_empty());
        assert!(due.dropped.is_empty());
    }

    #[test]
    fn on_time_fire_advances_trigger() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        let due = reg.take_due(t(9, 0, 1), HOUR);
        assert_eq!(due.firings.len(), 1);
        assert_eq!(due.firings[0].kind, TriggerKind::Scheduled);
        assert_eq!(due.firings[0].scheduled_for, t(9, 0, 0));
        assert_eq!(
            reg.next_fire_time(1),
            Some(Utc.with_ymd_and_hms(2024, 6, 4, 9, 0, 0).unwrap())
        );
        assert!(reg.take_due(t(9, 0, 2), HOUR).firings.is_empty());
        assert_eq!(reg.list()[0].last_fired_at, Some(t(9, 0, 1)));
    }

    #[test]
    fn many_missed_fires_collapse_into_one_firing() {
        let reg = JobRegistry::new();
        reg.add(1, "every minute", desc("* * * * *"), noop(), t(8, 0, 0));
        // 20 minutes of missed fires; the 08:20 one is still on time.
        let due = reg.take_due(t(8, 20, 30), HOUR);
        assert_eq!(due.firings.len(), 1);
        assert_eq!(due.firings[0].kind, TriggerKind::Scheduled);
        assert_eq!(due.firings[0].scheduled_for, t(8, 20, 0));
        assert!(due.dropped.is_empty());
        assert_eq!(reg.next_fire_time(1), Some(t(8, 21, 0)));
    }

    #[test]
    fn catch_up_is_judged_by_newest_missed_fire() {
        let reg = JobRegistry::new();
        reg.add_with_missed(
            1,
            "hourly",
            desc("0 * * * *"),
            noop(),
            t(11, 20, 0),
            Some(t(9, 0, 0)),
        );
        // 09:00 is outside the window but 11:00 is only 20 minutes late.
        let due = reg.take_due(t(11, 20, 0), HOUR);
        assert!(due.dropped.is_empty());
        assert_eq!(due.firings.len(), 1);
        assert_eq!(due.firings[0].kind, TriggerKind::CatchUp);
        assert_eq!(due.firings[0].scheduled_for, t(11, 0, 0));
        assert_eq!(reg.next_fire_time(1), Some(t(12, 0, 0)));
    }

    #[test]
    fn long_stall_of_minutely_job_fires_once() {
        let reg = JobRegistry::new();
        reg.add(1, "every minute", desc("* * * * *"), noop(), t(0, 0, 0));
        let due = reg.take_due(t(23, 0, 30), Duration::ZERO);
        assert_eq!(due.firings.len(), 1);
        assert_eq!(due.firings[0].kind, TriggerKind::Scheduled);
        assert_eq!(due.firings[0].scheduled_for, t(23, 0, 0));
    }

    #[test]
    fn dropped_miss_reports_newest_fire() {
        let reg = JobRegistry::new();
        reg.add_with_missed(
            1,
            "hourly",
            desc("0 * * * *"),
            noop(),
            t(11, 20, 0),
            Some(t(9, 0, 0)),
        );
        let due = reg.take_due(t(11, 20, 0), Duration::from_secs(600));
        assert!(due.firings.is_empty());
        assert_eq!(due.dropped[0].scheduled_for, t(11, 0, 0));
        assert_eq!(due.dropped[0].late_by, Duration::from_secs(20 * 60));
    }

    #[test]
    fn miss_beyond_grace_is_dropped() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        let due = reg.take_due(t(11, 0, 0), HOUR);
        assert!(due.firings.is_empty());
        assert_eq!(due.dropped.len(), 1);
        assert_eq!(due.dropped[0].late_by, 2 * HOUR);
        assert!(reg.next_fire_time(1).unwrap() > t(11, 0, 0));
    }

    #[test]
    fn zero_grace_drops_late_fires_but_keeps_on_time_ones() {
        let reg = JobRegistry::new();
        reg.add(1, "a", desc("0 9 * * *"), noop(), t(8, 0, 0));
        reg.add(2, "b", desc("0 9 * * *"), noop(), t(8, 0, 0));
        let due = reg.take_due(t(9, 0, 2), Duration::ZERO);
        assert_eq!(due.firings.len(), 2);
        assert_eq!(due.firings[0].task_id, 1);

        reg.add(3, "c", desc("0 10 * * *"), noop(), t(8, 0, 0));
        let due = reg.take_due(t(10, 5, 0), Duration::ZERO);
        assert!(due.firings.is_empty());
        assert_eq!(due.dropped.len(), 1);
    }

    #[test]
    fn missed_fire_from_storage_is_caught_up() {
        let reg = JobRegistry::new();
        let next = reg.add_with_missed(
            1,
            "a",
            desc("0 9 * * *"),
            noop(),
            t(9, 30, 0),
            Some(t(9, 0, 0)),
        );
        assert_eq!(next, Some(t(9, 0, 0)));
        let due = reg.take_due(t(9, 30, 1), HOUR);
        assert_eq!(due.firings.len(), 1);
        assert_eq!(due.firings[0].kind, TriggerKind::CatchUp);
    }

    #[test]
    fn future_stored_fire_is_ignored() {
        let reg = JobRegistry::new();
        let next = reg.add_with_missed(
            1,
            "a",
            desc("0 9 * * *"),
            noop(),
            t(8, 0, 0),
            Some(t(12, 0, 0)),
        );
        assert_eq!(next, Some(t(9, 0, 0)));
    }

    #[test]
    fn impossible_schedule_never_comes_due() {
        let reg = JobRegistry::new();
        let next = reg.add(1, "never", desc("0 0 31 2 *"), noop(), t(8, 0, 0));
        assert_eq!(next, None);
        assert!(reg.take_due(t(23, 0, 0), HOUR).firings.is_empty());
        assert_eq!(reg.earliest_fire(), None);
    }

    #[test]
    fn list_is_sorted_snapshot() {
        let reg = JobRegistry::new();
        reg.add(5, "later", desc("0 10 * * *"), noop(), t(8, 0, 0));
        reg.add(2, "sooner", desc("0 9 * * *"), noop(), t(8, 0, 0));
        let list = reg.list();
        assert_eq!(list.iter().map(|s| s.task_id).collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(list[0].timezone, "UTC");
        assert_eq!(reg.earliest_fire(), Some(t(9, 0, 0)));
    }
}
