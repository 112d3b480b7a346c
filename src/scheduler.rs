//! Recurring daily reminders.
//!
//! Each armed reminder is owned by exactly one timer task, held in an
//! id→handle map. The task loops: compute the delay to the next
//! `hour:minute` from the wall clock, sleep, fire, repeat. Every re-arm
//! recomputes from "now", so system sleep or clock changes are corrected at
//! the next cycle rather than accumulating. Delivery is permission-gated,
//! but a denied reminder keeps ticking silently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::id::new_uuid_v7;
use crate::model::{NewReminder, Reminder};
use crate::store::Store;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Not yet decided; the backend may prompt.
    Prompt,
}

/// Delivery backend. A re-fire with the same `tag` replaces the previous
/// notification rather than stacking a new one.
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;
    /// Prompt the user and return the outcome. Only called while the stored
    /// state is [`Permission::Prompt`]; a denial is never re-prompted.
    fn request_permission(&self) -> Permission;
    fn notify(&self, tag: &str, title: &str, body: &str);
}

/// Headless backend: treats permission as granted and emits notifications
/// as tracing events.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn notify(&self, tag: &str, title: &str, body: &str) {
        info!(target = "fleetledger", event = "notification", tag, title, body);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("hour {0} out of range 0-23")]
    HourOutOfRange(u32),
    #[error("minute {0} out of range 0-59")]
    MinuteOutOfRange(u32),
}

impl From<ScheduleError> for AppError {
    fn from(error: ScheduleError) -> Self {
        AppError::new("SCHEDULE/INVALID_TIME", error.to_string())
    }
}

/// Delay until the next `hour:minute` on the local wall clock: today's if it
/// is still ahead, otherwise tomorrow's.
pub fn next_fire_delay(now: DateTime<Local>, hour: u32, minute: u32) -> Duration {
    let now_naive = now.naive_local();
    let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
        return Duration::from_secs(24 * 60 * 60);
    };
    let mut target = now_naive.date().and_time(time);
    if target <= now_naive {
        target += chrono::Duration::days(1);
    }
    (target - now_naive).to_std().unwrap_or(Duration::ZERO)
}

pub struct ReminderScheduler {
    store: Store,
    notifier: Arc<dyn Notifier>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    // Timer tasks hold this weakly and exit once the scheduler is gone.
    weak: Weak<ReminderScheduler>,
}

impl ReminderScheduler {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new_cyclic(|weak| ReminderScheduler {
            store,
            notifier,
            timers: Mutex::new(HashMap::new()),
            weak: weak.clone(),
        })
    }

    fn lock_timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm a timer for every persisted reminder. Called once at startup so
    /// reminders survive process restarts without waiting for user activity.
    pub async fn start(&self) -> AppResult<usize> {
        let reminders = self.store.list_reminders().await?;
        let count = reminders.len();
        for reminder in reminders {
            self.arm(reminder);
        }
        info!(
            target = "fleetledger",
            event = "scheduler_started",
            armed = count
        );
        Ok(count)
    }

    /// Persist a new daily reminder and arm its timer. Returns the fresh id.
    pub async fn schedule_daily_reminder(&self, new: NewReminder) -> AppResult<String> {
        if new.hour > 23 {
            return Err(ScheduleError::HourOutOfRange(new.hour).into());
        }
        if new.minute > 59 {
            return Err(ScheduleError::MinuteOutOfRange(new.minute).into());
        }
        let reminder = Reminder {
            id: new_uuid_v7(),
            hour: new.hour,
            minute: new.minute,
            title: new.title,
            body: new.body,
        };
        self.store.insert_reminder(&reminder).await?;
        let id = reminder.id.clone();
        info!(
            target = "fleetledger",
            event = "reminder_scheduled",
            id = %id,
            hour = reminder.hour,
            minute = reminder.minute
        );
        self.arm(reminder);
        Ok(id)
    }

    /// Disarm and forget a reminder. The timer is dead before this returns;
    /// a fire already in flight may still complete once. Unknown ids are a
    /// no-op.
    pub async fn cancel_reminder(&self, id: &str) -> AppResult<()> {
        if let Some(handle) = self.lock_timers().remove(id) {
            handle.abort();
            info!(target = "fleetledger", event = "reminder_cancelled", id = %id);
        }
        self.store.delete_reminder(id).await
    }

    /// Snapshot of the persisted reminders; the caller owns the copy.
    pub async fn list_reminders(&self) -> AppResult<Vec<Reminder>> {
        self.store.list_reminders().await
    }

    /// Number of reminders with a live timer.
    pub fn armed_count(&self) -> usize {
        self.lock_timers().len()
    }

    /// Resolve notification permission without re-prompting a stored
    /// decision. Always `false` while notifications are disabled in
    /// settings; the toggle gates the prompt itself.
    pub async fn ensure_permission(&self) -> AppResult<bool> {
        if !self.store.notifications_enabled().await? {
            return Ok(false);
        }
        Ok(match self.notifier.permission() {
            Permission::Granted => true,
            Permission::Denied => false,
            Permission::Prompt => {
                matches!(self.notifier.request_permission(), Permission::Granted)
            }
        })
    }

    /// Immediate permission-gated delivery, for letting the user verify
    /// their notification setup. Returns whether it was delivered.
    pub async fn test_notification(&self, title: &str, body: &str) -> AppResult<bool> {
        let granted = self.ensure_permission().await?;
        if granted {
            self.notifier.notify("test", title, body);
        }
        Ok(granted)
    }

    fn arm(&self, reminder: Reminder) {
        let weak = self.weak.clone();
        let id = reminder.id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let delay = next_fire_delay(Local::now(), reminder.hour, reminder.minute);
                tokio::time::sleep(delay).await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                scheduler.fire(&reminder).await;
            }
        });
        // One timer per id: arming again supersedes the previous task.
        if let Some(old) = self.lock_timers().insert(id, handle) {
            old.abort();
        }
    }

    async fn fire(&self, reminder: &Reminder) {
        match self.ensure_permission().await {
            Ok(true) => {
                self.notifier
                    .notify(&reminder.id, &reminder.title, &reminder.body);
                info!(target = "fleetledger", event = "reminder_fired", id = %reminder.id);
            }
            Ok(false) => {
                debug!(target = "fleetledger", event = "reminder_suppressed", id = %reminder.id);
            }
            Err(err) => {
                warn!(
                    target = "fleetledger",
                    event = "reminder_permission_check_failed",
                    id = %reminder.id,
                    error = %err
                );
            }
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.lock_timers().drain() {
            handle.abort();
        }
    }
}
