//! Local-first core for a small-fleet income/expense tracker.
//!
//! Four durable tables (vehicles, ledger entries, settings, reminders) live
//! in a versioned SQLite store. Reads can be wrapped in live queries that
//! re-deliver whenever a write touches a table they depend on; monthly and
//! range summaries are pure functions over those snapshots; and a scheduler
//! keeps one self-re-arming daily timer per persisted reminder.

pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod ledger;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod observe;
pub mod scheduler;
pub mod settings;
pub mod store;

mod id;
mod time;

pub use error::{AppError, AppResult};
pub use ledger::{Cents, DaySummary, MonthCursor, MonthlyTotals, RangeSummary};
pub use model::{
    EntryKind, LedgerEntry, NewEntry, NewReminder, NewVehicle, Reminder, Setting, Vehicle,
    VehiclePatch,
};
pub use observe::{LiveQuery, Table};
pub use scheduler::{Notifier, Permission, ReminderScheduler, TracingNotifier};
pub use store::Store;
