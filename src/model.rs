use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::ledger::Cents;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    pub alias: String,
    pub plate: String,
}

#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub alias: String,
    pub plate: String,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct VehiclePatch {
    pub alias: Option<String>,
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "income" => Ok(EntryKind::Income),
            "expense" => Ok(EntryKind::Expense),
            other => Err(AppError::new("LEDGER/UNKNOWN_KIND", "Unknown entry kind")
                .with_context("kind", other)),
        }
    }
}

/// A single income or expense record attached to a vehicle. Immutable once
/// created except for delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    /// Soft reference; the vehicle may have been deleted since.
    pub vehicle_id: i64,
    /// ISO-8601 date or date-time string.
    pub date: String,
    pub kind: EntryKind,
    pub amount_cents: Cents,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub vehicle_id: i64,
    pub date: String,
    pub kind: EntryKind,
    pub amount_cents: Cents,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    /// JSON scalar; objects and arrays are rejected at the store boundary.
    pub value: Value,
}

/// One persisted recurring daily alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub hour: u32,
    pub minute: u32,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub hour: u32,
    pub minute: u32,
    pub title: String,
    pub body: String,
}

pub(crate) fn vehicle_from_row(row: &SqliteRow) -> AppResult<Vehicle> {
    Ok(Vehicle {
        id: row.try_get("id")?,
        alias: row.try_get("alias")?,
        plate: row.try_get("plate")?,
    })
}

pub(crate) fn entry_from_row(row: &SqliteRow) -> AppResult<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        date: row.try_get("date")?,
        kind: EntryKind::parse(&kind)?,
        amount_cents: row.try_get("amount_cents")?,
        description: row.try_get("description")?,
    })
}

pub(crate) fn setting_from_row(row: &SqliteRow) -> AppResult<Setting> {
    let raw: String = row.try_get("value")?;
    Ok(Setting {
        key: row.try_get("key")?,
        value: serde_json::from_str(&raw)?,
    })
}

pub(crate) fn reminder_from_row(row: &SqliteRow) -> AppResult<Reminder> {
    let hour: i64 = row.try_get("hour")?;
    let minute: i64 = row.try_get("minute")?;
    Ok(Reminder {
        id: row.try_get("id")?,
        hour: hour as u32,
        minute: minute as u32,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
    })
}
