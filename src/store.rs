use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use crate::model::{
    entry_from_row, reminder_from_row, setting_from_row, vehicle_from_row, LedgerEntry, NewEntry,
    NewVehicle, Reminder, Setting, Vehicle, VehiclePatch,
};
use crate::observe::{ChangeBus, Table};
use crate::{db, migrate, AppError, AppResult};

/// Handle to the persistent store: the connection pool plus the change bus
/// live queries subscribe to. Cheap to clone; clones share both.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    bus: Arc<ChangeBus>,
}

impl Store {
    /// Open (creating if missing) the store at `path` and bring its schema
    /// up to date.
    pub async fn open(path: &Path) -> AppResult<Self> {
        let pool = db::open_sqlite_pool(path).await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self::from_pool(pool))
    }

    /// Open the store at its platform-default location.
    pub async fn open_default() -> AppResult<Self> {
        Self::open(&db::default_db_path()).await
    }

    /// Wrap an already-migrated pool. Tests use this with in-memory pools.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Store {
            pool,
            bus: Arc::new(ChangeBus::default()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub(crate) fn publish(&self, table: Table) {
        self.bus.publish(table);
    }

    // ---- vehicles ----

    pub async fn add_vehicle(&self, new: NewVehicle) -> AppResult<i64> {
        let res = sqlx::query("INSERT INTO vehicles (alias, plate) VALUES (?, ?)")
            .bind(&new.alias)
            .bind(&new.plate)
            .execute(&self.pool)
            .await?;
        let id = res.last_insert_rowid();
        self.publish(Table::Vehicles);
        info!(target = "fleetledger", event = "vehicle_added", id);
        Ok(id)
    }

    pub async fn get_vehicle(&self, id: i64) -> AppResult<Option<Vehicle>> {
        let row = sqlx::query("SELECT id, alias, plate FROM vehicles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    pub async fn list_vehicles(&self) -> AppResult<Vec<Vehicle>> {
        let rows = sqlx::query("SELECT id, alias, plate FROM vehicles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(vehicle_from_row).collect()
    }

    /// Merge `patch` into the vehicle. Fails with `STORE/NOT_FOUND` when the
    /// id is absent.
    pub async fn update_vehicle(&self, id: i64, patch: VehiclePatch) -> AppResult<()> {
        let res = sqlx::query(
            "UPDATE vehicles SET alias = COALESCE(?, alias), plate = COALESCE(?, plate) WHERE id = ?",
        )
        .bind(&patch.alias)
        .bind(&patch.plate)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::new("STORE/NOT_FOUND", "Vehicle not found")
                .with_context("id", id.to_string()));
        }
        self.publish(Table::Vehicles);
        Ok(())
    }

    /// Idempotent: deleting an absent id is not an error.
    pub async fn delete_vehicle(&self, id: i64) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM vehicles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            self.publish(Table::Vehicles);
        }
        Ok(())
    }

    // ---- ledger entries ----

    pub async fn add_entry(&self, new: NewEntry) -> AppResult<i64> {
        if new.amount_cents < 0 {
            return Err(
                AppError::new("LEDGER/NEGATIVE_AMOUNT", "Amounts must not be negative")
                    .with_context("amount_cents", new.amount_cents.to_string()),
            );
        }
        let res = sqlx::query(
            "INSERT INTO entries (vehicle_id, date, kind, amount_cents, description) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new.vehicle_id)
        .bind(&new.date)
        .bind(new.kind.as_str())
        .bind(new.amount_cents)
        .bind(&new.description)
        .execute(&self.pool)
        .await?;
        let id = res.last_insert_rowid();
        self.publish(Table::Entries);
        info!(
            target = "fleetledger",
            event = "entry_added",
            id,
            kind = new.kind.as_str(),
            amount_cents = new.amount_cents
        );
        Ok(id)
    }

    pub async fn get_entry(&self, id: i64) -> AppResult<Option<LedgerEntry>> {
        let row = sqlx::query(
            "SELECT id, vehicle_id, date, kind, amount_cents, description FROM entries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    pub async fn list_entries(&self) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, vehicle_id, date, kind, amount_cents, description FROM entries ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Idempotent: deleting an absent id is not an error.
    pub async fn delete_entry(&self, id: i64) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            self.publish(Table::Entries);
        }
        Ok(())
    }

    // ---- settings ----

    /// Upsert by key. Values must be JSON scalars; objects and arrays are
    /// rejected.
    pub async fn put_setting(&self, key: &str, value: Value) -> AppResult<()> {
        if value.is_object() || value.is_array() {
            return Err(
                AppError::new("SETTINGS/NON_SCALAR", "Setting values must be JSON scalars")
                    .with_context("key", key),
            );
        }
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        self.publish(Table::Settings);
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> AppResult<Option<Setting>> {
        let row = sqlx::query("SELECT key, value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(setting_from_row).transpose()
    }

    pub async fn list_settings(&self) -> AppResult<Vec<Setting>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(setting_from_row).collect()
    }

    // ---- reminders ----

    pub async fn insert_reminder(&self, reminder: &Reminder) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO reminders (id, hour, minute, title, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&reminder.id)
        .bind(reminder.hour as i64)
        .bind(reminder.minute as i64)
        .bind(&reminder.title)
        .bind(&reminder.body)
        .execute(&self.pool)
        .await?;
        self.publish(Table::Reminders);
        Ok(())
    }

    pub async fn get_reminder(&self, id: &str) -> AppResult<Option<Reminder>> {
        let row = sqlx::query("SELECT id, hour, minute, title, body FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(reminder_from_row).transpose()
    }

    pub async fn list_reminders(&self) -> AppResult<Vec<Reminder>> {
        let rows = sqlx::query("SELECT id, hour, minute, title, body FROM reminders ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(reminder_from_row).collect()
    }

    /// Idempotent: deleting an absent id is not an error.
    pub async fn delete_reminder(&self, id: &str) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            self.publish(Table::Reminders);
        }
        Ok(())
    }
}
