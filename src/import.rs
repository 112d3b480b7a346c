//! Destructive snapshot import.
//!
//! Importing replaces the entire contents of all four tables inside one
//! transaction, preserving the snapshot's row ids. A failure at any point
//! rolls back, leaving the store exactly as it was, still open and usable.

use std::fs;
use std::path::Path;

use futures::FutureExt;
use sqlx::{Sqlite, Transaction};
use tracing::info;

use crate::db::run_in_tx;
use crate::export::Snapshot;
use crate::observe::ALL_TABLES;
use crate::store::Store;
use crate::{migrate, AppError, AppResult};

pub fn read_snapshot(path: &Path) -> AppResult<Snapshot> {
    let bytes = fs::read(path)
        .map_err(|err| AppError::from(err).with_context("path", path.display().to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Replace the whole store with `snapshot`. The snapshot's schema version
/// must be part of this build's migration history; anything newer (or
/// foreign) is rejected before any row is touched. The live schema is
/// already fully migrated, so a snapshot taken at an older version restores
/// into the current schema, with tables it predates left empty.
pub async fn apply_snapshot(store: &Store, snapshot: &Snapshot) -> AppResult<()> {
    if !migrate::is_known_version(&snapshot.schema_version) {
        return Err(AppError::new(
            "SNAPSHOT/VERSION_UNSUPPORTED",
            "Snapshot was written by an unknown schema version",
        )
        .with_context("schema_version", snapshot.schema_version.clone()));
    }

    let tables = snapshot.tables.clone();
    run_in_tx::<_, AppError, _>(store.pool(), move |tx: &mut Transaction<'static, Sqlite>| {
        async move {
            for table in ["entries", "vehicles", "reminders", "settings"] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut **tx)
                    .await?;
            }

            for vehicle in &tables.vehicles {
                sqlx::query("INSERT INTO vehicles (id, alias, plate) VALUES (?, ?, ?)")
                    .bind(vehicle.id)
                    .bind(&vehicle.alias)
                    .bind(&vehicle.plate)
                    .execute(&mut **tx)
                    .await?;
            }

            for entry in &tables.entries {
                sqlx::query(
                    "INSERT INTO entries (id, vehicle_id, date, kind, amount_cents, description) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(entry.id)
                .bind(entry.vehicle_id)
                .bind(&entry.date)
                .bind(entry.kind.as_str())
                .bind(entry.amount_cents)
                .bind(&entry.description)
                .execute(&mut **tx)
                .await?;
            }

            for setting in &tables.settings {
                let raw = serde_json::to_string(&setting.value)?;
                sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                    .bind(&setting.key)
                    .bind(raw)
                    .execute(&mut **tx)
                    .await?;
            }

            for reminder in &tables.reminders {
                sqlx::query(
                    "INSERT INTO reminders (id, hour, minute, title, body) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&reminder.id)
                .bind(reminder.hour as i64)
                .bind(reminder.minute as i64)
                .bind(&reminder.title)
                .bind(&reminder.body)
                .execute(&mut **tx)
                .await?;
            }

            Ok(())
        }
        .boxed()
    })
    .await?;

    // The replace landed; every live query needs a fresh snapshot.
    for table in ALL_TABLES {
        store.publish(table);
    }
    info!(
        target = "fleetledger",
        event = "import_applied",
        schema_version = %snapshot.schema_version
    );
    Ok(())
}

/// Read a snapshot file and replace the store with it.
pub async fn import_file(store: &Store, path: &Path) -> AppResult<()> {
    let snapshot = read_snapshot(path)?;
    apply_snapshot(store, &snapshot).await
}
