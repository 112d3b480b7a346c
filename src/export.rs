//! Full-store snapshot export.
//!
//! A snapshot is a single JSON document carrying the schema version it was
//! taken at plus every row of every table. Older snapshots stay importable:
//! tables they predate simply come back empty.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{LedgerEntry, Reminder, Setting, Vehicle};
use crate::store::Store;
use crate::time::now_ms;
use crate::{migrate, AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: String,
    pub exported_at_ms: i64,
    pub app_version: String,
    #[serde(default)]
    pub tables: SnapshotTables,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotTables {
    pub vehicles: Vec<Vehicle>,
    pub entries: Vec<LedgerEntry>,
    pub settings: Vec<Setting>,
    pub reminders: Vec<Reminder>,
}

/// Copy every row of every table, stamped with the current schema version.
pub async fn snapshot(store: &Store) -> AppResult<Snapshot> {
    Ok(Snapshot {
        schema_version: migrate::current_schema_version(store.pool()).await?,
        exported_at_ms: now_ms(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        tables: SnapshotTables {
            vehicles: store.list_vehicles().await?,
            entries: store.list_entries().await?,
            settings: store.list_settings().await?,
            reminders: store.list_reminders().await?,
        },
    })
}

/// Write a snapshot to `<out_parent>/fleet-backup-YYYY-MM-DD[-NN].json` and
/// return the path.
pub async fn write_snapshot(store: &Store, out_parent: &Path) -> AppResult<PathBuf> {
    let snap = snapshot(store).await?;
    fs::create_dir_all(out_parent).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_out_parent")
            .with_context("path", out_parent.display().to_string())
    })?;
    let date = Local::now().format("%Y-%m-%d").to_string();
    let path = unique_snapshot_path(out_parent, &date)?;
    let bytes = serde_json::to_vec_pretty(&snap)?;
    fs::write(&path, bytes)
        .map_err(|err| AppError::from(err).with_context("path", path.display().to_string()))?;
    info!(
        target = "fleetledger",
        event = "export_written",
        path = %path.display(),
        schema_version = %snap.schema_version
    );
    Ok(path)
}

fn unique_snapshot_path(parent: &Path, date: &str) -> AppResult<PathBuf> {
    let base = parent.join(format!("fleet-backup-{date}.json"));
    if !base.exists() {
        return Ok(base);
    }
    for n in 1..100u32 {
        let candidate = parent.join(format!("fleet-backup-{date}-{n:02}.json"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(
        AppError::new("EXPORT/NO_FREE_NAME", "Could not allocate a backup filename")
            .with_context("parent", parent.display().to_string()),
    )
}
