use anyhow::Result;
use fleetledger::{migrate, EntryKind, NewEntry, NewVehicle, Store, VehiclePatch};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;

async fn memory_store() -> Result<Store> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate::apply_migrations(&pool).await?;
    Ok(Store::from_pool(pool))
}

fn entry_for(vehicle_id: i64, date: &str, kind: EntryKind, amount_cents: i64) -> NewEntry {
    NewEntry {
        vehicle_id,
        date: date.to_string(),
        kind,
        amount_cents,
        description: String::new(),
    }
}

#[tokio::test]
async fn vehicle_crud_round_trip() -> Result<()> {
    fleetledger::logging::init();
    let store = memory_store().await?;

    let id = store
        .add_vehicle(NewVehicle {
            alias: "Red Bike".into(),
            plate: "ABC123".into(),
        })
        .await?;

    let vehicle = store.get_vehicle(id).await?.expect("vehicle present");
    assert_eq!(vehicle.alias, "Red Bike");
    assert_eq!(vehicle.plate, "ABC123");

    store
        .update_vehicle(
            id,
            VehiclePatch {
                alias: Some("Blue Bike".into()),
                ..VehiclePatch::default()
            },
        )
        .await?;
    let vehicle = store.get_vehicle(id).await?.expect("vehicle present");
    assert_eq!(vehicle.alias, "Blue Bike");
    // Unpatched fields keep their value.
    assert_eq!(vehicle.plate, "ABC123");

    store.delete_vehicle(id).await?;
    assert!(store.get_vehicle(id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn update_missing_vehicle_is_not_found() -> Result<()> {
    let store = memory_store().await?;
    let err = store
        .update_vehicle(999, VehiclePatch::default())
        .await
        .expect_err("update of missing id should fail");
    assert_eq!(err.code(), "STORE/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> Result<()> {
    let store = memory_store().await?;
    store.delete_vehicle(12345).await?;
    store.delete_entry(12345).await?;
    store.delete_reminder("no-such-id").await?;
    Ok(())
}

#[tokio::test]
async fn ids_are_never_reused() -> Result<()> {
    let store = memory_store().await?;
    let first = store
        .add_vehicle(NewVehicle {
            alias: "A".into(),
            plate: "1".into(),
        })
        .await?;
    store.delete_vehicle(first).await?;
    let second = store
        .add_vehicle(NewVehicle {
            alias: "B".into(),
            plate: "2".into(),
        })
        .await?;
    assert!(second > first);
    Ok(())
}

#[tokio::test]
async fn negative_amounts_are_rejected() -> Result<()> {
    let store = memory_store().await?;
    let err = store
        .add_entry(entry_for(1, "2024-03-15", EntryKind::Expense, -1))
        .await
        .expect_err("negative amount should fail");
    assert_eq!(err.code(), "LEDGER/NEGATIVE_AMOUNT");
    Ok(())
}

#[tokio::test]
async fn fresh_store_seeds_default_settings() -> Result<()> {
    let store = memory_store().await?;
    assert_eq!(store.currency_symbol().await?, "$");
    assert!(!store.notifications_enabled().await?);
    Ok(())
}

#[tokio::test]
async fn settings_survive_reopen_without_reseeding() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("fleetledger.sqlite3");

    {
        let store = Store::open(&db_path).await?;
        store.set_currency_symbol("€").await?;
        store.pool().close().await;
    }

    let store = Store::open(&db_path).await?;
    assert_eq!(store.currency_symbol().await?, "€");
    Ok(())
}

#[tokio::test]
async fn unknown_setting_keys_round_trip() -> Result<()> {
    let store = memory_store().await?;
    store.put_setting("themeVariant", json!("dark")).await?;
    let setting = store
        .get_setting("themeVariant")
        .await?
        .expect("setting present");
    assert_eq!(setting.value, Value::String("dark".into()));
    Ok(())
}

#[tokio::test]
async fn non_scalar_settings_are_rejected() -> Result<()> {
    let store = memory_store().await?;
    let err = store
        .put_setting("broken", json!({ "nested": true }))
        .await
        .expect_err("objects should be rejected");
    assert_eq!(err.code(), "SETTINGS/NON_SCALAR");
    Ok(())
}

#[tokio::test]
async fn mistyped_known_setting_fails_loudly() -> Result<()> {
    let store = memory_store().await?;
    store.put_setting("notificationsEnabled", json!("yes")).await?;
    let err = store
        .notifications_enabled()
        .await
        .expect_err("string is not a bool");
    assert_eq!(err.code(), "SETTINGS/TYPE_MISMATCH");
    Ok(())
}

#[tokio::test]
async fn march_scenario_monthly_totals() -> Result<()> {
    use chrono::NaiveDate;
    use fleetledger::ledger;

    let store = memory_store().await?;
    let vehicle_id = store
        .add_vehicle(NewVehicle {
            alias: "Red Bike".into(),
            plate: "ABC123".into(),
        })
        .await?;
    store
        .add_entry(entry_for(vehicle_id, "2024-03-15", EntryKind::Income, 5000))
        .await?;

    let entries = store.list_entries().await?;
    let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
    let totals = ledger::monthly_totals(&entries, anchor);
    assert_eq!(totals.income, 5000);
    assert_eq!(totals.expense, 0);
    assert_eq!(totals.net, 5000);
    Ok(())
}

#[tokio::test]
async fn orphaned_entries_resolve_to_unknown_vehicle() -> Result<()> {
    use fleetledger::ledger;

    let store = memory_store().await?;
    let vehicle_id = store
        .add_vehicle(NewVehicle {
            alias: "Red Bike".into(),
            plate: "ABC123".into(),
        })
        .await?;
    store
        .add_entry(entry_for(vehicle_id, "2024-03-15", EntryKind::Income, 100))
        .await?;
    store.delete_vehicle(vehicle_id).await?;

    let entries = store.list_entries().await?;
    let vehicles = store.list_vehicles().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(
        ledger::vehicle_label(&vehicles, entries[0].vehicle_id),
        ledger::UNKNOWN_VEHICLE_LABEL
    );
    Ok(())
}
