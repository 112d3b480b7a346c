//! Typed access to the known settings keys.
//!
//! The settings table is a generic key→JSON-scalar map so that keys written
//! by newer versions survive a round-trip through an older one. The two keys
//! the rest of the core depends on get typed accessors here; a stored value
//! of the wrong type is an error, not a silent default.

use serde_json::Value;

use crate::store::Store;
use crate::{AppError, AppResult};

pub const CURRENCY_SYMBOL: &str = "currencySymbol";
pub const NOTIFICATIONS_ENABLED: &str = "notificationsEnabled";

pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";

fn type_mismatch(key: &str, expected: &str, value: &Value) -> AppError {
    AppError::new("SETTINGS/TYPE_MISMATCH", "Setting has an unexpected type")
        .with_context("key", key)
        .with_context("expected", expected)
        .with_context("value", value.to_string())
}

impl Store {
    /// Display currency symbol; `"$"` when unset.
    pub async fn currency_symbol(&self) -> AppResult<String> {
        match self.get_setting(CURRENCY_SYMBOL).await? {
            Some(setting) => match setting.value.as_str() {
                Some(symbol) => Ok(symbol.to_string()),
                None => Err(type_mismatch(CURRENCY_SYMBOL, "string", &setting.value)),
            },
            None => Ok(DEFAULT_CURRENCY_SYMBOL.to_string()),
        }
    }

    pub async fn set_currency_symbol(&self, symbol: &str) -> AppResult<()> {
        self.put_setting(CURRENCY_SYMBOL, Value::String(symbol.to_string()))
            .await
    }

    /// Whether the scheduler may prompt for and deliver notifications;
    /// `false` when unset.
    pub async fn notifications_enabled(&self) -> AppResult<bool> {
        match self.get_setting(NOTIFICATIONS_ENABLED).await? {
            Some(setting) => match setting.value.as_bool() {
                Some(enabled) => Ok(enabled),
                None => Err(type_mismatch(NOTIFICATIONS_ENABLED, "bool", &setting.value)),
            },
            None => Ok(false),
        }
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) -> AppResult<()> {
        self.put_setting(NOTIFICATIONS_ENABLED, Value::Bool(enabled))
            .await
    }
}
