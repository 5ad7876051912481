//! Advisory lock serializing concurrent upgrade runs.
//!
//! The lock is an ordinary option holding the acquisition time in unix
//! seconds. Acquisition relies on the store's non-destructive `add`, so two
//! runs racing for a free lock cannot both win.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde_json::Value;

use crate::core::{MigrationError, Result, StoreResult};
use crate::options::keys;
use crate::storage::OptionStore;

pub fn acquire(store: &mut dyn OptionStore, timeout: Duration, now: DateTime<Utc>) -> Result<()> {
    if store.add(keys::UPGRADE_LOCK, Value::from(now.timestamp()))? {
        return Ok(());
    }

    match held_since(store)? {
        Some(since) if !is_stale(since, timeout, now) => {
            Err(MigrationError::UpgradeInProgress { since })
        }
        since => {
            warn!(
                "Taking over abandoned upgrade lock (held since {})",
                since.map_or_else(|| "an unreadable time".to_string(), |t| t.to_rfc3339())
            );
            store.set(keys::UPGRADE_LOCK, Value::from(now.timestamp()))?;
            Ok(())
        }
    }
}

pub fn release(store: &mut dyn OptionStore) -> StoreResult<bool> {
    store.delete(keys::UPGRADE_LOCK)
}

/// When the current holder took the lock. `None` if unset or unreadable.
pub fn held_since(store: &dyn OptionStore) -> StoreResult<Option<DateTime<Utc>>> {
    let Some(value) = store.get(keys::UPGRADE_LOCK)? else {
        return Ok(None);
    };
    let seconds = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(seconds.and_then(|s| Utc.timestamp_opt(s, 0).single()))
}

pub fn is_stale(since: DateTime<Utc>, timeout: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(since);
    match age.to_std() {
        Ok(age) => age >= timeout,
        // Acquired in the future: clock skew, treat as live.
        Err(_) => false,
    }
}
