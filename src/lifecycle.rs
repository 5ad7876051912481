//! Plugin activation, deactivation and uninstall.

use chrono::Utc;
use serde_json::Value;
use tracing::{Level, event, info_span};

use crate::context::UpgradeContext;
use crate::core::Result;
use crate::hooks::HookEvent;
use crate::migration::{Sequencer, UpgradeOutcome, lock};
use crate::options::{self, keys};

/// Seeds defaults, brings the schema up to date and flags the welcome redirect.
pub fn activate(ctx: &mut UpgradeContext, sequencer: &Sequencer) -> Result<UpgradeOutcome> {
    let span = info_span!("lifecycle.activate");
    let _enter = span.enter();

    let seeded = ctx.seed_default_options()?;
    let outcome = sequencer.run_upgrade(ctx)?;
    ctx.options_mut()
        .set(keys::ACTIVATION_REDIRECT, Value::Bool(true))?;

    event!(Level::INFO, seeded, outcome = ?outcome, "plugin activated");
    ctx.hooks().fire(&HookEvent::Activation);
    Ok(outcome)
}

/// Leaves schema and version alone; only transient state is cleared.
pub fn deactivate(ctx: &mut UpgradeContext) -> Result<()> {
    let span = info_span!("lifecycle.deactivate");
    let _enter = span.enter();

    ctx.seed_default_options()?;
    ctx.options_mut().delete(keys::ACTIVATION_REDIRECT)?;

    let timeout = ctx.config().lock_timeout;
    let stale = match lock::held_since(ctx.options())? {
        Some(since) => lock::is_stale(since, timeout, Utc::now()),
        None => ctx.options().contains(keys::UPGRADE_LOCK)?,
    };
    if stale {
        lock::release(ctx.options_mut())?;
        event!(Level::INFO, "stale upgrade lock removed");
    }

    ctx.hooks().fire(&HookEvent::Deactivation);
    Ok(())
}

/// Deletes every option the plugin owns, including the schema version.
///
/// Returns the number of options removed. Tables are left in place.
pub fn uninstall(ctx: &mut UpgradeContext) -> Result<usize> {
    let span = info_span!("lifecycle.uninstall");
    let _enter = span.enter();

    let mut deleted =
        options::delete_default_options(ctx.options.as_mut(), &ctx.hooks, &ctx.config)?;
    for key in [
        keys::DB_VERSION,
        keys::ACTIVE_COMPONENTS,
        keys::ACTIVATION_REDIRECT,
        keys::UPGRADE_LOCK,
        keys::SIGNUPS_MIGRATED,
        keys::IGNORE_DEPRECATED_CODE,
    ] {
        if ctx.options_mut().delete(key)? {
            deleted += 1;
        }
    }

    event!(Level::INFO, deleted, "plugin uninstalled");
    ctx.hooks().fire(&HookEvent::Uninstall);
    Ok(deleted)
}
