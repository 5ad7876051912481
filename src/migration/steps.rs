//! The migrations shipped with the core, one per historical schema change.
//!
//! Each step re-checks the state it produces, so running it against an
//! already-migrated store changes nothing.

use log::debug;
use serde_json::{Map, Value};

use super::{MigrationPlan, MigrationStep};
use crate::component::ComponentSet;
use crate::context::UpgradeContext;
use crate::core::{Result, StepError, StepResult};
use crate::options::{self, keys};

/// Every shipped step, in threshold order.
pub fn default_plan() -> Result<MigrationPlan> {
    MigrationPlan::new()
        .with_step(MigrationStep::new(1801, "page_mappings", update_page_mappings))?
        .with_step(MigrationStep::new(6067, "default_options", seed_default_options))?
        .with_step(MigrationStep::new(7553, "enable_notifications", enable_notifications))?
        .with_step(MigrationStep::new(7731, "retain_bp_default", retain_bp_default))?
        .with_step(MigrationStep::new(7892, "install_signups", install_signups))?
        .with_step(MigrationStep::new(8311, "repair_signups", repair_signups))?
        .with_step(MigrationStep::new(9181, "prune_deactivated", prune_deactivated_components))?
        .with_step(MigrationStep::new(9615, "theme_package", set_theme_package))
}

fn active_components(ctx: &UpgradeContext) -> StepResult<ComponentSet> {
    Ok(ComponentSet::load(ctx.options())?.unwrap_or_default())
}

/// Drops directory page mappings of components that are no longer active.
fn update_page_mappings(ctx: &mut UpgradeContext) -> StepResult<()> {
    let active = active_components(ctx)?;
    let mut pages = match ctx.options().get(keys::PAGES)? {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(StepError::msg(format!(
                "'{}' should map components to page ids, found {}",
                keys::PAGES,
                other
            )));
        }
    };

    let before = pages.len();
    pages.retain(|component, _| active.is_active(component));
    if pages.len() != before {
        debug!("Dropped {} stale page mapping(s)", before - pages.len());
    }
    ctx.options_mut().set(keys::PAGES, Value::Object(pages))?;
    Ok(())
}

fn seed_default_options(ctx: &mut UpgradeContext) -> StepResult<()> {
    let added = ctx.seed_default_options()?;
    debug!("Seeded {} missing default option(s)", added);
    Ok(())
}

fn enable_notifications(ctx: &mut UpgradeContext) -> StepResult<()> {
    let mut active = active_components(ctx)?;
    if active.insert("notifications") {
        active.save(ctx.options_mut())?;
    }
    let installer = ctx.installer();
    installer.install_component(ctx.schema_mut(), "notifications")?;
    Ok(())
}

/// Sites still running the legacy theme keep it.
fn retain_bp_default(ctx: &mut UpgradeContext) -> StepResult<()> {
    let template = options::get_string(ctx.options(), keys::TEMPLATE, "")?;
    if template == "bp-default" {
        ctx.options_mut().set(keys::RETAIN_BP_DEFAULT, Value::Bool(true))?;
    } else {
        ctx.options_mut().add(keys::RETAIN_BP_DEFAULT, Value::Bool(false))?;
    }
    Ok(())
}

fn install_signups(ctx: &mut UpgradeContext) -> StepResult<()> {
    let installer = ctx.installer();
    installer.install_component(ctx.schema_mut(), "members")?;
    ctx.options_mut().set(keys::SIGNUPS_MIGRATED, Value::Bool(true))?;
    Ok(())
}

/// Re-applies the signups table, adding the indexes older installs lack.
fn repair_signups(ctx: &mut UpgradeContext) -> StepResult<()> {
    let installer = ctx.installer();
    let report = installer.install_component(ctx.schema_mut(), "members")?;
    if !report.is_noop() {
        debug!("Repaired signups table: {:?}", report);
    }
    Ok(())
}

/// Components that are active again are no longer "deactivated".
fn prune_deactivated_components(ctx: &mut UpgradeContext) -> StepResult<()> {
    let active = active_components(ctx)?;
    let deactivated = match ctx.options().get(keys::DEACTIVATED_COMPONENTS)? {
        None => return Ok(()),
        Some(value) => ComponentSet::from_option(&value).map_err(|reason| {
            StepError::msg(format!(
                "'{}' is unreadable: {}",
                keys::DEACTIVATED_COMPONENTS,
                reason
            ))
        })?,
    };

    let remaining: Vec<Value> = deactivated
        .ids()
        .filter(|id| !active.is_active(id))
        .map(Value::from)
        .collect();
    ctx.options_mut()
        .set(keys::DEACTIVATED_COMPONENTS, Value::Array(remaining))?;
    Ok(())
}

fn set_theme_package(ctx: &mut UpgradeContext) -> StepResult<()> {
    ctx.options_mut()
        .add(keys::THEME_PACKAGE_ID, Value::from("legacy"))?;
    Ok(())
}
