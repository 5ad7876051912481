/// Lifecycle and shipped-plan tests
///
/// Activation, deactivation and uninstall against memory and file-backed stores.
/// Run with: cargo test --test lifecycle_tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use bpcore::component::ComponentSet;
use bpcore::lifecycle;
use bpcore::options::{self, keys};
use bpcore::{
    FileOptionStore, FileSchema, Hook, MemoryOptionStore, MemorySchema, OptionStore,
    SchemaBackend, Sequencer, UpgradeConfig, UpgradeContext, UpgradeOutcome,
};
use serde_json::json;
use tempfile::tempdir;

fn memory_context(values: Vec<(&str, serde_json::Value)>) -> UpgradeContext {
    UpgradeContext::new(
        Box::new(MemoryOptionStore::with_values(values)),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new(),
    )
}

#[test]
fn test_activate_fresh_site() -> Result<()> {
    let mut ctx = memory_context(vec![]);
    let activations = Arc::new(AtomicUsize::new(0));
    let counter = activations.clone();
    ctx.hooks_mut().add(Hook::Activation, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let outcome = lifecycle::activate(&mut ctx, &Sequencer::with_default_plan()?)?;

    assert!(matches!(outcome, UpgradeOutcome::Installed { .. }));
    assert_eq!(activations.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.options().get(keys::DB_VERSION)?, Some(json!(9695)));
    assert_eq!(ctx.options().get(keys::ACTIVATION_REDIRECT)?, Some(json!(true)));
    assert_eq!(ctx.options().get(keys::THEME_PACKAGE_ID)?, Some(json!("legacy")));
    assert_eq!(
        ctx.options().get("bp-xprofile-base-group-name")?,
        Some(json!("Base"))
    );
    Ok(())
}

#[test]
fn test_reactivation_keeps_operator_settings() -> Result<()> {
    let mut ctx = memory_context(vec![]);
    let sequencer = Sequencer::with_default_plan()?;
    lifecycle::activate(&mut ctx, &sequencer)?;

    ctx.options_mut().set("hide-loggedout-adminbar", json!(true))?;
    lifecycle::deactivate(&mut ctx)?;
    let outcome = lifecycle::activate(&mut ctx, &sequencer)?;

    assert!(!outcome.changed());
    assert_eq!(ctx.options().get("hide-loggedout-adminbar")?, Some(json!(true)));
    Ok(())
}

#[test]
fn test_uninstall_removes_options_but_keeps_tables() -> Result<()> {
    let mut ctx = memory_context(vec![("blogname", json!("Community"))]);
    lifecycle::activate(&mut ctx, &Sequencer::with_default_plan()?)?;
    assert!(ctx.schema().table_exists("wp_bp_activity"));

    let deleted = lifecycle::uninstall(&mut ctx)?;

    assert!(deleted > options::default_options(ctx.config()).len());
    assert_eq!(ctx.options().get(keys::DB_VERSION)?, None);
    assert_eq!(ctx.options().get(keys::ACTIVE_COMPONENTS)?, None);
    assert_eq!(ctx.options().keys()?, vec!["blogname".to_string()]);
    assert!(ctx.schema().table_exists("wp_bp_activity"));

    // A later activation is a fresh install again.
    let outcome = lifecycle::activate(&mut ctx, &Sequencer::with_default_plan()?)?;
    assert!(matches!(outcome, UpgradeOutcome::Installed { .. }));
    Ok(())
}

#[test]
fn test_shipped_plan_upgrades_legacy_site() -> Result<()> {
    let mut ctx = memory_context(vec![
        (keys::DB_VERSION, json!("1000")),
        (keys::ACTIVE_COMPONENTS, json!({"activity": 1, "groups": 1})),
        (keys::PAGES, json!({"activity": 2, "groups": 3, "forums": 4})),
        (keys::DEACTIVATED_COMPONENTS, json!({"groups": 1, "forums": 1})),
        (keys::TEMPLATE, json!("bp-default")),
    ]);

    let outcome = Sequencer::with_default_plan()?.run_upgrade(&mut ctx)?;

    let UpgradeOutcome::Upgraded { applied, report, .. } = outcome else {
        panic!("expected an upgrade");
    };
    assert_eq!(applied.len(), 8);
    assert!(report.created_tables.contains(&"wp_bp_groups_members".to_string()));

    let active = ComponentSet::load(ctx.options())?.unwrap();
    assert!(active.is_active("notifications"));
    assert!(ctx.schema().table_exists("wp_bp_notifications"));
    assert!(ctx.schema().table_exists("wp_bp_signups"));
    assert!(!ctx.schema().table_exists("wp_bp_friends"));

    assert_eq!(
        ctx.options().get(keys::PAGES)?,
        Some(json!({"activity": 2, "groups": 3}))
    );
    assert_eq!(
        ctx.options().get(keys::DEACTIVATED_COMPONENTS)?,
        Some(json!(["forums"]))
    );
    assert_eq!(ctx.options().get(keys::RETAIN_BP_DEFAULT)?, Some(json!(true)));
    assert_eq!(ctx.options().get(keys::SIGNUPS_MIGRATED)?, Some(json!(true)));
    assert_eq!(ctx.options().get(keys::THEME_PACKAGE_ID)?, Some(json!("legacy")));
    assert_eq!(ctx.options().get(keys::DB_VERSION)?, Some(json!(9695)));
    Ok(())
}

#[test]
fn test_shipped_steps_survive_a_second_pass() -> Result<()> {
    let mut ctx = memory_context(vec![
        (keys::DB_VERSION, json!(1000)),
        (keys::ACTIVE_COMPONENTS, json!({"activity": 1})),
    ]);
    let sequencer = Sequencer::with_default_plan()?;
    sequencer.run_upgrade(&mut ctx)?;
    let first: Vec<(String, serde_json::Value)> = ctx
        .options()
        .keys()?
        .into_iter()
        .map(|key| {
            let value = ctx.options().get(&key).unwrap().unwrap();
            (key, value)
        })
        .collect();

    // Replay every step against the migrated store.
    ctx.options_mut().set(keys::DB_VERSION, json!(1000))?;
    sequencer.run_upgrade(&mut ctx)?;

    for (key, value) in first {
        assert_eq!(ctx.options().get(&key)?, Some(value), "{} changed", key);
    }
    Ok(())
}

#[test]
fn test_file_backed_upgrade_persists() -> Result<()> {
    let dir = tempdir()?;
    let options_path = dir.path().join("options.json");
    let schema_path = dir.path().join("schema.json");

    {
        let mut ctx = UpgradeContext::new(
            Box::new(FileOptionStore::open(&options_path)?),
            Box::new(FileSchema::open(&schema_path)?),
            UpgradeConfig::new().table_prefix("site2_"),
        );
        lifecycle::activate(&mut ctx, &Sequencer::with_default_plan()?)?;
    }

    let store = FileOptionStore::open(&options_path)?;
    assert_eq!(store.get(keys::DB_VERSION)?, Some(json!(9695)));
    assert_eq!(store.get(keys::UPGRADE_LOCK)?, None);

    let schema = FileSchema::open(&schema_path)?;
    assert!(schema.table_exists("site2_bp_signups"));
    assert!(schema.table_exists("site2_bp_activity_meta"));
    assert!(!schema.table_exists("wp_bp_signups"));
    Ok(())
}
