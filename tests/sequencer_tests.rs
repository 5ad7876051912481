/// Sequencer tests
///
/// Fresh installs, incremental upgrades, failure and retry, the upgrade lock.
/// Run with: cargo test --test sequencer_tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use std::time::Duration;

use bpcore::core::{
    ColumnDef, IndexDef, SchemaError, SchemaResult, StepError, StoreResult, TableDef,
};
use bpcore::migration::lock;
use bpcore::options::keys;
use bpcore::{
    FileOptionStore, Hook, HookEvent, MemoryOptionStore, MemorySchema, MigrationError,
    MigrationPlan, MigrationStep, OptionStore, SchemaBackend, SchemaVersion, Sequencer,
    UpgradeConfig, UpgradeContext, UpgradeOutcome,
};
use tempfile::tempdir;
use serde_json::{Value, json};

const SHIPPED: [u32; 8] = [1801, 6067, 7553, 7731, 7892, 8311, 9181, 9615];

fn context(values: Vec<(&str, Value)>) -> UpgradeContext {
    UpgradeContext::new(
        Box::new(MemoryOptionStore::with_values(values)),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new(),
    )
}

fn recording_plan(thresholds: &[u32], calls: &Arc<Mutex<Vec<u32>>>) -> MigrationPlan {
    let mut plan = MigrationPlan::new();
    for &threshold in thresholds {
        let calls = calls.clone();
        plan.add_step(MigrationStep::new(threshold, format!("step_{}", threshold), move |_| {
            calls.lock().unwrap().push(threshold);
            Ok(())
        }))
        .unwrap();
    }
    plan
}

fn count_hook(ctx: &mut UpgradeContext, hook: Hook) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let inner = counter.clone();
    ctx.hooks_mut().add(hook, move |_| {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    counter
}

fn stored_version(ctx: &UpgradeContext) -> Option<Value> {
    ctx.options().get(keys::DB_VERSION).unwrap()
}

#[test]
fn test_fresh_install_runs_installer_once_and_no_steps() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&[1801, 6067, 9615], &calls));
    let mut ctx = context(vec![]);
    let installs = count_hook(&mut ctx, Hook::SchemaInstalled);

    let outcome = sequencer.run_upgrade(&mut ctx).unwrap();

    assert!(matches!(
        outcome,
        UpgradeOutcome::Installed { version, .. } if version == SchemaVersion::new(9695)
    ));
    assert_eq!(stored_version(&ctx), Some(json!(9695)));
    assert_eq!(installs.load(Ordering::SeqCst), 1);
    assert!(calls.lock().unwrap().is_empty());

    assert_eq!(
        ctx.options().get(keys::ACTIVE_COMPONENTS).unwrap(),
        Some(json!({"activity": 1, "members": 1, "notifications": 1, "settings": 1, "xprofile": 1}))
    );
    assert_eq!(
        ctx.options().get(keys::IGNORE_DEPRECATED_CODE).unwrap(),
        Some(json!(false))
    );
    for table in ["wp_bp_signups", "wp_bp_activity", "wp_bp_notifications", "wp_bp_xprofile_data"] {
        assert!(ctx.schema().table_exists(table), "{} missing", table);
    }
    assert!(!ctx.schema().table_exists("wp_bp_groups"));
}

#[test]
fn test_upgrade_runs_every_pending_step_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    // Registration order must not matter.
    let mut shuffled = SHIPPED;
    shuffled.reverse();
    let sequencer = Sequencer::new(recording_plan(&shuffled, &calls));
    let mut ctx = context(vec![(keys::DB_VERSION, json!(1000))]);

    let outcome = sequencer.run_upgrade(&mut ctx).unwrap();

    assert_eq!(*calls.lock().unwrap(), SHIPPED.to_vec());
    match outcome {
        UpgradeOutcome::Upgraded { from, to, applied, .. } => {
            assert_eq!(from, SchemaVersion::new(1000));
            assert_eq!(to, SchemaVersion::new(9695));
            let applied: Vec<u32> = applied.iter().map(|v| v.get()).collect();
            assert_eq!(applied, SHIPPED.to_vec());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(stored_version(&ctx), Some(json!(9695)));
}

#[test]
fn test_upgrade_only_runs_steps_above_stored_version() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&SHIPPED, &calls));
    let mut ctx = context(vec![(keys::DB_VERSION, json!("7731"))]);

    sequencer.run_upgrade(&mut ctx).unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![7892, 8311, 9181, 9615]);
}

#[test]
fn test_version_reaches_last_threshold() {
    for thresholds in [vec![5], vec![3, 7, 11], vec![100, 200, 300, 400, 500]] {
        let target = *thresholds.last().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sequencer = Sequencer::new(recording_plan(&thresholds, &calls));

        let mut fresh = UpgradeContext::new(
            Box::new(MemoryOptionStore::new()),
            Box::new(MemorySchema::new()),
            UpgradeConfig::new().target_version(target),
        );
        sequencer.run_upgrade(&mut fresh).unwrap();
        assert_eq!(stored_version(&fresh), Some(json!(target)));

        let mut old = UpgradeContext::new(
            Box::new(MemoryOptionStore::with_values([(keys::DB_VERSION, json!(1))])),
            Box::new(MemorySchema::new()),
            UpgradeConfig::new().target_version(target),
        );
        sequencer.run_upgrade(&mut old).unwrap();
        assert_eq!(stored_version(&old), Some(json!(target)));
        assert_eq!(*calls.lock().unwrap(), thresholds);
    }
}

#[test]
fn test_second_run_is_a_no_op() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&SHIPPED, &calls));
    let mut ctx = context(vec![(keys::DB_VERSION, json!(1000))]);

    sequencer.run_upgrade(&mut ctx).unwrap();
    let installs = count_hook(&mut ctx, Hook::SchemaInstalled);
    let before = calls.lock().unwrap().len();

    let outcome = sequencer.run_upgrade(&mut ctx).unwrap();

    assert_eq!(
        outcome,
        UpgradeOutcome::UpToDate {
            version: SchemaVersion::new(9695)
        }
    );
    assert!(!outcome.changed());
    assert_eq!(calls.lock().unwrap().len(), before);
    assert_eq!(installs.load(Ordering::SeqCst), 0);
    assert_eq!(stored_version(&ctx), Some(json!(9695)));
}

#[test]
fn test_failed_step_keeps_version_and_retry_completes() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let broken = Arc::new(AtomicBool::new(true));

    let mut plan = recording_plan(&[1801, 6067, 9181, 9615], &calls);
    {
        let calls = calls.clone();
        let broken = broken.clone();
        plan.add_step(MigrationStep::new(7553, "flaky", move |_| {
            if broken.load(Ordering::SeqCst) {
                return Err(StepError::msg("notifications table is locked"));
            }
            calls.lock().unwrap().push(7553);
            Ok(())
        }))
        .unwrap();
    }
    let sequencer = Sequencer::new(plan);
    let mut ctx = context(vec![(keys::DB_VERSION, json!(1000))]);
    let failures = count_hook(&mut ctx, Hook::UpgradeFailed);

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    match &err {
        MigrationError::StepFailed { threshold, name, .. } => {
            assert_eq!(*threshold, SchemaVersion::new(7553));
            assert_eq!(name, "flaky");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(*calls.lock().unwrap(), vec![1801, 6067]);
    assert_eq!(stored_version(&ctx), Some(json!(1000)));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.options().get(keys::UPGRADE_LOCK).unwrap(), None);

    broken.store(false, Ordering::SeqCst);
    calls.lock().unwrap().clear();
    sequencer.run_upgrade(&mut ctx).unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![1801, 6067, 7553, 9181, 9615]);
    assert_eq!(stored_version(&ctx), Some(json!(9695)));
}

#[test]
fn test_hooks_fire_in_run_order() {
    let sequencer = Sequencer::new(recording_plan(&[1801, 9615], &Arc::new(Mutex::new(Vec::new()))));
    let mut ctx = context(vec![(keys::DB_VERSION, json!(1000))]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    for hook in [
        Hook::PreSchemaUpgrade,
        Hook::SchemaInstalled,
        Hook::StepApplied,
        Hook::VersionBumped,
    ] {
        let seen = seen.clone();
        ctx.hooks_mut().add(hook, move |event| {
            seen.lock().unwrap().push(event.clone());
        });
    }

    sequencer.run_upgrade(&mut ctx).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(
        seen[0],
        HookEvent::PreSchemaUpgrade {
            from: Some(SchemaVersion::new(1000)),
            to: SchemaVersion::new(9695)
        }
    );
    assert!(matches!(seen[1], HookEvent::SchemaInstalled { .. }));
    assert_eq!(
        seen[2],
        HookEvent::StepApplied {
            threshold: SchemaVersion::new(1801),
            name: "step_1801".to_string()
        }
    );
    assert_eq!(
        seen[4],
        HookEvent::VersionBumped {
            from: Some(SchemaVersion::new(1000)),
            to: SchemaVersion::new(9695)
        }
    );
}

#[test]
fn test_stored_version_ahead_of_target_is_left_alone() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&SHIPPED, &calls));
    let mut ctx = context(vec![(keys::DB_VERSION, json!(12000))]);

    let outcome = sequencer.run_upgrade(&mut ctx).unwrap();

    assert_eq!(
        outcome,
        UpgradeOutcome::AheadOfTarget {
            stored: SchemaVersion::new(12000),
            target: SchemaVersion::new(9695)
        }
    );
    assert_eq!(stored_version(&ctx), Some(json!(12000)));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_unreadable_version_is_reported() {
    let sequencer = Sequencer::with_default_plan().unwrap();
    let mut ctx = context(vec![(keys::DB_VERSION, json!("1.9"))]);

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    assert!(matches!(err, MigrationError::VersionStore(_)));
    assert_eq!(stored_version(&ctx), Some(json!("1.9")));
}

#[test]
fn test_live_upgrade_lock_rejects_run() {
    let sequencer = Sequencer::with_default_plan().unwrap();
    let now = chrono::Utc::now().timestamp();
    let mut ctx = context(vec![(keys::UPGRADE_LOCK, json!(now))]);

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    assert!(matches!(err, MigrationError::UpgradeInProgress { .. }));
    assert_eq!(stored_version(&ctx), None);
    assert_eq!(ctx.options().get(keys::UPGRADE_LOCK).unwrap(), Some(json!(now)));
}

#[test]
fn test_lock_can_be_disabled() {
    let sequencer = Sequencer::with_default_plan().unwrap();
    let now = chrono::Utc::now().timestamp();
    let mut ctx = UpgradeContext::new(
        Box::new(MemoryOptionStore::with_values([(keys::UPGRADE_LOCK, json!(now))])),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new().use_upgrade_lock(false),
    );

    sequencer.run_upgrade(&mut ctx).unwrap();
    assert_eq!(stored_version(&ctx), Some(json!(9695)));
    // Not ours to release.
    assert_eq!(ctx.options().get(keys::UPGRADE_LOCK).unwrap(), Some(json!(now)));
}

#[test]
fn test_zero_lock_timeout_is_rejected_before_any_work() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&[1801], &calls));
    let mut ctx = UpgradeContext::new(
        Box::new(MemoryOptionStore::with_values([(keys::DB_VERSION, json!(1000))])),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new().lock_timeout(Duration::ZERO),
    );

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    assert!(matches!(err, MigrationError::InvalidConfig(_)));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(stored_version(&ctx), Some(json!(1000)));
}

#[test]
fn test_file_store_handles_share_the_upgrade_lock() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("options.json");
    let sequencer = Sequencer::with_default_plan().unwrap();

    let mut holder = FileOptionStore::open(&path).unwrap();
    lock::acquire(&mut holder, Duration::from_secs(900), chrono::Utc::now()).unwrap();

    let mut waiter = UpgradeContext::new(
        Box::new(FileOptionStore::open(&path).unwrap()),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new(),
    );
    let err = sequencer.run_upgrade(&mut waiter).unwrap_err();
    assert!(matches!(err, MigrationError::UpgradeInProgress { .. }));

    // The holder finishes its run.
    holder.set(keys::DB_VERSION, json!(9695)).unwrap();
    holder.set("blogname", json!("Community")).unwrap();
    assert!(lock::release(&mut holder).unwrap());

    let outcome = sequencer.run_upgrade(&mut waiter).unwrap();
    assert!(matches!(outcome, UpgradeOutcome::UpToDate { .. }));

    let reopened = FileOptionStore::open(&path).unwrap();
    assert_eq!(reopened.get(keys::DB_VERSION).unwrap(), Some(json!(9695)));
    assert_eq!(reopened.get("blogname").unwrap(), Some(json!("Community")));
    assert_eq!(reopened.get(keys::UPGRADE_LOCK).unwrap(), None);
}

/// Store on which another run finishes the upgrade just before the lock is handed over.
struct RacedStore {
    inner: MemoryOptionStore,
}

impl OptionStore for RacedStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys()
    }

    fn add(&mut self, key: &str, value: Value) -> StoreResult<bool> {
        if key == keys::UPGRADE_LOCK {
            self.inner.set(keys::DB_VERSION, json!(9695))?;
        }
        self.inner.add(key, value)
    }
}

#[test]
fn test_version_is_reread_once_the_lock_is_held() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&SHIPPED, &calls));
    let mut ctx = UpgradeContext::new(
        Box::new(RacedStore {
            inner: MemoryOptionStore::with_values([(keys::DB_VERSION, json!(1000))]),
        }),
        Box::new(MemorySchema::new()),
        UpgradeConfig::new(),
    );
    let installs = count_hook(&mut ctx, Hook::SchemaInstalled);

    let outcome = sequencer.run_upgrade(&mut ctx).unwrap();

    assert!(matches!(outcome, UpgradeOutcome::UpToDate { .. }));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(installs.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.options().get(keys::UPGRADE_LOCK).unwrap(), None);
}

#[test]
fn test_plan_above_target_is_rejected() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sequencer = Sequencer::new(recording_plan(&[1801, 9800], &calls));
    let mut ctx = context(vec![(keys::DB_VERSION, json!(1000))]);

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    assert!(matches!(err, MigrationError::InvalidPlan(_)));
    assert!(calls.lock().unwrap().is_empty());
}

/// Backend whose every write fails.
struct ReadOnlySchema;

impl SchemaBackend for ReadOnlySchema {
    fn table_exists(&self, _table: &str) -> bool {
        false
    }

    fn columns(&self, table: &str) -> SchemaResult<Vec<String>> {
        Err(SchemaError::TableNotFound(table.to_string()))
    }

    fn index_exists(&self, table: &str, _index: &str) -> SchemaResult<bool> {
        Err(SchemaError::TableNotFound(table.to_string()))
    }

    fn create_table(&mut self, _def: &TableDef) -> SchemaResult<()> {
        Err(SchemaError::Backend("read-only database".to_string()))
    }

    fn add_column(&mut self, _table: &str, _column: &ColumnDef) -> SchemaResult<()> {
        Err(SchemaError::Backend("read-only database".to_string()))
    }

    fn create_index(&mut self, _table: &str, _index: &IndexDef) -> SchemaResult<()> {
        Err(SchemaError::Backend("read-only database".to_string()))
    }

    fn drop_table(&mut self, _table: &str) -> SchemaResult<()> {
        Err(SchemaError::Backend("read-only database".to_string()))
    }

    fn list_tables(&self) -> Vec<String> {
        Vec::new()
    }
}

#[test]
fn test_schema_failure_aborts_install() {
    let sequencer = Sequencer::with_default_plan().unwrap();
    let mut ctx = UpgradeContext::new(
        Box::new(MemoryOptionStore::new()),
        Box::new(ReadOnlySchema),
        UpgradeConfig::new(),
    );

    let err = sequencer.run_upgrade(&mut ctx).unwrap_err();
    assert!(matches!(err, MigrationError::SchemaApply(SchemaError::Backend(_))));
    assert_eq!(stored_version(&ctx), None);
    assert_eq!(ctx.options().get(keys::ACTIVE_COMPONENTS).unwrap(), None);
    assert_eq!(ctx.options().get(keys::UPGRADE_LOCK).unwrap(), None);
}

#[test]
fn test_status_previews_pending_steps() {
    let sequencer = Sequencer::with_default_plan().unwrap();

    let fresh = context(vec![]);
    let status = sequencer.status(&fresh).unwrap();
    assert_eq!(status.kind, bpcore::migration::RunKind::FreshInstall);
    assert!(status.pending.is_empty());

    let old = context(vec![(keys::DB_VERSION, json!(8311))]);
    let status = sequencer.status(&old).unwrap();
    assert_eq!(status.kind, bpcore::migration::RunKind::Upgrade);
    let names: Vec<&str> = status.pending.iter().map(|(_, name)| name.as_str()).collect();
    assert_eq!(names, vec!["prune_deactivated", "theme_package"]);
}
