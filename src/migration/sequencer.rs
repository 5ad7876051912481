use chrono::Utc;
use log::warn;
use serde_json::Value;
use tracing::{Level, event, info_span};

use super::{MigrationPlan, lock, steps};
use crate::component::ComponentSet;
use crate::context::UpgradeContext;
use crate::core::{MigrationError, Result, SchemaVersion, StoreError, StoreResult};
use crate::hooks::HookEvent;
use crate::install::InstallReport;
use crate::options::keys;
use crate::storage::OptionStore;

/// What a sequencer run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    UpToDate {
        version: SchemaVersion,
    },
    Installed {
        version: SchemaVersion,
        report: InstallReport,
    },
    Upgraded {
        from: SchemaVersion,
        to: SchemaVersion,
        applied: Vec<SchemaVersion>,
        report: InstallReport,
    },
    /// The store was written by a newer build; nothing was touched.
    AheadOfTarget {
        stored: SchemaVersion,
        target: SchemaVersion,
    },
}

impl UpgradeOutcome {
    /// Whether the run wrote anything.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Installed { .. } | Self::Upgraded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    FreshInstall,
    Upgrade,
    UpToDate,
    AheadOfTarget,
}

/// Read-only preview of the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeStatus {
    pub stored: Option<SchemaVersion>,
    pub target: SchemaVersion,
    pub kind: RunKind,
    /// `(threshold, name)` of every step the next run would apply.
    pub pending: Vec<(SchemaVersion, String)>,
}

/// Reads the stored schema version. `None` means nothing was ever installed.
pub fn load_schema_version(store: &dyn OptionStore) -> StoreResult<Option<SchemaVersion>> {
    match store.get(keys::DB_VERSION)? {
        None => Ok(None),
        Some(value) => SchemaVersion::from_option(&value).map_err(|reason| StoreError::Corrupt {
            key: keys::DB_VERSION.to_string(),
            reason,
        }),
    }
}

/// Drives installs and upgrades of the stored schema version.
#[derive(Debug, Clone)]
pub struct Sequencer {
    plan: MigrationPlan,
}

impl Sequencer {
    pub fn new(plan: MigrationPlan) -> Self {
        Self { plan }
    }

    /// Sequencer over the shipped migration steps.
    pub fn with_default_plan() -> Result<Self> {
        Ok(Self::new(steps::default_plan()?))
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    pub fn status(&self, ctx: &UpgradeContext) -> Result<UpgradeStatus> {
        let target = ctx.config().target_version;
        self.plan.validate(target)?;
        let stored = load_schema_version(ctx.options())?;

        let (kind, pending) = match stored {
            None => (RunKind::FreshInstall, Vec::new()),
            Some(v) if v == target => (RunKind::UpToDate, Vec::new()),
            Some(v) if v > target => (RunKind::AheadOfTarget, Vec::new()),
            Some(v) => (
                RunKind::Upgrade,
                self.plan
                    .pending(v)
                    .iter()
                    .map(|step| (step.threshold(), step.name().to_string()))
                    .collect(),
            ),
        };

        Ok(UpgradeStatus {
            stored,
            target,
            kind,
            pending,
        })
    }

    /// Brings the stored schema up to the configured target version.
    ///
    /// The version is written last; a failed run leaves it where it was so
    /// the next run retries from the same point.
    pub fn run_upgrade(&self, ctx: &mut UpgradeContext) -> Result<UpgradeOutcome> {
        let target = ctx.config().target_version;
        let span = info_span!("sequencer.run_upgrade", target = %target);
        let _enter = span.enter();

        ctx.config().validate().map_err(MigrationError::InvalidConfig)?;
        self.plan.validate(target)?;
        if let Some(outcome) = settled(load_schema_version(ctx.options())?, target) {
            return Ok(outcome);
        }

        let locked = ctx.config().use_upgrade_lock;
        if locked {
            let timeout = ctx.config().lock_timeout;
            lock::acquire(ctx.options_mut(), timeout, Utc::now())?;
        }

        let result = self.run_pending(ctx, target);

        if locked {
            if let Err(err) = lock::release(ctx.options_mut()) {
                warn!("Failed to release upgrade lock: {}", err);
            }
        }

        if let Err(err) = &result {
            event!(Level::ERROR, error = %err, "schema upgrade failed");
            ctx.hooks()
                .fire(&HookEvent::UpgradeFailed { error: err.to_string() });
        }
        result
    }

    /// Re-reads the stored version, since another run may have finished
    /// while this one waited for the lock, then does whatever is left.
    fn run_pending(&self, ctx: &mut UpgradeContext, target: SchemaVersion) -> Result<UpgradeOutcome> {
        let stored = load_schema_version(ctx.options())?;
        if let Some(outcome) = settled(stored, target) {
            return Ok(outcome);
        }
        match stored {
            None => self.fresh_install(ctx, target),
            Some(from) => self.upgrade_from(ctx, from, target),
        }
    }

    fn fresh_install(
        &self,
        ctx: &mut UpgradeContext,
        target: SchemaVersion,
    ) -> Result<UpgradeOutcome> {
        event!(Level::INFO, "no stored schema version, running fresh install");
        ctx.hooks()
            .fire(&HookEvent::PreSchemaUpgrade { from: None, to: target });

        let components = ComponentSet::from_ids(ctx.config().default_components.iter().cloned());
        let report = ctx.installer().install(ctx.schema_mut(), &components)?;
        fire_installed(ctx, &components);

        components.save(ctx.options_mut())?;
        ctx.options_mut()
            .set(keys::IGNORE_DEPRECATED_CODE, Value::Bool(false))?;

        bump_version(ctx, None, target)?;
        Ok(UpgradeOutcome::Installed {
            version: target,
            report,
        })
    }

    fn upgrade_from(
        &self,
        ctx: &mut UpgradeContext,
        from: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<UpgradeOutcome> {
        event!(Level::INFO, from = %from, "upgrading schema");
        ctx.hooks().fire(&HookEvent::PreSchemaUpgrade {
            from: Some(from),
            to: target,
        });

        let components = match ComponentSet::load(ctx.options())? {
            Some(components) => components,
            None => {
                warn!(
                    "'{}' is missing, only required components will be installed",
                    keys::ACTIVE_COMPONENTS
                );
                ComponentSet::new()
            }
        };
        let report = ctx.installer().install(ctx.schema_mut(), &components)?;
        fire_installed(ctx, &components);

        let mut applied = Vec::new();
        for step in self.plan.pending(from) {
            let step_span = info_span!(
                "sequencer.step",
                threshold = %step.threshold(),
                name = %step.name()
            );
            let _step_enter = step_span.enter();

            step.apply(ctx).map_err(|source| MigrationError::StepFailed {
                threshold: step.threshold(),
                name: step.name().to_string(),
                source,
            })?;

            event!(Level::INFO, "migration step applied");
            ctx.hooks().fire(&HookEvent::StepApplied {
                threshold: step.threshold(),
                name: step.name().to_string(),
            });
            applied.push(step.threshold());
        }

        bump_version(ctx, Some(from), target)?;
        Ok(UpgradeOutcome::Upgraded {
            from,
            to: target,
            applied,
            report,
        })
    }
}

/// The outcome for a stored version that needs no work, if it needs none.
fn settled(stored: Option<SchemaVersion>, target: SchemaVersion) -> Option<UpgradeOutcome> {
    match stored {
        Some(version) if version == target => {
            event!(Level::DEBUG, version = %version, "schema already up to date");
            Some(UpgradeOutcome::UpToDate { version })
        }
        Some(version) if version > target => {
            event!(
                Level::WARN,
                stored = %version,
                "stored schema version is newer than this build, leaving it untouched"
            );
            Some(UpgradeOutcome::AheadOfTarget {
                stored: version,
                target,
            })
        }
        _ => None,
    }
}

fn fire_installed(ctx: &UpgradeContext, components: &ComponentSet) {
    ctx.hooks().fire(&HookEvent::SchemaInstalled {
        components: components.ids().map(str::to_string).collect(),
    });
}

fn bump_version(
    ctx: &mut UpgradeContext,
    from: Option<SchemaVersion>,
    to: SchemaVersion,
) -> Result<()> {
    ctx.options_mut().set(keys::DB_VERSION, to.to_option())?;
    event!(Level::INFO, version = %to, "schema version bumped");
    ctx.hooks().fire(&HookEvent::VersionBumped { from, to });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOptionStore;
    use serde_json::json;

    #[test]
    fn test_load_schema_version() {
        let mut store = MemoryOptionStore::new();
        assert_eq!(load_schema_version(&store).unwrap(), None);

        store.set(keys::DB_VERSION, json!("7553")).unwrap();
        assert_eq!(
            load_schema_version(&store).unwrap(),
            Some(SchemaVersion::new(7553))
        );

        store.set(keys::DB_VERSION, json!(0)).unwrap();
        assert_eq!(load_schema_version(&store).unwrap(), None);

        store.set(keys::DB_VERSION, json!("seven")).unwrap();
        assert!(matches!(
            load_schema_version(&store),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_outcome_changed() {
        let version = SchemaVersion::new(9695);
        assert!(!UpgradeOutcome::UpToDate { version }.changed());
        assert!(
            UpgradeOutcome::Installed {
                version,
                report: InstallReport::default()
            }
            .changed()
        );
    }
}
