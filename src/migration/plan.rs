use std::fmt;
use std::sync::Arc;

use crate::context::UpgradeContext;
use crate::core::{MigrationError, Result, SchemaVersion, StepResult};

pub type StepAction = Arc<dyn Fn(&mut UpgradeContext) -> StepResult<()> + Send + Sync>;

/// A version-gated migration. Runs on upgrade when the stored version is below `threshold`.
#[derive(Clone)]
pub struct MigrationStep {
    threshold: SchemaVersion,
    name: String,
    action: StepAction,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("threshold", &self.threshold)
            .field("name", &self.name)
            .finish()
    }
}

impl MigrationStep {
    pub fn new<F>(threshold: u32, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut UpgradeContext) -> StepResult<()> + Send + Sync + 'static,
    {
        Self {
            threshold: SchemaVersion::new(threshold),
            name: name.into(),
            action: Arc::new(action),
        }
    }

    pub fn threshold(&self) -> SchemaVersion {
        self.threshold
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(&self, ctx: &mut UpgradeContext) -> StepResult<()> {
        (self.action)(ctx)
    }
}

/// Registry of migration steps, kept in ascending threshold order.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Adds a step at its sorted position.
    ///
    /// Rejects a zero threshold and a threshold that is already registered.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        if step.threshold.get() == 0 {
            return Err(MigrationError::InvalidPlan(format!(
                "Migration '{}' must have a threshold >= 1",
                step.name
            )));
        }

        match self
            .steps
            .binary_search_by_key(&step.threshold, |existing| existing.threshold)
        {
            Ok(pos) => Err(MigrationError::InvalidPlan(format!(
                "Duplicate migration threshold {} ('{}' and '{}')",
                step.threshold, self.steps[pos].name, step.name
            ))),
            Err(pos) => {
                self.steps.insert(pos, step);
                Ok(())
            }
        }
    }

    /// Fluent builder method to add a step.
    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    pub fn max_threshold(&self) -> Option<SchemaVersion> {
        self.steps.last().map(|step| step.threshold)
    }

    /// Checks the plan can reach `target`: no step may sit above it.
    pub fn validate(&self, target: SchemaVersion) -> Result<()> {
        if target.get() == 0 {
            return Err(MigrationError::InvalidPlan(
                "Target version must be >= 1".to_string(),
            ));
        }

        if let Some(step) = self.steps.iter().find(|step| step.threshold > target) {
            return Err(MigrationError::InvalidPlan(format!(
                "Migration '{}' at {} exceeds target version {}",
                step.name, step.threshold, target
            )));
        }

        Ok(())
    }

    /// Steps an upgrade from `current` has to run, ascending.
    pub fn pending(&self, current: SchemaVersion) -> &[MigrationStep] {
        let start = self.steps.partition_point(|step| step.threshold <= current);
        &self.steps[start..]
    }
}
