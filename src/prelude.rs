//! Common imports for code that drives or extends the upgrade sequence.
//!
//! `use bpcore::prelude::*;` brings in the context, the storage traits and
//! everything needed to register a custom migration step.

pub use crate::component::{Component, ComponentLoader, ComponentSet};
pub use crate::config::UpgradeConfig;
pub use crate::context::UpgradeContext;
pub use crate::core::{MigrationError, SchemaVersion, StepError, StepResult};
pub use crate::hooks::{Hook, HookEvent, HookRegistry};
pub use crate::migration::{MigrationPlan, MigrationStep, Sequencer, UpgradeOutcome};
pub use crate::options::keys;
pub use crate::storage::{OptionStore, SchemaBackend};
