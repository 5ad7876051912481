// ============================================================================
// bpcore Library
// ============================================================================

pub mod capabilities;
pub mod component;
pub mod config;
pub mod context;
pub mod core;
pub mod hooks;
pub mod install;
pub mod lifecycle;
pub mod migration;
pub mod moderation;
pub mod options;
pub mod prelude;
pub mod storage;

// Re-export main types for convenience
pub use config::{CURRENT_DB_VERSION, UpgradeConfig};
pub use context::UpgradeContext;
pub use core::{MigrationError, Result, SchemaVersion};
pub use hooks::{Hook, HookEvent, HookRegistry};
pub use migration::{MigrationPlan, MigrationStep, Sequencer, UpgradeOutcome};

// Re-export storage backends
pub use storage::{FileOptionStore, FileSchema, MemoryOptionStore, MemorySchema, OptionStore, SchemaBackend};

// ============================================================================
// One-call entry point
// ============================================================================

/// Runs the shipped upgrade sequence against `ctx`.
///
/// Equivalent to building a [`Sequencer`] over the default plan and calling
/// [`Sequencer::run_upgrade`].
///
/// # Examples
///
/// ```
/// use bpcore::{MemoryOptionStore, MemorySchema, UpgradeConfig, UpgradeContext, UpgradeOutcome};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut ctx = UpgradeContext::new(
///     Box::new(MemoryOptionStore::new()),
///     Box::new(MemorySchema::new()),
///     UpgradeConfig::new(),
/// );
///
/// let outcome = bpcore::run_upgrade(&mut ctx)?;
/// assert!(matches!(outcome, UpgradeOutcome::Installed { .. }));
///
/// let again = bpcore::run_upgrade(&mut ctx)?;
/// assert!(!again.changed());
/// # Ok(())
/// # }
/// ```
pub fn run_upgrade(ctx: &mut UpgradeContext) -> Result<UpgradeOutcome> {
    Sequencer::with_default_plan()?.run_upgrade(ctx)
}
