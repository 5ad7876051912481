//! Version-gated schema migrations and the sequencer that applies them.

pub mod lock;
pub mod plan;
pub mod sequencer;
pub mod steps;

pub use plan::{MigrationPlan, MigrationStep, StepAction};
pub use sequencer::{RunKind, Sequencer, UpgradeOutcome, UpgradeStatus, load_schema_version};
pub use steps::default_plan;
