pub mod error;
pub mod types;

pub use error::{
    ComponentError, MigrationError, Result, SchemaError, SchemaResult, StepError, StepResult, StoreError,
    StoreResult,
};
pub use types::{ColumnDef, DataType, IndexDef, SchemaVersion, TableDef};
