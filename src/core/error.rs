use thiserror::Error;

use super::SchemaVersion;

/// Failures of the persistent key-value option store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Option store unavailable: {0}")]
    Unavailable(String),

    #[error("Option '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the relational schema surface.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Column '{0}' already exists in table '{1}'")]
    ColumnExists(String, String),

    #[error("Index '{0}' already exists on table '{1}'")]
    IndexExists(String, String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error raised by a single migration step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Message(String),
}

impl StepError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Error surfaced by a sequencer run.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Schema apply failed: {0}")]
    SchemaApply(#[from] SchemaError),

    #[error("Migration step {threshold} ({name}) failed: {source}")]
    StepFailed {
        threshold: SchemaVersion,
        name: String,
        #[source]
        source: StepError,
    },

    #[error("Version store unavailable: {0}")]
    VersionStore(#[from] StoreError),

    #[error("Invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Another upgrade has held the lock since {since}")]
    UpgradeInProgress { since: chrono::DateTime<chrono::Utc> },
}

/// Component registration failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Component id cannot be empty")]
    EmptyId,

    #[error("Component '{0}' is already registered")]
    Duplicate(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
pub type StepResult<T> = std::result::Result<T, StepError>;
pub type Result<T> = std::result::Result<T, MigrationError>;
