//! Idempotent schema installer.
//!
//! Every apply is driven by existence checks against the backend: a missing
//! table is created, an existing one only gains the columns and indexes it
//! lacks. Nothing is ever dropped or altered in place.

pub mod tables;

use tracing::{Level, event, info_span};

use crate::component::ComponentSet;
use crate::config::UpgradeConfig;
use crate::core::{SchemaResult, TableDef};
use crate::storage::SchemaBackend;

/// Installable components, in install order.
pub const INSTALLABLE_COMPONENTS: &[&str] = &[
    "members",
    "notifications",
    "activity",
    "friends",
    "groups",
    "messages",
    "xprofile",
    "blogs",
];

/// What one install pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub created_tables: Vec<String>,
    /// `(table, column)` pairs.
    pub added_columns: Vec<(String, String)>,
    /// `(table, index)` pairs.
    pub added_indexes: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_noop(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty() && self.added_indexes.is_empty()
    }

    fn merge(&mut self, other: InstallReport) {
        self.created_tables.extend(other.created_tables);
        self.added_columns.extend(other.added_columns);
        self.added_indexes.extend(other.added_indexes);
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    config: UpgradeConfig,
}

impl Installer {
    pub fn new(config: &UpgradeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Table definitions owned by `component`; empty for components without tables.
    pub fn tables_for(&self, component: &str) -> Vec<TableDef> {
        match component {
            "members" => tables::signups(&self.config),
            "notifications" => tables::notifications(&self.config),
            "activity" => tables::activity(&self.config),
            "friends" => tables::friends(&self.config),
            "groups" => tables::groups(&self.config),
            "messages" => tables::messages(&self.config),
            "xprofile" => tables::xprofile(&self.config),
            "blogs" => tables::blogs(&self.config),
            _ => Vec::new(),
        }
    }

    /// Installs the schema of every active component.
    pub fn install(
        &self,
        schema: &mut dyn SchemaBackend,
        components: &ComponentSet,
    ) -> SchemaResult<InstallReport> {
        let span = info_span!("installer.install", components = components.len());
        let _enter = span.enter();

        let mut report = InstallReport::default();
        for component in INSTALLABLE_COMPONENTS {
            if components.is_active(component) {
                report.merge(self.install_component(schema, component)?);
            }
        }

        event!(
            Level::INFO,
            created = report.created_tables.len(),
            columns = report.added_columns.len(),
            indexes = report.added_indexes.len(),
            "schema install pass complete"
        );
        Ok(report)
    }

    pub fn install_component(
        &self,
        schema: &mut dyn SchemaBackend,
        component: &str,
    ) -> SchemaResult<InstallReport> {
        let mut report = InstallReport::default();
        for def in self.tables_for(component) {
            report.merge(apply_table(schema, &def)?);
        }
        Ok(report)
    }
}

/// Brings one table in line with `def` using only additive changes.
pub fn apply_table(schema: &mut dyn SchemaBackend, def: &TableDef) -> SchemaResult<InstallReport> {
    def.validate()?;
    let mut report = InstallReport::default();
    let table = def.name();

    if !schema.table_exists(table) {
        schema.create_table(def)?;
        event!(Level::DEBUG, table = %table, "table created");
        report.created_tables.push(table.to_string());
        return Ok(report);
    }

    let existing = schema.columns(table)?;
    for column in def.columns() {
        if !existing.iter().any(|name| name == &column.name) {
            schema.add_column(table, column)?;
            event!(Level::DEBUG, table = %table, column = %column.name, "column added");
            report
                .added_columns
                .push((table.to_string(), column.name.clone()));
        }
    }

    for index in def.indexes() {
        if !schema.index_exists(table, &index.name)? {
            schema.create_index(table, index)?;
            event!(Level::DEBUG, table = %table, index = %index.name, "index added");
            report
                .added_indexes
                .push((table.to_string(), index.name.clone()));
        }
    }

    Ok(report)
}
