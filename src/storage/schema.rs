use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::file::write_json_atomic;
use crate::core::{ColumnDef, IndexDef, SchemaError, SchemaResult, TableDef};

/// Relational execution surface the installer and migration steps work against.
///
/// Only structural operations are needed; existence checks are the basis of
/// every idempotent apply.
pub trait SchemaBackend: Send {
    fn table_exists(&self, table: &str) -> bool;

    /// Column names of an existing table, in definition order.
    fn columns(&self, table: &str) -> SchemaResult<Vec<String>>;

    fn index_exists(&self, table: &str, index: &str) -> SchemaResult<bool>;

    fn create_table(&mut self, def: &TableDef) -> SchemaResult<()>;

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> SchemaResult<()>;

    fn create_index(&mut self, table: &str, index: &IndexDef) -> SchemaResult<()>;

    fn drop_table(&mut self, table: &str) -> SchemaResult<()>;

    fn list_tables(&self) -> Vec<String>;
}

/// In-process catalog of table definitions.
#[derive(Debug, Clone, Default)]
pub struct MemorySchema {
    tables: BTreeMap<String, TableDef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaSnapshot {
    format_version: u32,
    saved_at: chrono::DateTime<chrono::Utc>,
    tables: BTreeMap<String, TableDef>,
}

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

impl MemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_table(&self, name: &str) -> SchemaResult<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Loads a catalog saved with [`MemorySchema::save`]. A missing file yields an empty catalog.
    pub fn load<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path)?;
        let snapshot: SchemaSnapshot = serde_json::from_str(&raw)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SchemaError::Backend(format!(
                "Unsupported schema snapshot format {} in '{}'",
                snapshot.format_version,
                path.display()
            )));
        }
        for def in snapshot.tables.values() {
            def.validate()?;
        }

        Ok(Self {
            tables: snapshot.tables,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SchemaResult<()> {
        let snapshot = SchemaSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: chrono::Utc::now(),
            tables: self.tables.clone(),
        };
        write_json_atomic(path.as_ref(), &snapshot)?;
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> SchemaResult<&mut TableDef> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }
}

impl SchemaBackend for MemorySchema {
    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn columns(&self, table: &str) -> SchemaResult<Vec<String>> {
        Ok(self
            .get_table(table)?
            .columns()
            .iter()
            .map(|col| col.name.clone())
            .collect())
    }

    fn index_exists(&self, table: &str, index: &str) -> SchemaResult<bool> {
        Ok(self.get_table(table)?.has_index(index))
    }

    fn create_table(&mut self, def: &TableDef) -> SchemaResult<()> {
        def.validate()?;
        if self.tables.contains_key(def.name()) {
            return Err(SchemaError::TableExists(def.name().to_string()));
        }
        self.tables.insert(def.name().to_string(), def.clone());
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> SchemaResult<()> {
        let def = self.table_mut(table)?;
        if def.get_column(&column.name).is_some() {
            return Err(SchemaError::ColumnExists(column.name.clone(), table.to_string()));
        }
        def.push_column(column.clone());
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &IndexDef) -> SchemaResult<()> {
        let def = self.table_mut(table)?;
        if def.has_index(&index.name) {
            return Err(SchemaError::IndexExists(index.name.clone(), table.to_string()));
        }
        if let Some(missing) = index.columns.iter().find(|c| def.get_column(c).is_none()) {
            return Err(SchemaError::InvalidDefinition(format!(
                "Index '{}' references unknown column '{}' in table '{}'",
                index.name, missing, table
            )));
        }
        def.push_index(index.clone());
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> SchemaResult<()> {
        if self.tables.remove(table).is_none() {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }
        Ok(())
    }

    fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

/// A [`MemorySchema`] that rewrites its snapshot file after every change.
pub struct FileSchema {
    path: PathBuf,
    inner: MemorySchema,
}

impl FileSchema {
    pub fn open<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = MemorySchema::load(&path)?;
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> &MemorySchema {
        &self.inner
    }

    fn write_through<F>(&mut self, change: F) -> SchemaResult<()>
    where
        F: FnOnce(&mut MemorySchema) -> SchemaResult<()>,
    {
        let before = self.inner.clone();
        change(&mut self.inner)?;
        if let Err(err) = self.inner.save(&self.path) {
            self.inner = before;
            return Err(err);
        }
        Ok(())
    }
}

impl SchemaBackend for FileSchema {
    fn table_exists(&self, table: &str) -> bool {
        self.inner.table_exists(table)
    }

    fn columns(&self, table: &str) -> SchemaResult<Vec<String>> {
        self.inner.columns(table)
    }

    fn index_exists(&self, table: &str, index: &str) -> SchemaResult<bool> {
        self.inner.index_exists(table, index)
    }

    fn create_table(&mut self, def: &TableDef) -> SchemaResult<()> {
        self.write_through(|schema| schema.create_table(def))
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> SchemaResult<()> {
        self.write_through(|schema| schema.add_column(table, column))
    }

    fn create_index(&mut self, table: &str, index: &IndexDef) -> SchemaResult<()> {
        self.write_through(|schema| schema.create_index(table, index))
    }

    fn drop_table(&mut self, table: &str) -> SchemaResult<()> {
        self.write_through(|schema| schema.drop_table(table))
    }

    fn list_tables(&self) -> Vec<String> {
        self.inner.list_tables()
    }
}
