use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SchemaError, SchemaResult};

/// The last fully applied database version.
///
/// Stored as a plain integer under `_bp_db_version`. A missing value, or a
/// stored `0`, means nothing has ever been installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Interprets a raw option value.
    ///
    /// Hosts historically stored the version as either a number or a numeric
    /// string, and report a missing option as `false`. All of those are
    /// accepted; anything else is rejected.
    pub fn from_option(value: &Value) -> std::result::Result<Option<Self>, String> {
        let raw = match value {
            Value::Null | Value::Bool(false) => return Ok(None),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("expected a non-negative integer, got {}", n))?,
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("expected a numeric string, got '{}'", s))?,
            other => return Err(format!("unexpected value {}", other)),
        };

        if raw == 0 {
            return Ok(None);
        }

        u32::try_from(raw)
            .map(|v| Some(Self(v)))
            .map_err(|_| format!("version {} is out of range", raw))
    }

    pub fn to_option(self) -> Value {
        Value::from(self.0)
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    BigInt,
    Int,
    TinyInt,
    VarChar(u16),
    Text,
    LongText,
    DateTime,
    Boolean,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::BigInt => write!(f, "bigint(20)"),
            DataType::Int => write!(f, "int(11)"),
            DataType::TinyInt => write!(f, "tinyint(1)"),
            DataType::VarChar(len) => write!(f, "varchar({})", len),
            DataType::Text => write!(f, "text"),
            DataType::LongText => write!(f, "longtext"),
            DataType::DateTime => write!(f, "datetime"),
            DataType::Boolean => write!(f, "bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Full definition of one table: columns, primary key, secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|idx| idx.name == name)
    }

    pub(crate) fn push_column(&mut self, column: ColumnDef) {
        self.columns.push(column);
    }

    pub(crate) fn push_index(&mut self, index: IndexDef) {
        self.indexes.push(index);
    }

    /// Structural checks: names present, no duplicates, keys reference real columns.
    pub fn validate(&self) -> SchemaResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::InvalidDefinition(
                "Table name cannot be empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(format!(
                "Table '{}' has no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }

        for key in &self.primary_key {
            if !seen.contains(key.as_str()) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "Primary key column '{}' not found in table '{}'",
                    key, self.name
                )));
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "Duplicate index '{}' on table '{}'",
                    index.name, self.name
                )));
            }
            if index.columns.is_empty() {
                return Err(SchemaError::InvalidDefinition(format!(
                    "Index '{}' on table '{}' has no columns",
                    index.name, self.name
                )));
            }
            if let Some(missing) = index.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "Index '{}' references unknown column '{}' in table '{}'",
                    index.name, missing, self.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_from_option_accepts_host_encodings() {
        assert_eq!(SchemaVersion::from_option(&json!(null)).unwrap(), None);
        assert_eq!(SchemaVersion::from_option(&json!(false)).unwrap(), None);
        assert_eq!(SchemaVersion::from_option(&json!("")).unwrap(), None);
        assert_eq!(SchemaVersion::from_option(&json!(0)).unwrap(), None);
        assert_eq!(
            SchemaVersion::from_option(&json!(9695)).unwrap(),
            Some(SchemaVersion::new(9695))
        );
        assert_eq!(
            SchemaVersion::from_option(&json!(" 1801 ")).unwrap(),
            Some(SchemaVersion::new(1801))
        );
    }

    #[test]
    fn test_version_from_option_rejects_garbage() {
        assert!(SchemaVersion::from_option(&json!("abc")).is_err());
        assert!(SchemaVersion::from_option(&json!(-4)).is_err());
        assert!(SchemaVersion::from_option(&json!([1])).is_err());
        assert!(SchemaVersion::from_option(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_table_validation() {
        let ok = TableDef::new("wp_bp_friends")
            .column(ColumnDef::new("id", DataType::BigInt).auto_increment())
            .column(ColumnDef::new("initiator_user_id", DataType::BigInt).not_null())
            .primary_key(["id"])
            .index(IndexDef::new("initiator_user_id", ["initiator_user_id"]));
        assert!(ok.validate().is_ok());

        let dup = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Int))
            .column(ColumnDef::new("id", DataType::Int));
        assert!(matches!(dup.validate(), Err(SchemaError::InvalidDefinition(_))));

        let bad_index = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Int))
            .index(IndexDef::new("missing", ["nope"]));
        assert!(bad_index.validate().is_err());

        assert!(TableDef::new("empty").validate().is_err());
    }
}
