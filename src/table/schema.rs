//! Table Registry - Load table definitions from JSON/YAML
//!
//! Built-in definitions are embedded in the binary. Extra definitions can be
//! loaded from a directory at startup and override built-ins with the same name.

use crate::cloud::Audience;
use crate::collect::{ProviderKind, SubScopeKind};
use crate::error::TableError;
use crate::table::flatten::{FlattenOptions, KeyStyle};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Embedded table definition files (compiled into the binary)
const TABLE_FILES: &[(&str, &str)] = &[
    ("azure.json", include_str!("../tables/azure.json")),
    ("gcp.json", include_str!("../tables/gcp.json")),
];

/// Ordered, duplicate-free column list of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    table: String,
    columns: Vec<String>,
}

impl ColumnSchema {
    /// Build a schema, rejecting empty or duplicate column names
    pub fn new<I, S>(table: &str, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.is_empty() {
                bail!("table {} declares an empty column name", table);
            }
            if !seen.insert(column.as_str()) {
                bail!("table {} declares column {} twice", table, column);
            }
        }

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// How a list endpoint hands out its next page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pagination {
    /// `nextPageToken` in the body, sent back as the `pageToken` query parameter
    #[default]
    PageToken,
    /// `nextLink` in the body is the full URL of the next page
    NextLink,
    /// Single response, no continuation
    None,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub provider: ProviderKind,
    /// URL template; `{project}`, `{subscription}`, `{tenant}`, `{region}`,
    /// `{zone}`, `{resource_group}` and `{vault}` are substituted per scope
    pub list_url: String,
    /// Dot path to the item array in the response body (empty = body is the array)
    #[serde(default)]
    pub items_path: String,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub sub_scope: Option<SubScopeKind>,
    /// API the bearer token must be issued for
    #[serde(default)]
    pub audience: Audience,
    /// Object keys whose children are hoisted to the parent level
    #[serde(default)]
    pub inline_keys: Vec<String>,
    #[serde(default)]
    pub key_style: KeyStyle,
    pub columns: Vec<String>,
}

impl TableDef {
    /// Flattening parameters for this table's resources
    pub fn flatten_options(&self) -> FlattenOptions {
        FlattenOptions {
            key_style: self.key_style,
            inline_keys: self.inline_keys.clone(),
            ..FlattenOptions::default()
        }
    }
}

/// Root structure of tables/*.json
#[derive(Debug, Clone, Default, Deserialize)]
struct TableFile {
    #[serde(default)]
    tables: HashMap<String, TableDef>,
}

/// Registered table definitions and their validated schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, (TableDef, Arc<ColumnSchema>)>,
}

impl SchemaRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the embedded built-in tables
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for (name, content) in TABLE_FILES {
            let file: TableFile = serde_json::from_str(content)
                .with_context(|| format!("Failed to parse embedded table file {}", name))?;
            registry.extend(file)?;
        }
        Ok(registry)
    }

    /// Load every `.json`, `.yaml` and `.yml` file in `dir`
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read table directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: TableFile = match ext {
                "json" => serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?,
                "yaml" | "yml" => serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?,
                _ => continue,
            };

            tracing::info!(file = %path.display(), tables = file.tables.len(), "loaded table file");
            loaded += file.tables.len();
            self.extend(file)?;
        }

        Ok(loaded)
    }

    /// Register a single table definition
    pub fn register(&mut self, name: &str, def: TableDef) -> Result<()> {
        let schema = ColumnSchema::new(name, def.columns.iter().cloned())?;
        self.tables.insert(name.to_string(), (def, Arc::new(schema)));
        Ok(())
    }

    fn extend(&mut self, file: TableFile) -> Result<()> {
        for (name, def) in file.tables {
            self.register(&name, def)?;
        }
        Ok(())
    }

    /// Column schema of `table`
    pub fn schema(&self, table: &str) -> Result<Arc<ColumnSchema>, TableError> {
        self.tables
            .get(table)
            .map(|(_, schema)| Arc::clone(schema))
            .ok_or_else(|| TableError::ConfigMissing {
                table: table.to_string(),
            })
    }

    /// Full definition of `table`
    pub fn table(&self, table: &str) -> Result<&TableDef, TableError> {
        self.tables
            .get(table)
            .map(|(def, _)| def)
            .ok_or_else(|| TableError::ConfigMissing {
                table: table.to_string(),
            })
    }

    /// All table names, sorted
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
