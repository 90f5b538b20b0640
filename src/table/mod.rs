//! Table layer
//!
//! Everything needed to turn one provider resource into one table row:
//!
//! - [`schema`] - Table definitions and their column schemas
//! - [`flatten`] - Nested resource document to flat `path -> value` map
//! - [`project`] - Flat map to exactly the schema's columns, plus scope metadata
//!
//! # Example
//!
//! ```
//! use cloudtab::collect::{ProviderKind, ScopeContext};
//! use cloudtab::table::{flatten, project, ColumnSchema, FlattenOptions};
//! use serde_json::json;
//!
//! let schema = ColumnSchema::new("demo", ["project_id", "id", "labels"]).unwrap();
//! let scope = ScopeContext::account(ProviderKind::Gcp, "my-project");
//! let flat = flatten(&json!({"id": "42", "extra": true}), &FlattenOptions::default());
//! let row = project(&flat, &schema, &scope);
//!
//! assert_eq!(row["project_id"], "my-project");
//! assert_eq!(row["labels"], "");
//! assert_eq!(row.len(), 3);
//! ```

pub mod flatten;
pub mod project;
pub mod schema;

pub use flatten::{flatten, FlatRow, Flatten, FlattenOptions, KeyStyle};
pub use project::project;
pub use schema::{ColumnSchema, Pagination, SchemaRegistry, TableDef};
