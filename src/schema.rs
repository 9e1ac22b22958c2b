//! Schema descriptors and sanitization
//!
//! The schema descriptor is an immutable snapshot of the introspected
//! database structure. The sanitizer produces the filtered view that is the
//! only schema a model prompt ever sees; the raw snapshot stays untouched so
//! it can be re-sanitized on every turn.

use crate::policy::MaskPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Column name and type, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

/// Table with its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Complete schema snapshot at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    pub tables: Vec<TableDescriptor>,
    pub captured_at: DateTime<Utc>,
    pub checksum: String,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        let checksum = Self::compute_checksum(&tables);
        Self {
            tables,
            captured_at: Utc::now(),
            checksum,
        }
    }

    /// Compute checksum from schema content
    pub fn compute_checksum(tables: &[TableDescriptor]) -> String {
        let mut hasher = Sha256::new();

        for table in tables {
            hasher.update(table.name.as_bytes());
            for col in &table.columns {
                hasher.update(format!("{}.{}:{}", table.name, col.name, col.data_type).as_bytes());
            }
        }

        let result = hasher.finalize();
        format!("{:x}", result)
    }

    /// Render the schema as the plain-text block used in prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str("Table ");
            out.push_str(&table.name);
            out.push_str(" (");
            let cols: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            out.push_str(&cols.join(", "));
            out.push_str(")\n");
        }
        out
    }
}

/// Disclosure-control filter over a schema snapshot.
///
/// This is not an execution-time access control: it decides what the model
/// learns about, not what the database credential can physically reach.
pub struct SchemaSanitizer;

impl SchemaSanitizer {
    /// Produce a new descriptor with sensitive tables and columns removed.
    ///
    /// A table whose columns are all sensitive is dropped entirely - an
    /// empty table entry would only advertise that something was removed.
    pub fn sanitize(schema: &SchemaDescriptor, policy: &MaskPolicy) -> SchemaDescriptor {
        let tables: Vec<TableDescriptor> = schema
            .tables
            .iter()
            .filter(|table| !policy.is_sensitive_table(&table.name))
            .filter_map(|table| {
                let columns: Vec<ColumnDescriptor> = table
                    .columns
                    .iter()
                    .filter(|col| !policy.is_sensitive_column(&col.name))
                    .cloned()
                    .collect();

                if columns.is_empty() {
                    None
                } else {
                    Some(TableDescriptor {
                        name: table.name.clone(),
                        columns,
                    })
                }
            })
            .collect();

        SchemaDescriptor::new(tables)
    }
}
