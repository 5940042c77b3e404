//! Warehouse table metadata cache.
//!
//! Schemas change rarely and catalog round trips are slow, so table metadata
//! is cached with a TTL and refreshed lazily. Lookups for the same table are
//! coalesced: two concurrent misses issue exactly one catalog fetch. Fetch
//! failures propagate to the caller and are never cached, so a transient
//! catalog outage does not poison the TTL window.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SchemaCacheConfig;
use crate::error::{QuarryError, Result, SchemaError};

/// Fully-qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Engine type name as reported by the catalog (e.g. `TIMESTAMP`).
    pub field_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            nullable: true,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether this field matters for typical analytic filters: temporal
    /// columns, key-like names, amounts, flags, and rate/count measures.
    pub fn is_critical(&self) -> bool {
        let ty = self.field_type.to_uppercase();
        let name = self.name.to_uppercase();

        let is_temporal =
            ty.contains("TIMESTAMP") || ty.contains("DATETIME") || ty.contains("DATE");
        let is_key = name.ends_with("ID") || name.ends_with("NO") || name.ends_with("_KEY");
        let is_amount =
            name.contains("AMOUNT") || name.contains("AMT") || name.contains("VALUE");
        let is_flag = name.contains("FLAG") || name.ends_with("_IND");
        let is_measure = name.contains("RATE")
            || name.contains("PCT")
            || name.contains("PERCENTAGE")
            || name.contains("COUNT");
        let is_date_named = name.contains("DATE");

        is_temporal || is_key || is_amount || is_flag || is_measure || is_date_named
    }
}

/// Cached schema of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: TableId,
    /// Fields in catalog order.
    pub fields: Vec<FieldInfo>,
    /// When the catalog round trip completed.
    pub fetched_at: SystemTime,
}

impl TableSchema {
    /// Fields selected by the critical-field heuristics, in schema order.
    pub fn critical_fields(&self) -> Vec<&FieldInfo> {
        self.fields.iter().filter(|f| f.is_critical()).collect()
    }

    /// Compact `name: TYPE` rendering, one field per line.
    pub fn compact(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}: {}", f.name, f.field_type))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Metadata catalog collaborator.
///
/// One implementation per warehouse engine; the cache only ever asks for a
/// full, ordered field list.
#[async_trait]
pub trait WarehouseCatalog: Send + Sync {
    async fn fetch_table_schema(
        &self,
        table: &TableId,
    ) -> std::result::Result<Vec<FieldInfo>, SchemaError>;
}

/// TTL-bound cache of table schemas.
#[derive(Clone)]
pub struct SchemaCache {
    cache: Cache<TableId, Arc<TableSchema>>,
    catalog: Arc<dyn WarehouseCatalog>,
}

impl SchemaCache {
    /// Create a new schema cache over the given catalog.
    pub fn new(catalog: Arc<dyn WarehouseCatalog>, config: &SchemaCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        info!(
            ttl_secs = config.ttl_secs,
            max_entries = config.max_entries,
            "SchemaCache initialized"
        );

        Self { cache, catalog }
    }

    /// Get the schema for a table, fetching from the catalog on a miss or
    /// an expired entry. Concurrent misses for the same table are coalesced
    /// into a single fetch.
    pub async fn get_schema(&self, table: &TableId) -> Result<Arc<TableSchema>> {
        let key = table.clone();
        let catalog = Arc::clone(&self.catalog);

        self.cache
            .try_get_with(key.clone(), async move {
                debug!(table = %key, "schema cache miss, fetching from catalog");
                let fields = catalog.fetch_table_schema(&key).await?;
                info!(table = %key, columns = fields.len(), "fetched table schema");
                Ok::<_, SchemaError>(Arc::new(TableSchema {
                    table: key,
                    fields,
                    fetched_at: SystemTime::now(),
                }))
            })
            .await
            .map_err(|e: Arc<SchemaError>| QuarryError::Schema((*e).clone()))
    }

    /// Critical fields of a table, computed over the cached schema. Never
    /// triggers a fetch beyond what `get_schema` would.
    pub async fn critical_fields(&self, table: &TableId) -> Result<Vec<FieldInfo>> {
        let schema = self.get_schema(table).await?;
        Ok(schema.critical_fields().into_iter().cloned().collect())
    }

    /// Compact `name: TYPE` view of a table, for prompt-budget-conscious
    /// callers.
    pub async fn compact_schema(&self, table: &TableId) -> Result<String> {
        let schema = self.get_schema(table).await?;
        Ok(schema.compact())
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        info!("schema cache cleared");
    }

    /// Number of cached tables.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
