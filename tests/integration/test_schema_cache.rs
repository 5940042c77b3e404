//! End-to-end tests for the schema cache against a scripted catalog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use quarry::{
    FieldInfo, SchemaCache, SchemaCacheConfig, SchemaError, TableId, WarehouseCatalog,
};

/// Counts fetches and holds each one open briefly, so overlapping misses
/// are observable.
struct SlowCatalog {
    fetches: AtomicUsize,
}

#[async_trait]
impl WarehouseCatalog for SlowCatalog {
    async fn fetch_table_schema(
        &self,
        _table: &TableId,
    ) -> Result<Vec<FieldInfo>, SchemaError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(lending_fields())
    }
}

fn lending_fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("AGREEMENTID", "STRING").required(),
        FieldInfo::new("DISBURSAL_DATE", "TIMESTAMP"),
        FieldInfo::new("EMI_AMOUNT", "NUMERIC"),
        FieldInfo::new("NPA_FLAG", "BOOLEAN"),
        FieldInfo::new("CUSTOMER_NAME", "STRING"),
        FieldInfo::new("REMARKS", "STRING").with_description("free text"),
    ]
}

fn loans_table() -> TableId {
    TableId::new("analytics-prod", "lending", "loans")
}

#[tokio::test]
async fn test_concurrent_misses_coalesce_into_one_fetch() {
    crate::init_tracing();
    let catalog = Arc::new(SlowCatalog {
        fetches: AtomicUsize::new(0),
    });
    let cache = SchemaCache::new(catalog.clone(), &SchemaCacheConfig::default());
    let table = loans_table();

    let (a, b) = tokio::join!(cache.get_schema(&table), cache.get_schema(&table));

    assert_eq!(a.unwrap().fields, b.unwrap().fields);
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    crate::init_tracing();
    let catalog = Arc::new(SlowCatalog {
        fetches: AtomicUsize::new(0),
    });
    let config = SchemaCacheConfig {
        ttl_secs: 1,
        ..SchemaCacheConfig::default()
    };
    let cache = SchemaCache::new(catalog.clone(), &config);
    let table = loans_table();

    cache.get_schema(&table).await.unwrap();
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);

    // Within the TTL the cached entry is served.
    cache.get_schema(&table).await.unwrap();
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);

    // The cache TTL runs on wall time, so this test genuinely waits it out.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    cache.get_schema(&table).await.unwrap();
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_critical_and_compact_views() {
    crate::init_tracing();
    let catalog = Arc::new(SlowCatalog {
        fetches: AtomicUsize::new(0),
    });
    let cache = SchemaCache::new(catalog.clone(), &SchemaCacheConfig::default());
    let table = loans_table();

    let critical = cache.critical_fields(&table).await.unwrap();
    let names: Vec<&str> = critical.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        ["AGREEMENTID", "DISBURSAL_DATE", "EMI_AMOUNT", "NPA_FLAG"]
    );

    let compact = cache.compact_schema(&table).await.unwrap();
    assert!(compact.contains("AGREEMENTID: STRING"));
    assert!(compact.contains("EMI_AMOUNT: NUMERIC"));
    assert_eq!(compact.lines().count(), lending_fields().len());

    // Both views reuse the single cached fetch.
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);
}

/// Catalog that is down for the first call and healthy afterwards.
struct RecoveringCatalog {
    fetches: AtomicUsize,
}

#[async_trait]
impl WarehouseCatalog for RecoveringCatalog {
    async fn fetch_table_schema(
        &self,
        _table: &TableId,
    ) -> Result<Vec<FieldInfo>, SchemaError> {
        if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(SchemaError::CatalogUnavailable(
                "metadata service 503".to_string(),
            ))
        } else {
            Ok(lending_fields())
        }
    }
}

#[tokio::test]
async fn test_catalog_outage_does_not_poison_the_cache() {
    crate::init_tracing();
    let catalog = Arc::new(RecoveringCatalog {
        fetches: AtomicUsize::new(0),
    });
    let cache = SchemaCache::new(catalog.clone(), &SchemaCacheConfig::default());
    let table = loans_table();

    assert!(cache.get_schema(&table).await.is_err());

    // The next lookup goes back to the catalog instead of replaying the error.
    let schema = cache.get_schema(&table).await.unwrap();
    assert_eq!(schema.fields.len(), lending_fields().len());
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 2);
}
