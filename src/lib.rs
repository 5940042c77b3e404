//! Quarry: Safe Query Mediation for Analytic Warehouses
//!
//! A safety validation, execution gateway, and intent routing layer that
//! sits between machine-generated SQL and a columnar analytic warehouse.

pub mod config;
pub mod error;
pub mod gateway;
pub mod router;
pub mod schema;
pub mod validator;
pub mod warehouse;

pub use config::{
    Config, DomainRule, GatewayConfig, RetryConfig, RoutingConfig, SchemaCacheConfig,
};
pub use error::{ConfigError, QuarryError, Result, RoutingError, SchemaError};
pub use gateway::{
    CallerMetadata, ExecutionGateway, ExecutionStatus, QueryRequest, QueryResult, RetryPolicy,
};
pub use router::{
    ConversationTurn, DomainClassifier, DomainScore, IntentRouter, RoutingDecision, RoutingRequest,
};
pub use schema::{FieldInfo, SchemaCache, TableId, TableSchema, WarehouseCatalog};
pub use validator::{BlockedReason, SqlSafetyValidator, Verdict};
pub use warehouse::{
    DryRunEstimate, JobHandle, JobOutcome, QueryTarget, WarehouseClient, WarehouseError,
};
