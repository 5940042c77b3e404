//! Configuration for Quarry.

mod settings;

pub use settings::{
    Config, DomainRule, GatewayConfig, RetryConfig, RoutingConfig, SchemaCacheConfig,
};
