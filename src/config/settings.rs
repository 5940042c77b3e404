//! Configuration settings for Quarry.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub routing: RoutingConfig,
    pub schema_cache: SchemaCacheConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            // Current directory
            PathBuf::from("config.toml"),
            PathBuf::from("quarry.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("quarry/config.toml"))
                .unwrap_or_default(),
            // Home directory
            PathBuf::from(shellexpand::tilde("~/.quarry/config.toml").as_ref()),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.cost_per_tib_usd < 0.0 {
            return Err(
                ConfigError::Invalid("gateway.cost_per_tib_usd must be >= 0".to_string()).into(),
            );
        }
        if self.gateway.default_timeout_secs == 0 {
            return Err(
                ConfigError::Invalid("gateway.default_timeout_secs must be > 0".to_string())
                    .into(),
            );
        }
        if self.gateway.retry.multiplier < 1.0 {
            return Err(
                ConfigError::Invalid("gateway.retry.multiplier must be >= 1.0".to_string()).into(),
            );
        }

        for field in [
            ("routing.confidence_threshold", self.routing.confidence_threshold),
            ("routing.margin", self.routing.margin),
            (
                "routing.followup_override_threshold",
                self.routing.followup_override_threshold,
            ),
            ("routing.signal_weight", self.routing.signal_weight),
        ] {
            if !(0.0..=1.0).contains(&field.1) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    field.0, field.1
                ))
                .into());
            }
        }

        if self.routing.domains.is_empty() {
            return Err(ConfigError::MissingField("routing.domains".to_string()).into());
        }
        let mut seen = std::collections::HashSet::new();
        for domain in &self.routing.domains {
            if domain.name.trim().is_empty() {
                return Err(
                    ConfigError::Invalid("routing domain name must not be empty".to_string())
                        .into(),
                );
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate routing domain `{}`",
                    domain.name
                ))
                .into());
            }
            for pattern in &domain.patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::InvalidPattern {
                        domain: domain.name.clone(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }
        if !seen.contains(self.routing.default_domain.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "routing.default_domain `{}` is not a configured domain",
                self.routing.default_domain
            ))
            .into());
        }

        if self.schema_cache.ttl_secs == 0 {
            return Err(
                ConfigError::Invalid("schema_cache.ttl_secs must be > 0".to_string()).into(),
            );
        }
        // A zero-capacity cache evicts every entry immediately, which turns
        // each lookup into a catalog round trip.
        if self.schema_cache.max_entries == 0 {
            return Err(
                ConfigError::Invalid("schema_cache.max_entries must be > 0".to_string()).into(),
            );
        }

        Ok(())
    }
}

/// Execution gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Monetary rate applied to bytes scanned, in USD per TiB.
    pub cost_per_tib_usd: f64,
    /// Timeout used when a request does not specify one, in seconds.
    pub default_timeout_secs: u64,
    /// Row cap used when a request does not specify one.
    pub default_max_results: usize,
    /// Backoff policy for transient execution errors.
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cost_per_tib_usd: 6.25,
            default_timeout_secs: 60,
            default_max_results: 1000,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff configuration.
///
/// Retries are bounded by the request's remaining timeout budget, never by a
/// fixed attempt count; these values only shape the delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Intent routing configuration.
///
/// The numeric thresholds have no principled derivation; they are exposed
/// here so deployments can tune them instead of patching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Minimum top-domain confidence for the deterministic fast path.
    pub confidence_threshold: f32,
    /// Minimum lead over the runner-up for the fast path.
    pub margin: f32,
    /// A follow-up keeps the previous domain unless the new question scores
    /// at least this much.
    pub followup_override_threshold: f32,
    /// Confidence contributed by each matched signal, capped at 1.0 total.
    pub signal_weight: f32,
    /// Domain returned when nothing matches and the model fallback fails.
    pub default_domain: String,
    /// Declarative domain table; adding a domain is a config change.
    pub domains: Vec<DomainRule>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            margin: 0.2,
            followup_override_threshold: 0.3,
            signal_weight: 0.3,
            default_domain: "sourcing".to_string(),
            domains: default_domains(),
        }
    }
}

/// Keyword and pattern signals for one routing domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRule {
    /// Domain label; also the only label the classification model may return
    /// for this domain.
    pub name: String,
    /// Case-insensitive keywords matched on whole tokens.
    pub keywords: Vec<String>,
    /// Regex patterns matched on the lowercased question.
    pub patterns: Vec<String>,
}

/// Schema cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    /// Time-to-live for a cached table schema, in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached tables.
    pub max_entries: u64,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 256,
        }
    }
}

/// Out-of-the-box domain table mirroring a lending analytics deployment.
/// Deployments are expected to replace this wholesale via TOML.
fn default_domains() -> Vec<DomainRule> {
    vec![
        DomainRule {
            name: "collections".to_string(),
            keywords: [
                "dpd", "delinquency", "delinquent", "recovery", "collection", "overdue",
                "payment", "outstanding", "pos", "portfolio", "bucket", "nns", "gns", "mob",
                "emi", "installment", "arrears",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            patterns: vec![
                r"\b\d+\+".to_string(),
                r"\bgns\d+".to_string(),
                r"\bnns\d+".to_string(),
            ],
        },
        DomainRule {
            name: "sourcing".to_string(),
            keywords: [
                "application", "approval", "sourcing", "acquisition", "apply", "customer",
                "segment", "product", "conversion", "funnel", "sanction", "manufacturer",
                "dealer", "branch", "rejected", "accepted", "login", "logins", "lead", "leads",
                "onboarding",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            patterns: vec![
                r"\bapproval\s+rate\b".to_string(),
                r"\bconversion\s+rate\b".to_string(),
                r"\bloan\s+application\b".to_string(),
            ],
        },
        DomainRule {
            name: "disbursal".to_string(),
            keywords: [
                "disbursal", "disbursement", "payout", "transfer", "neft", "rtgs", "imps",
                "fund", "disbursed",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            patterns: vec![
                r"\bdisburs(al|ement)\s+(amount|count|trend)\b".to_string(),
                r"\bpayment\s+mode\b".to_string(),
            ],
        },
    ]
}
