//! Intent routing.
//!
//! Maps a natural-language question to a business domain so downstream
//! components know which tables and prompt context apply. Deterministic
//! keyword and pattern scoring decides the clear cases; an optional
//! classification model breaks the ambiguous ones. The router always
//! produces a decision: if the model is down or returns garbage, it logs
//! the failure and falls back to the best keyword score or, failing that,
//! the configured default domain.

mod types;

pub use types::{ConversationTurn, DomainScore, RoutingDecision, RoutingRequest};

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{DomainRule, RoutingConfig};
use crate::error::{ConfigError, Result, RoutingError};

/// Confidence assigned to a model-produced label. Model scores are not
/// calibrated against keyword scores, so a fixed value above the fast-path
/// threshold is used instead of whatever the model reports.
const MODEL_FALLBACK_CONFIDENCE: f32 = 0.7;

/// Confidence assigned when a follow-up keeps the previous turn's domain.
const FOLLOWUP_KEEP_CONFIDENCE: f32 = 0.9;

/// Classification model collaborator.
///
/// Must return exactly one of the offered labels; anything else is treated
/// as a failure and the router degrades to keyword scoring.
#[async_trait]
pub trait DomainClassifier: Send + Sync {
    async fn classify(
        &self,
        question: &str,
        labels: &[String],
    ) -> std::result::Result<String, RoutingError>;
}

struct CompiledDomain {
    name: String,
    /// Keywords matched against whole tokens of the question.
    token_keywords: Vec<String>,
    /// Keywords containing punctuation, matched as raw substrings.
    raw_keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl CompiledDomain {
    fn compile(rule: &DomainRule) -> std::result::Result<Self, ConfigError> {
        let (token_keywords, raw_keywords): (Vec<String>, Vec<String>) = rule
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .partition(|k| k.chars().all(|c| c.is_ascii_alphanumeric()));

        let patterns = rule
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                    domain: rule.name.clone(),
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: rule.name.clone(),
            token_keywords,
            raw_keywords,
            patterns,
        })
    }

    /// Signals this domain matches in the question. `lowered` is the raw
    /// lowercased text; `token_text` is the space-delimited token rendering.
    fn signals(&self, lowered: &str, token_text: &str) -> Vec<String> {
        let mut signals = Vec::new();
        for keyword in &self.token_keywords {
            if token_text.contains(&format!(" {keyword} ")) {
                signals.push(format!("keyword:{keyword}"));
            }
        }
        for keyword in &self.raw_keywords {
            if lowered.contains(keyword.as_str()) {
                signals.push(format!("keyword:{keyword}"));
            }
        }
        for pattern in &self.patterns {
            if pattern.is_match(lowered) {
                signals.push(format!("pattern:{}", pattern.as_str()));
            }
        }
        signals
    }
}

/// Routes questions to domains.
///
/// Cheap to clone behind an `Arc`; holds no per-session state. Conversation
/// history travels in the request.
pub struct IntentRouter {
    domains: Vec<CompiledDomain>,
    labels: Vec<String>,
    confidence_threshold: f32,
    margin: f32,
    followup_override_threshold: f32,
    signal_weight: f32,
    default_domain: String,
    followup_phrases: Regex,
    classifier: Option<Arc<dyn DomainClassifier>>,
}

impl IntentRouter {
    /// Build a router from configuration, compiling every domain pattern.
    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        if config.domains.is_empty() {
            return Err(ConfigError::MissingField("routing.domains".to_string()).into());
        }
        let domains = config
            .domains
            .iter()
            .map(CompiledDomain::compile)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let labels = domains.iter().map(|d| d.name.clone()).collect();

        // Phrases that signal the question leans on the previous answer.
        let followup_phrases = Regex::new(
            r"(?x)
            ^\s*(and|also|then|ok|okay)\b
            | \b(what|how)\s+about\b
            | \bsame\s+(for|thing)\b
            | \bbreak\s+(it|that|this|them)\s+down\b
            | \b(that|those|these|it)\s+(one|ones|number|numbers|again)\b
            | \binstead\b
            | \bdrill\s+down\b
            ",
        )
        .map_err(|e| ConfigError::Invalid(format!("followup phrase set: {e}")))?;

        info!(domains = domains.len(), "IntentRouter initialized");

        Ok(Self {
            domains,
            labels,
            confidence_threshold: config.confidence_threshold,
            margin: config.margin,
            followup_override_threshold: config.followup_override_threshold,
            signal_weight: config.signal_weight,
            default_domain: config.default_domain.clone(),
            followup_phrases,
            classifier: None,
        })
    }

    /// Attach a classification model for the ambiguous cases. Without one,
    /// the router is fully deterministic.
    pub fn with_classifier(mut self, classifier: Arc<dyn DomainClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Route a question. Never fails; worst case is the default domain at
    /// zero confidence.
    pub async fn route(&self, request: &RoutingRequest) -> RoutingDecision {
        let lowered = request.question.to_lowercase();
        let token_text = tokenize(&lowered);

        let mut scored: Vec<(usize, Vec<String>, f32)> = self
            .domains
            .iter()
            .enumerate()
            .map(|(i, domain)| {
                let signals = domain.signals(&lowered, &token_text);
                let confidence = (signals.len() as f32 * self.signal_weight).min(1.0);
                (i, signals, confidence)
            })
            .collect();
        // Stable sort: ties keep configuration order.
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let top = &scored[0];
        let runner_up_confidence = scored.get(1).map(|s| s.2).unwrap_or(0.0);

        // Follow-ups stick to the previous domain unless the new question
        // carries enough signal of its own to override.
        if let Some(previous) = request.history.last() {
            if self.followup_phrases.is_match(&lowered) {
                if top.2 >= self.followup_override_threshold {
                    debug!(
                        domain = %self.domains[top.0].name,
                        confidence = top.2,
                        "follow-up overridden by fresh signals"
                    );
                    return self.decide(&scored, top.0, top.2, top.1.clone(), true);
                }
                debug!(domain = %previous.domain, "follow-up keeps previous domain");
                return self.decide(
                    &scored,
                    usize::MAX,
                    FOLLOWUP_KEEP_CONFIDENCE,
                    vec![format!("followup:{}", previous.domain)],
                    true,
                )
                .with_domain(previous.domain.clone());
            }
        }

        // Fast path: a clear winner skips the model entirely.
        if top.2 >= self.confidence_threshold && top.2 - runner_up_confidence >= self.margin {
            debug!(
                domain = %self.domains[top.0].name,
                confidence = top.2,
                "deterministic fast path"
            );
            return self.decide(&scored, top.0, top.2, top.1.clone(), false);
        }

        // Ambiguous: ask the model, degrading silently on any failure.
        if let Some(classifier) = &self.classifier {
            match classifier.classify(&request.question, &self.labels).await {
                Ok(label) if self.labels.contains(&label) => {
                    info!(domain = %label, "model resolved ambiguous question");
                    return self
                        .decide(
                            &scored,
                            usize::MAX,
                            MODEL_FALLBACK_CONFIDENCE,
                            vec![format!("model:{label}")],
                            false,
                        )
                        .with_domain(label);
                }
                Ok(label) => {
                    warn!(label = %label, "model returned an unknown domain label");
                }
                Err(err) => {
                    warn!("classification model failed, degrading to keyword scoring: {err}");
                }
            }
        }

        if top.2 > 0.0 {
            return self.decide(&scored, top.0, top.2, top.1.clone(), false);
        }

        debug!(domain = %self.default_domain, "no signals matched, using default domain");
        self.decide(&scored, usize::MAX, 0.0, Vec::new(), false)
            .with_domain(self.default_domain.clone())
    }

    /// Assemble a decision with alternatives drawn from the scored list.
    /// `chosen` indexes into `self.domains`; `usize::MAX` means the domain
    /// is set separately via [`RoutingDecision::with_domain`].
    fn decide(
        &self,
        scored: &[(usize, Vec<String>, f32)],
        chosen: usize,
        confidence: f32,
        matched_signals: Vec<String>,
        is_followup: bool,
    ) -> RoutingDecision {
        let domain = self
            .domains
            .get(chosen)
            .map(|d| d.name.clone())
            .unwrap_or_default();
        let alternatives = scored
            .iter()
            .filter(|(i, _, c)| *i != chosen && *c > 0.0)
            .map(|(i, _, c)| DomainScore {
                domain: self.domains[*i].name.clone(),
                confidence: *c,
            })
            .collect();

        RoutingDecision {
            domain,
            confidence,
            matched_signals,
            alternatives,
            is_followup,
        }
    }
}

impl RoutingDecision {
    fn with_domain(mut self, domain: String) -> Self {
        self.alternatives.retain(|a| a.domain != domain);
        self.domain = domain;
        self
    }
}

/// Space-delimited token rendering with sentinel padding, so whole-token
/// keyword checks are a substring search for ` kw `.
fn tokenize(lowered: &str) -> String {
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    format!(" {} ", tokens.join(" "))
}
