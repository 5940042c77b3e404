//! Request and decision types for intent routing.

use serde::{Deserialize, Serialize};

/// One prior exchange in the conversation, with the domain it was routed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub domain: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            domain: domain.into(),
        }
    }
}

/// A routing request: the question plus whatever history the session has.
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    pub question: String,
    /// Prior turns, oldest first. Empty for a fresh session.
    pub history: Vec<ConversationTurn>,
    pub session_id: Option<String>,
}

impl RoutingRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            history: Vec::new(),
            session_id: None,
        }
    }

    pub fn history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A scored domain candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain: String,
    pub confidence: f32,
}

/// The router's answer. Always produced; routing never fails outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen domain label, always one of the configured domains.
    pub domain: String,
    /// Confidence in [0, 1]. Zero means nothing matched at all.
    pub confidence: f32,
    /// Signals that produced the score, e.g. `keyword:dpd` or `model:collections`.
    /// Empty only when the decision fell through to the default domain.
    pub matched_signals: Vec<String>,
    /// Other domains that scored above zero, best first.
    pub alternatives: Vec<DomainScore>,
    /// Whether the question was treated as a follow-up to the previous turn.
    pub is_followup: bool,
}
