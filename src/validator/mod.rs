//! SQL safety validation.
//!
//! Pure, deterministic classification of SQL text: may this statement run
//! against the warehouse at all? No I/O, no state. The gateway consults the
//! validator before anything else, so a blocked query never costs a
//! warehouse round trip.

mod lexer;

use serde::Serialize;
use thiserror::Error;

use lexer::Item;

/// Why a statement was refused.
///
/// Carries enough structure (rule name, offending keyword) for callers to
/// render their own messaging; the `Display` form is a plain diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BlockedReason {
    #[error("query is empty")]
    EmptyQuery,

    #[error("multiple-statement risk: query contains more than one statement")]
    MultipleStatements,

    #[error("query must start with SELECT or WITH, found `{construct}`")]
    NotReadOnly { construct: String },

    #[error("destructive keyword `{keyword}` is not permitted")]
    DeniedKeyword { keyword: String },
}

impl BlockedReason {
    /// Stable rule identifier for structured logging.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty-query",
            Self::MultipleStatements => "multiple-statements",
            Self::NotReadOnly { .. } => "not-read-only",
            Self::DeniedKeyword { .. } => "deny-list",
        }
    }
}

/// Outcome of safety validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The statement may execute.
    Safe,
    /// The statement is refused; the reason names the triggering rule.
    Blocked(BlockedReason),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

/// Keywords whose standalone presence anywhere in a statement causes
/// rejection, even inside a CTE or subquery.
const DENY_LIST: [&str; 11] = [
    "DELETE", "UPDATE", "TRUNCATE", "DROP", "ALTER", "INSERT", "MERGE", "CREATE", "REPLACE",
    "GRANT", "REVOKE",
];

/// Leading keywords a read-only statement may start with.
const ALLOWED_LEADING: [&str; 2] = ["SELECT", "WITH"];

/// Validates SQL text against the read-only policy.
///
/// Stateless; a single instance may be shared freely across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSafetyValidator;

impl SqlSafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a statement. Rules apply in order: multiple statements,
    /// leading keyword, deny-listed tokens.
    pub fn validate(&self, sql: &str) -> Verdict {
        if sql.trim().is_empty() {
            return Verdict::Blocked(BlockedReason::EmptyQuery);
        }

        let items = lexer::scan(sql);

        if contains_multiple_statements(&items) {
            return Verdict::Blocked(BlockedReason::MultipleStatements);
        }

        let mut words = items.iter().filter_map(|i| match i {
            Item::Word(w) => Some(w.as_str()),
            Item::Semicolon => None,
        });

        let Some(first) = words.next() else {
            // Only literals, comments, or punctuation. Nothing executable.
            return Verdict::Blocked(BlockedReason::EmptyQuery);
        };

        let leading = first.to_uppercase();
        if !ALLOWED_LEADING.contains(&leading.as_str()) {
            return Verdict::Blocked(BlockedReason::NotReadOnly { construct: leading });
        }

        // The leading keyword itself was vetted above; scan the remainder.
        // A WITH clause can hide a destructive statement arbitrarily deep,
        // so every standalone token is checked.
        for word in words {
            let upper = word.to_uppercase();
            if DENY_LIST.contains(&upper.as_str()) {
                return Verdict::Blocked(BlockedReason::DeniedKeyword { keyword: upper });
            }
        }

        Verdict::Safe
    }
}

/// More than one top-level statement, excluding a single trailing semicolon.
fn contains_multiple_statements(items: &[Item]) -> bool {
    let mut semicolons_seen = 0;
    for item in items {
        match item {
            Item::Semicolon => semicolons_seen += 1,
            Item::Word(_) if semicolons_seen > 0 => return true,
            Item::Word(_) => {}
        }
    }
    semicolons_seen > 1
}
