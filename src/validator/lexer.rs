//! Minimal SQL scanner with quote and comment tracking.
//!
//! The safety validator only needs two things from a statement: the bare
//! word tokens that appear outside string literals and comments, and the
//! top-level statement boundaries. A full parser would be overkill; a small
//! explicit state machine is enough and is easy to test in isolation.

/// Scanner state while walking the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// A significant item found at the top level of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    /// A bare word token (identifier, keyword, or number).
    Word(String),
    /// A statement-separating semicolon.
    Semicolon,
}

/// Scan SQL text into top-level items, skipping string literals
/// (single-quote, double-quote, backtick) and comments (`--` and `/* */`).
///
/// Doubled quotes inside a literal (`''`, `""`) and backslash escapes are
/// treated as part of the literal. Unterminated literals and comments simply
/// run to the end of input.
pub(crate) fn scan(sql: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut word = String::new();
    let mut state = State::Normal;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '\'' => {
                    flush_word(&mut word, &mut items);
                    state = State::SingleQuote;
                }
                '"' => {
                    flush_word(&mut word, &mut items);
                    state = State::DoubleQuote;
                }
                '`' => {
                    flush_word(&mut word, &mut items);
                    state = State::Backtick;
                }
                '-' if chars.peek() == Some(&'-') => {
                    flush_word(&mut word, &mut items);
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    flush_word(&mut word, &mut items);
                    chars.next();
                    state = State::BlockComment;
                }
                ';' => {
                    flush_word(&mut word, &mut items);
                    items.push(Item::Semicolon);
                }
                c if c.is_alphanumeric() || c == '_' => {
                    word.push(c);
                }
                _ => {
                    flush_word(&mut word, &mut items);
                }
            },
            State::SingleQuote => match c {
                '\\' => {
                    chars.next();
                }
                '\'' => {
                    // Doubled quote is an escaped quote, not a terminator.
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                    } else {
                        state = State::Normal;
                    }
                }
                _ => {}
            },
            State::DoubleQuote => match c {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                    } else {
                        state = State::Normal;
                    }
                }
                _ => {}
            },
            State::Backtick => {
                if c == '`' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                }
            }
        }
    }
    flush_word(&mut word, &mut items);

    items
}

fn flush_word(word: &mut String, items: &mut Vec<Item>) {
    if !word.is_empty() {
        items.push(Item::Word(std::mem::take(word)));
    }
}
