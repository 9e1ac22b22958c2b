//! SQL validation
//!
//! Allow-list classification of model-generated SQL before anything reaches
//! the database. The validator only classifies - it never rewrites a
//! statement - and it fails closed: anything it cannot confidently read is
//! rejected.
//!
//! Blocked-keyword detection is a tokenizer problem, not a substring search:
//! a column named `dropout_rate` must not trip the DROP rule, while
//! `DROP/**/TABLE` must. Comments and string literals are stripped first,
//! then keywords are matched as standalone word tokens.

use crate::policy::MaskPolicy;
use std::fmt;

/// Why a candidate statement was refused.
///
/// These are fixed, enumerable reasons; they never quote statement text, so
/// a hostile model response cannot smuggle content into an error surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing statement-shaped was found
    EmptyStatement,
    /// A deny-listed keyword appeared as a standalone token
    BlockedKeyword(String),
    /// A statement separator introduced a second statement
    StackedStatements,
    /// The statement does not begin with SELECT
    NotSelect,
    /// The statement references no table at all
    NoTableReference,
    /// The statement could not be confidently read
    Unparseable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::EmptyStatement => write!(f, "no statement extracted"),
            RejectReason::BlockedKeyword(kw) => {
                write!(f, "statement contains blocked keyword {}", kw)
            }
            RejectReason::StackedStatements => write!(f, "stacked statements are not allowed"),
            RejectReason::NotSelect => write!(f, "only SELECT statements are allowed"),
            RejectReason::NoTableReference => write!(f, "statement references no tables"),
            RejectReason::Unparseable => write!(f, "statement could not be parsed"),
        }
    }
}

/// Validation verdict for a candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Single-SELECT allow-list validator.
pub struct SqlValidator;

impl SqlValidator {
    /// Classify a candidate statement against the policy.
    pub fn validate(sql: &str, policy: &MaskPolicy) -> Verdict {
        let stripped = match strip_comments_and_literals(sql) {
            Ok(s) => s,
            Err(reason) => return Verdict::Rejected(reason),
        };

        let tokens = word_tokens(&stripped);
        if tokens.is_empty() {
            return Verdict::Rejected(RejectReason::EmptyStatement);
        }

        for token in &tokens {
            if policy.blocked_keywords.contains(token) {
                return Verdict::Rejected(RejectReason::BlockedKeyword(token.clone()));
            }
        }

        if has_stacked_statement(&stripped) {
            return Verdict::Rejected(RejectReason::StackedStatements);
        }

        if policy.select_only && tokens[0] != "SELECT" {
            return Verdict::Rejected(RejectReason::NotSelect);
        }

        if !tokens.iter().any(|t| t == "FROM") {
            return Verdict::Rejected(RejectReason::NoTableReference);
        }

        Verdict::Accepted
    }
}

/// Replace comments and quoted literals with spaces, preserving everything
/// else. Unterminated comments or literals make the statement unreadable.
fn strip_comments_and_literals(sql: &str) -> Result<String, RejectReason> {
    let bytes: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        match (c, next) {
            // Line comment: runs to end of line
            ('-', Some('-')) => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
                out.push(' ');
            }
            // Block comment: must be terminated
            ('/', Some('*')) => {
                i += 2;
                let mut closed = false;
                while i + 1 < bytes.len() {
                    if bytes[i] == '*' && bytes[i + 1] == '/' {
                        i += 2;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(RejectReason::Unparseable);
                }
                out.push(' ');
            }
            // Single-quoted string literal, '' escapes a quote
            ('\'', _) => {
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == '\'' {
                        if bytes.get(i + 1) == Some(&'\'') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(RejectReason::Unparseable);
                }
                out.push(' ');
            }
            // Double-quoted identifier
            ('"', _) => {
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == '"' {
                        i += 1;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(RejectReason::Unparseable);
                }
                // Quoted identifiers still count as a word for tokenization
                out.push_str(" ident ");
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Uppercased word tokens over identifier characters.
fn word_tokens(stripped: &str) -> Vec<String> {
    stripped
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}

/// True when a `;` is followed by any further statement content.
fn has_stacked_statement(stripped: &str) -> bool {
    match stripped.find(';') {
        Some(idx) => stripped[idx + 1..].chars().any(|c| !c.is_whitespace() && c != ';'),
        None => false,
    }
}
