//! # Event Name Patterns
//!
//! Glob matching of dot-segmented event names (`user.created`) against
//! subscription patterns (`user.*`).
//!
//! Two semantics exist and a compiled pattern is bound to exactly one of them:
//!
//! - [`MatchMode::Strict`]: `*` matches a run of non-dot characters and `?` a
//!   single non-dot character, so wildcards never cross a segment boundary.
//!   `user.*` matches `user.created` but not `user.created.v2`.
//! - [`MatchMode::Shell`]: shell-glob semantics where `*` and `?` also match
//!   dots. `user.*` matches both names above.

use std::fmt;

/// Wildcard semantics of a compiled pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Wildcards stay within one dot-delimited segment
    Strict,
    /// Wildcards may span segments
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    AnyRun,
}

/// A compiled glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    mode: MatchMode,
    /// Strict mode: one token list per segment. Shell mode: a single list.
    segments: Vec<Vec<Token>>,
}

impl GlobPattern {
    /// Compile `pattern` with the given semantics
    pub fn new(pattern: &str, mode: MatchMode) -> Self {
        let segments = match mode {
            MatchMode::Strict => pattern.split('.').map(tokenize).collect(),
            MatchMode::Shell => vec![tokenize(pattern)],
        };

        Self {
            source: pattern.to_string(),
            mode,
            segments,
        }
    }

    /// Compile with segment-bounded wildcards
    pub fn strict(pattern: &str) -> Self {
        Self::new(pattern, MatchMode::Strict)
    }

    /// Compile with shell-glob wildcards
    pub fn shell(pattern: &str) -> Self {
        Self::new(pattern, MatchMode::Shell)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Whether the pattern contains no wildcard at all
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .flatten()
            .all(|t| matches!(t, Token::Literal(_)))
    }

    /// Test an event name against this pattern
    pub fn matches(&self, name: &str) -> bool {
        match self.mode {
            MatchMode::Strict => {
                let parts: Vec<&str> = name.split('.').collect();
                parts.len() == self.segments.len()
                    && self
                        .segments
                        .iter()
                        .zip(parts)
                        .all(|(tokens, part)| match_tokens(tokens, part))
            }
            MatchMode::Shell => match_tokens(&self.segments[0], name),
        }
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            // consecutive stars are equivalent to one
            '*' if tokens.last() == Some(&Token::AnyRun) => {}
            '*' => tokens.push(Token::AnyRun),
            '?' => tokens.push(Token::AnyChar),
            c => tokens.push(Token::Literal(c)),
        }
    }
    tokens
}

/// Iterative wildcard match with single-star backtracking
fn match_tokens(tokens: &[Token], text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let (mut t, mut c) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < chars.len() {
        match tokens.get(t) {
            Some(Token::Literal(l)) if *l == chars[c] => {
                t += 1;
                c += 1;
            }
            Some(Token::AnyChar) => {
                t += 1;
                c += 1;
            }
            Some(Token::AnyRun) => {
                backtrack = Some((t, c));
                t += 1;
            }
            _ => match backtrack {
                Some((star_t, star_c)) => {
                    t = star_t + 1;
                    c = star_c + 1;
                    backtrack = Some((star_t, star_c + 1));
                }
                None => return false,
            },
        }
    }

    tokens[t..].iter().all(|tok| *tok == Token::AnyRun)
}
