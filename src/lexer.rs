//! Splitting of a raw line into free-text segments and conditional operators.
//!
//! The line is first respaced so that every operator stands alone between
//! whitespace, then scanned by a small state machine that accumulates text,
//! recognizes the two-character operators `&&` and `||`, and flushes the
//! accumulated text whenever an operator completes.

use crate::parser::EdgeCondition;

/// Operators padded with spaces by [`normalize_operators`], longest first.
const SPACED_OPERATORS: [&str; 5] = ["&&", "||", ">>", ">", "<"];

/// A token of the conditional layer of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Free text between operators, trimmed, never empty.
    Text(String),
    /// `&&`
    And,
    /// `||`
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Collecting ordinary characters.
    Accumulate,
    /// Saw `&` or `|`; the next character decides whether an operator completes.
    Pending(char),
}

struct Scanner {
    state: ScanState,
    buffer: String,
    out: Vec<Token>,
}

impl Scanner {
    fn new() -> Self {
        Self {
            state: ScanState::Accumulate,
            buffer: String::new(),
            out: Vec::new(),
        }
    }

    fn feed(&mut self, ch: char) {
        match self.state {
            ScanState::Accumulate => self.accumulate(ch),
            ScanState::Pending(first) if first == ch => {
                self.state = ScanState::Accumulate;
                self.flush();
                self.out.push(if ch == '&' { Token::And } else { Token::Or });
            }
            ScanState::Pending(first) => {
                self.state = ScanState::Accumulate;
                self.buffer.push(first);
                self.accumulate(ch);
            }
        }
    }

    fn accumulate(&mut self, ch: char) {
        if ch == '&' || ch == '|' {
            self.state = ScanState::Pending(ch);
        } else {
            self.buffer.push(ch);
        }
    }

    /// Emit the accumulated text as a segment, trimmed at its boundaries.
    fn flush(&mut self) {
        let text = self.buffer.trim();
        if !text.is_empty() {
            self.out.push(Token::Text(text.to_string()));
        }
        self.buffer.clear();
    }

    fn finish(mut self) -> Vec<Token> {
        if let ScanState::Pending(first) = self.state {
            self.buffer.push(first);
        }
        self.flush();
        self.out
    }
}

/// Surround `&&`, `||`, `>>`, `>` and `<` with spaces so that whitespace
/// splitting yields each of them as a standalone token.
pub fn normalize_operators(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 16);
    let mut rest = line;
    'scan: while let Some(ch) = rest.chars().next() {
        for op in SPACED_OPERATORS {
            if let Some(tail) = rest.strip_prefix(op) {
                out.push(' ');
                out.push_str(op);
                out.push(' ');
                rest = tail;
                continue 'scan;
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Scan a line into text segments and `&&`/`||` operators, preserving order.
///
/// A single `&` or `|` is ordinary text at this layer.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut scanner = Scanner::new();
    for ch in line.chars() {
        scanner.feed(ch);
    }
    scanner.finish()
}

/// Pair every text segment with the edge condition toward the next segment.
///
/// The edge comes from the first operator following the segment, and only
/// counts when another segment follows; trailing and repeated operators are
/// dropped.
pub fn segments(tokens: Vec<Token>) -> Vec<(String, EdgeCondition)> {
    let mut result: Vec<(String, EdgeCondition)> = Vec::new();
    let mut pending: Option<EdgeCondition> = None;
    for token in tokens {
        match token {
            Token::Text(text) => {
                if let (Some(edge), Some(last)) = (pending.take(), result.last_mut()) {
                    last.1 = edge;
                }
                result.push((text, EdgeCondition::Unconditional));
            }
            Token::And => {
                pending.get_or_insert(EdgeCondition::RunIfSucceeded);
            }
            Token::Or => {
                pending.get_or_insert(EdgeCondition::RunIfFailed);
            }
        }
    }
    result
}
