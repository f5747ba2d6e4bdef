//! SPDX license expression parsing.
//!
//! Grammar (AND binds tighter than OR):
//! ```text
//! expr     := or_expr
//! or_expr  := and_expr ( "OR" and_expr )*
//! and_expr := atom ( "AND" atom )*
//! atom     := "(" expr ")" | id ( "WITH" exception )?
//! ```
//!
//! Every leaf must be a known SPDX license id (a trailing `+` is accepted) and
//! every `WITH` operand a known SPDX exception id, otherwise the expression is
//! rejected as a whole.

use std::iter::Peekable;
use std::vec::IntoIter;

use crate::license::spdx::{find_license_by_id, is_exception_id, KnownLicense};

/// Parsed SPDX expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseExpression {
    License(KnownLicense),
    With {
        license: KnownLicense,
        exception: String,
    },
    And(Box<LicenseExpression>, Box<LicenseExpression>),
    Or(Box<LicenseExpression>, Box<LicenseExpression>),
}

impl LicenseExpression {
    /// Every license id at the leaves, left to right, without duplicates.
    pub fn license_ids(&self) -> Vec<KnownLicense> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<KnownLicense>) {
        match self {
            LicenseExpression::License(l) | LicenseExpression::With { license: l, .. } => {
                if !out.iter().any(|seen| seen.id == l.id) {
                    out.push(*l);
                }
            }
            LicenseExpression::And(a, b) | LicenseExpression::Or(a, b) => {
                a.collect_leaves(out);
                b.collect_leaves(out);
            }
        }
    }
}

/// Parse an SPDX expression; `None` when it is malformed or names unknown ids.
///
/// A `/` is accepted as shorthand for `OR` (e.g. `MIT/Apache-2.0`).
pub fn parse_license_expression(expr: &str) -> Option<LicenseExpression> {
    let tokens = tokenize(expr);
    if tokens.is_empty() {
        return None;
    }

    let mut parser = ExprParser {
        tokens: tokens.into_iter().peekable(),
    };
    let parsed = parser.parse_or()?;
    // Trailing tokens mean the input was not a single expression.
    if parser.tokens.peek().is_some() {
        return None;
    }
    Some(parsed)
}

#[derive(Debug, PartialEq, Clone)]
enum Token {
    Id(String),
    And,
    Or,
    With,
    LParen,
    RParen,
}

impl Token {
    fn from_word(word: &str) -> Token {
        match word {
            "(" => Token::LParen,
            ")" => Token::RParen,
            "AND" => Token::And,
            "OR" | "/" => Token::Or,
            "WITH" => Token::With,
            id => Token::Id(id.to_string()),
        }
    }
}

/// Parentheses and `/` are standalone tokens even without surrounding spaces.
fn tokenize(expr: &str) -> Vec<Token> {
    let spaced: String = expr
        .chars()
        .flat_map(|c| match c {
            '(' | ')' | '/' => vec![' ', c, ' '],
            _ => vec![c],
        })
        .collect();
    spaced.split_whitespace().map(Token::from_word).collect()
}

struct ExprParser {
    tokens: Peekable<IntoIter<Token>>,
}

impl ExprParser {
    fn eat(&mut self, expected: &Token) -> bool {
        self.tokens.next_if_eq(expected).is_some()
    }

    fn parse_or(&mut self) -> Option<LicenseExpression> {
        let mut result = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            result = LicenseExpression::Or(Box::new(result), Box::new(rhs));
        }
        Some(result)
    }

    fn parse_and(&mut self) -> Option<LicenseExpression> {
        let mut result = self.parse_atom()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_atom()?;
            result = LicenseExpression::And(Box::new(result), Box::new(rhs));
        }
        Some(result)
    }

    fn parse_atom(&mut self) -> Option<LicenseExpression> {
        match self.tokens.next()? {
            Token::LParen => {
                let inner = self.parse_or()?;
                self.eat(&Token::RParen).then_some(inner)
            }
            Token::Id(id) => {
                let license = lookup_leaf(&id)?;
                if self.eat(&Token::With) {
                    let Some(Token::Id(exception)) = self.tokens.next() else {
                        return None;
                    };
                    if !is_exception_id(&exception) {
                        return None;
                    }
                    return Some(LicenseExpression::With { license, exception });
                }
                Some(LicenseExpression::License(license))
            }
            _ => None,
        }
    }
}

fn lookup_leaf(id: &str) -> Option<KnownLicense> {
    find_license_by_id(id).or_else(|| id.strip_suffix('+').and_then(find_license_by_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(expr: &str) -> Vec<&'static str> {
        parse_license_expression(expr)
            .unwrap()
            .license_ids()
            .into_iter()
            .map(|l| l.id)
            .collect()
    }

    #[test]
    fn test_single_id() {
        assert_eq!(ids("MIT"), vec!["MIT"]);
    }

    #[test]
    fn test_or_expression() {
        assert_eq!(ids("MIT OR Apache-2.0"), vec!["MIT", "Apache-2.0"]);
    }

    #[test]
    fn test_and_precedence_over_or() {
        let parsed = parse_license_expression("MIT OR GPL-3.0-only AND BSD-3-Clause").unwrap();
        match parsed {
            LicenseExpression::Or(lhs, rhs) => {
                assert!(matches!(*lhs, LicenseExpression::License(l) if l.id == "MIT"));
                assert!(matches!(*rhs, LicenseExpression::And(_, _)));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            ids("(Apache-2.0 OR MIT) AND BSD-3-Clause"),
            vec!["Apache-2.0", "MIT", "BSD-3-Clause"]
        );
    }

    #[test]
    fn test_with_exception() {
        let parsed = parse_license_expression("GPL-2.0-only WITH Classpath-exception-2.0").unwrap();
        assert!(matches!(parsed, LicenseExpression::With { ref exception, .. } if exception == "Classpath-exception-2.0"));
        assert_eq!(ids("GPL-2.0-only WITH Classpath-exception-2.0"), vec!["GPL-2.0-only"]);
    }

    #[test]
    fn test_slash_separator() {
        assert_eq!(ids("MIT/Apache-2.0"), vec!["MIT", "Apache-2.0"]);
    }

    #[test]
    fn test_unspaced_parentheses() {
        assert_eq!(ids("(MIT)AND(ISC/0BSD)"), vec!["MIT", "ISC", "0BSD"]);
        assert_eq!(
            tokenize("(MIT)"),
            vec![Token::LParen, Token::Id("MIT".to_string()), Token::RParen]
        );
    }

    #[test]
    fn test_duplicate_leaves_collapse() {
        assert_eq!(ids("MIT OR (MIT AND ISC)"), vec!["MIT", "ISC"]);
    }

    #[test]
    fn test_unknown_leaf_rejects_expression() {
        assert!(parse_license_expression("MIT OR Custom-License").is_none());
        assert!(parse_license_expression("BSD").is_none());
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(parse_license_expression("").is_none());
        assert!(parse_license_expression("MIT OR").is_none());
        assert!(parse_license_expression("(MIT").is_none());
        assert!(parse_license_expression("MIT ISC").is_none());
        assert!(parse_license_expression("MIT WITH Not-An-Exception").is_none());
    }
}
