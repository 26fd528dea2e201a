//! Conditional predicates.
//!
//! Grammar: `col op lit` for op in {=, !=, <>, <, >, <=, >=, LIKE},
//! `col IS NULL`, `col IS NOT NULL`. Comparisons are numeric when both
//! sides are numeric, lexicographic otherwise. A NULL column matches only
//! the IS NULL form.

use std::cell::RefCell;
use std::collections::HashMap;

use regex::Regex;

use crate::core::{Row, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// A parsed predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IsNull(String),
    IsNotNull(String),
    Compare {
        column: String,
        op: CompareOp,
        literal: String,
    },
    Like {
        column: String,
        pattern: String,
    },
}

/// Parse a predicate string.
pub fn parse(input: &str) -> Result<Predicate, String> {
    let input = input.trim();
    let (column, rest) = parse_column(input)?;
    let rest = rest.trim_start();

    let upper = rest.to_uppercase();
    if upper == "IS NULL" {
        return Ok(Predicate::IsNull(column));
    }
    if upper == "IS NOT NULL" {
        return Ok(Predicate::IsNotNull(column));
    }
    if let Some(pattern_part) = strip_keyword(rest, "LIKE") {
        let pattern = parse_literal(pattern_part.trim())?;
        return Ok(Predicate::Like { column, pattern });
    }

    // Longest operators first so `<=` never parses as `<` + garbage
    const OPS: &[(&str, CompareOp)] = &[
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<>", CompareOp::Ne),
        ("!=", CompareOp::Ne),
        ("≤", CompareOp::Le),
        ("≥", CompareOp::Ge),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];
    for (symbol, op) in OPS {
        if let Some(lit_part) = rest.strip_prefix(symbol) {
            let literal = parse_literal(lit_part.trim())?;
            return Ok(Predicate::Compare {
                column,
                op: *op,
                literal,
            });
        }
    }

    Err(format!("cannot parse predicate '{}'", input))
}

/// The column a predicate tests, if it parses.
pub fn predicate_column(input: &str) -> Option<String> {
    parse(input).ok().map(|p| match p {
        Predicate::IsNull(c) | Predicate::IsNotNull(c) => c,
        Predicate::Compare { column, .. } | Predicate::Like { column, .. } => column,
    })
}

/// Evaluate a predicate against a row.
pub fn evaluate(pred: &Predicate, row: &Row) -> Result<bool, String> {
    match pred {
        Predicate::IsNull(col) => Ok(lookup(row, col)?.is_null()),
        Predicate::IsNotNull(col) => Ok(!lookup(row, col)?.is_null()),
        Predicate::Compare { column, op, literal } => {
            let value = lookup(row, column)?;
            if value.is_null() {
                return Ok(false);
            }
            // Numeric when both sides are numeric, else lexicographic
            let ordering = match (value.as_decimal(), literal.trim().parse::<rust_decimal::Decimal>())
            {
                (Some(lhs), Ok(rhs)) => lhs.cmp(&rhs),
                _ => value.display_text().cmp(literal),
            };
            Ok(match op {
                CompareOp::Eq => ordering.is_eq(),
                CompareOp::Ne => ordering.is_ne(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Ge => ordering.is_ge(),
            })
        }
        Predicate::Like { column, pattern } => {
            let value = lookup(row, column)?;
            if value.is_null() {
                return Ok(false);
            }
            Ok(like_matches(&value.display_text(), pattern))
        }
    }
}

fn lookup<'a>(row: &'a Row, column: &str) -> Result<&'a Value, String> {
    row.get(column)
        .ok_or_else(|| format!("unknown column '{}'", column))
}

fn parse_column(input: &str) -> Result<(String, &str), String> {
    if let Some(rest) = input.strip_prefix('[') {
        // Bracketed name, ]] escapes
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == ']' {
                if matches!(chars.peek(), Some((_, ']'))) {
                    name.push(']');
                    chars.next();
                } else {
                    return Ok((name, &rest[i + 1..]));
                }
            } else {
                name.push(c);
            }
        }
        Err("unterminated bracketed column".into())
    } else {
        let end = input
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(input.len());
        if end == 0 {
            return Err(format!("predicate must start with a column name: '{}'", input));
        }
        Ok((input[..end].to_string(), &input[end..]))
    }
}

fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = input.get(..keyword.len())?;
    if prefix.eq_ignore_ascii_case(keyword) {
        let rest = &input[keyword.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(rest);
        }
    }
    None
}

fn parse_literal(input: &str) -> Result<String, String> {
    if let Some(rest) = input.strip_prefix('\'') {
        let mut out = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    out.push('\'');
                    chars.next();
                } else {
                    let trailing = rest[i + 1..].trim();
                    if !trailing.is_empty() {
                        return Err(format!("trailing input after literal: '{}'", trailing));
                    }
                    return Ok(out);
                }
            } else {
                out.push(c);
            }
        }
        Err("unterminated string literal".into())
    } else if input.is_empty() {
        Err("missing comparison literal".into())
    } else {
        Ok(input.to_string())
    }
}

/// SQL LIKE matching: `%` is any sequence, `_` any single character.
///
/// Translated to an anchored regex with every other metacharacter escaped,
/// then cached — programs reuse a handful of patterns across many rows.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    thread_local! {
        static CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
    }

    CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let regex = cache
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(&like_to_regex(pattern)).expect("escaped pattern"));
        regex.is_match(text)
    })
}

/// Convert a LIKE pattern to an anchored regex.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c if ".*+?^${}()|[]\\".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse("Status IS NULL").unwrap(), Predicate::IsNull("Status".into()));
        assert_eq!(
            parse("Status is not null").unwrap(),
            Predicate::IsNotNull("Status".into())
        );
        assert_eq!(
            parse("Age >= 21").unwrap(),
            Predicate::Compare {
                column: "Age".into(),
                op: CompareOp::Ge,
                literal: "21".into()
            }
        );
        assert_eq!(
            parse("Name LIKE 'A%'").unwrap(),
            Predicate::Like {
                column: "Name".into(),
                pattern: "A%".into()
            }
        );
        assert_eq!(
            parse("[unit price] <> 3").unwrap(),
            Predicate::Compare {
                column: "unit price".into(),
                op: CompareOp::Ne,
                literal: "3".into()
            }
        );
    }

    #[test]
    fn test_unicode_comparison_ops() {
        assert_eq!(
            parse("Age ≤ 10").unwrap(),
            Predicate::Compare {
                column: "Age".into(),
                op: CompareOp::Le,
                literal: "10".into()
            }
        );
    }

    #[test]
    fn test_numeric_vs_lexicographic() {
        let r = row(&[("n", Value::Int(9)), ("s", Value::Text("9".into()))]);
        // Both numeric: 9 < 10
        let p = parse("n < 10").unwrap();
        assert!(evaluate(&p, &r).unwrap());
        // Text that parses as a number still compares numerically
        let p = parse("s < 10").unwrap();
        assert!(evaluate(&p, &r).unwrap());
        // Non-numeric literal forces lexicographic: "9" < "abc"
        let p = parse("s < abc").unwrap();
        assert!(evaluate(&p, &r).unwrap());
    }

    #[test]
    fn test_null_column_never_compares() {
        let r = row(&[("x", Value::Null)]);
        assert!(!evaluate(&parse("x = 1").unwrap(), &r).unwrap());
        assert!(!evaluate(&parse("x LIKE '%'").unwrap(), &r).unwrap());
        assert!(evaluate(&parse("x IS NULL").unwrap(), &r).unwrap());
        assert!(!evaluate(&parse("x IS NOT NULL").unwrap(), &r).unwrap());
    }

    #[test]
    fn test_quoted_literal_with_spaces() {
        let r = row(&[("City", Value::Text("New York".into()))]);
        assert!(evaluate(&parse("City = 'New York'").unwrap(), &r).unwrap());
        assert!(evaluate(&parse("City <> 'Boston'").unwrap(), &r).unwrap());
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like_matches("Baker Street", "B%"));
        assert!(like_matches("Baker Street", "%Street"));
        assert!(like_matches("Baker Street", "B_ker%"));
        assert!(!like_matches("Baker Street", "b%")); // case-sensitive
        assert!(!like_matches("Baker Street", "B_er%"));
        assert!(!like_matches("100% done", "100\\%%")); // backslash is literal
        assert!(like_matches("a.b", "a.b"));
        assert!(!like_matches("axb", "a.b")); // dot is literal, not regex
    }

    #[test]
    fn test_like_regex_translation() {
        assert_eq!(like_to_regex("A%"), "^A.*$");
        assert_eq!(like_to_regex("_b"), "^.b$");
        assert_eq!(like_to_regex("a.c"), "^a\\.c$");
    }

    #[test]
    fn test_like_matches_iff_translated_regex_matches() {
        let cases = [
            ("US", "U%"),
            ("US", "%S"),
            ("US", "__"),
            ("Canada", "C_n%"),
            ("Canada", "%d_"),
            ("a+b", "a+b"),
        ];
        for (text, pattern) in cases {
            let expected = Regex::new(&like_to_regex(pattern)).unwrap().is_match(text);
            assert_eq!(like_matches(text, pattern), expected, "{} LIKE {}", text, pattern);
        }
    }

    #[test]
    fn test_unknown_column_is_error() {
        let r = row(&[]);
        assert!(evaluate(&parse("ghost = 1").unwrap(), &r).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("= 1").is_err());
        assert!(parse("col ~ 1").is_err());
        assert!(parse("col = 'unterminated").is_err());
    }
}
