//! Calculated-expression evaluator.
//!
//! A deliberately small language: literals, column references, `+ - * /`,
//! and parentheses. Expressions are tokenized and parsed into an AST here;
//! nothing is ever handed to a shell or scripting runtime.
//!
//! Semantics:
//! - `+` adds when both operands are numeric and concatenates when either
//!   operand is text; `-`, `*`, `/` require numeric operands.
//! - Any referenced column that is NULL makes the whole expression NULL.
//! - Division by zero yields NULL.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::core::{Row, Value};

/// Binary operators, lowest precedence first in the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Str(String),
    Column(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' => {
                // String literal, '' escapes a quote
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".into()),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '[' => {
                // Bracketed column name, ]] escapes a bracket
                let mut name = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated bracketed identifier".into()),
                        Some(']') if chars.get(i + 1) == Some(&']') => {
                            name.push(']');
                            i += 2;
                        }
                        Some(']') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            name.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Ident(name));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<Decimal>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := number | string | ident | '-' factor | '(' expr ')'
    fn factor(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::Minus) => {
                let inner = self.factor()?;
                Ok(Expr::Binary {
                    op: BinOp::Sub,
                    lhs: Box::new(Expr::Number(Decimal::ZERO)),
                    rhs: Box::new(inner),
                })
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".into()),
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

/// Parse an expression into its AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return Err(format!("trailing input at token {}", parser.pos));
    }
    Ok(expr)
}

/// Column names referenced by an expression, in first-seen order.
///
/// Used by structural validation; a malformed expression contributes the
/// identifiers found before the error.
pub fn referenced_columns(input: &str) -> Vec<String> {
    let mut cols = Vec::new();
    if let Ok(tokens) = tokenize(input) {
        for t in tokens {
            if let Token::Ident(name) = t {
                if !cols.contains(&name) {
                    cols.push(name);
                }
            }
        }
    }
    cols
}

enum EvalVal {
    Null,
    Num(Decimal),
    Text(String),
}

/// Evaluate an expression against a source row.
///
/// Returns `Value::Null` when null propagation applies, `Err` for genuine
/// program errors (unknown column, non-numeric operand to `-`/`*`/`/`).
pub fn evaluate(expr: &Expr, row: &Row) -> Result<Value, String> {
    match eval(expr, row)? {
        EvalVal::Null => Ok(Value::Null),
        EvalVal::Num(d) => {
            let d = d.normalize();
            if d.scale() == 0 {
                if let Some(i) = d.to_i64() {
                    return Ok(Value::Int(i));
                }
            }
            Ok(Value::Decimal(d))
        }
        EvalVal::Text(s) => Ok(Value::Text(s)),
    }
}

fn eval(expr: &Expr, row: &Row) -> Result<EvalVal, String> {
    match expr {
        Expr::Number(n) => Ok(EvalVal::Num(*n)),
        Expr::Str(s) => Ok(EvalVal::Text(s.clone())),
        Expr::Column(name) => {
            let value = row
                .get(name)
                .ok_or_else(|| format!("unknown column '{}'", name))?;
            Ok(match value {
                Value::Null => EvalVal::Null,
                v => match v.as_decimal() {
                    Some(d) => EvalVal::Num(d),
                    None => EvalVal::Text(v.display_text()),
                },
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, row)?;
            let r = eval(rhs, row)?;
            if matches!(l, EvalVal::Null) || matches!(r, EvalVal::Null) {
                return Ok(EvalVal::Null);
            }
            match op {
                BinOp::Add => match (l, r) {
                    (EvalVal::Num(a), EvalVal::Num(b)) => Ok(EvalVal::Num(a + b)),
                    (a, b) => Ok(EvalVal::Text(format!("{}{}", as_text(a), as_text(b)))),
                },
                BinOp::Sub | BinOp::Mul | BinOp::Div => {
                    let (a, b) = match (l, r) {
                        (EvalVal::Num(a), EvalVal::Num(b)) => (a, b),
                        _ => return Err(format!("{:?} requires numeric operands", op)),
                    };
                    Ok(match op {
                        BinOp::Sub => EvalVal::Num(a - b),
                        BinOp::Mul => EvalVal::Num(a * b),
                        BinOp::Div => {
                            if b.is_zero() {
                                EvalVal::Null
                            } else {
                                EvalVal::Num(a / b)
                            }
                        }
                        BinOp::Add => unreachable!(),
                    })
                }
            }
        }
    }
}

fn as_text(v: EvalVal) -> String {
    match v {
        EvalVal::Null => String::new(),
        EvalVal::Num(d) => d.normalize().to_string(),
        EvalVal::Text(s) => s,
    }
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
    fn test_arithmetic_precedence() {
        let e = parse("price * quantity + 5").unwrap();
        let r = row(&[("price", Value::Int(10)), ("quantity", Value::Int(3))]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Int(35));
    }

    #[test]
    fn test_parentheses_and_unary_minus() {
        let e = parse("-(a + b) * 2").unwrap();
        let r = row(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Int(-6));
    }

    #[test]
    fn test_null_column_propagates() {
        let e = parse("price * quantity").unwrap();
        let r = row(&[("price", Value::Int(10)), ("quantity", Value::Null)]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let e = parse("a / b").unwrap();
        let r = row(&[("a", Value::Int(1)), ("b", Value::Int(0))]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_concat_via_plus() {
        let e = parse("first + ' ' + last").unwrap();
        let r = row(&[
            ("first", Value::Text("Ada".into())),
            ("last", Value::Text("Lovelace".into())),
        ]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Text("Ada Lovelace".into()));
    }

    #[test]
    fn test_mixed_concat_coerces_number() {
        let e = parse("'order-' + id").unwrap();
        let r = row(&[("id", Value::Int(42))]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Text("order-42".into()));
    }

    #[test]
    fn test_decimal_result() {
        let e = parse("a / b").unwrap();
        let r = row(&[("a", Value::Int(1)), ("b", Value::Int(4))]);
        assert_eq!(
            evaluate(&e, &r).unwrap(),
            Value::Decimal("0.25".parse().unwrap())
        );
    }

    #[test]
    fn test_bracketed_identifier() {
        let e = parse("[unit price] * 2").unwrap();
        let r = row(&[("unit price", Value::Int(7))]);
        assert_eq!(evaluate(&e, &r).unwrap(), Value::Int(14));
    }

    #[test]
    fn test_unknown_column_is_error() {
        let e = parse("missing + 1").unwrap();
        let r = row(&[]);
        assert!(evaluate(&e, &r).is_err());
    }

    #[test]
    fn test_numeric_text_counts_as_number() {
        let e = parse("amount * 2").unwrap();
        let r = row(&[("amount", Value::Text("12.5".into()))]);
        assert_eq!(
            evaluate(&e, &r).unwrap(),
            Value::Decimal("25".parse().unwrap())
        );
    }

    #[test]
    fn test_referenced_columns() {
        assert_eq!(
            referenced_columns("price * quantity + [tax rate]"),
            vec!["price", "quantity", "tax rate"]
        );
        assert_eq!(referenced_columns("1 + 2"), Vec::<String>::new());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("(a + b").is_err());
        assert!(parse("a ; b").is_err());
        assert!(parse("'unterminated").is_err());
    }

    #[test]
    fn test_subtraction_requires_numbers() {
        let e = parse("name - 1").unwrap();
        let r = row(&[("name", Value::Text("abc".into()))]);
        assert!(evaluate(&e, &r).is_err());
    }
}
