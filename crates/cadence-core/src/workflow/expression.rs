//! Condition expressions.
//!
//! A deliberately small language: dotted references into the `entity` and
//! `context` namespaces, literals, comparisons and boolean connectives.
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) primary )?
//! primary    := literal | reference | "(" expr ")"
//! ```
//!
//! Evaluation happens in three passes: the raw text is checked against a
//! character allow-list, references are replaced by literal tokens taken from
//! the context, and the literal-only token stream is parsed and reduced.
//! Nothing is ever handed to a general-purpose evaluator.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::context::{keys, Context};
use crate::error::{CadenceError, Result};

const MAX_EXPRESSION_LEN: usize = 1024;
const MAX_NESTING: usize = 32;
const ALLOWED_PUNCTUATION: &[char] = &[
    '_', '.', '\'', '"', '<', '>', '=', '!', '&', '|', '(', ')', '-', '@', ':',
];

/// Evaluate `expression` against `context`.
pub fn evaluate(expression: &str, context: &Context) -> Result<bool> {
    let tokens = substitute_tokens(expression, context)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse()?;
    Ok(truthy(&expr.reduce()))
}

/// Fail-closed wrapper around [`evaluate`]: errors are logged and read as `false`.
pub fn is_satisfied(expression: &str, context: &Context) -> bool {
    match evaluate(expression, context) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(expression = %expression, error = %e, "Rejected condition expression");
            false
        }
    }
}

/// Render the expression with every reference replaced by its literal value.
#[cfg(test)]
fn substitute(expression: &str, context: &Context) -> Result<String> {
    let tokens = substitute_tokens(expression, context)?;
    Ok(tokens
        .iter()
        .map(Token::to_string)
        .collect::<Vec<_>>()
        .join(" "))
}

fn substitute_tokens(expression: &str, context: &Context) -> Result<Vec<Token>> {
    check_allowed(expression)?;
    let tokens = tokenize(expression)?;
    Ok(tokens
        .into_iter()
        .map(|token| match token {
            Token::Reference(namespace, path) => Token::Literal(resolve(namespace, &path, context)),
            other => other,
        })
        .collect())
}

fn check_allowed(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(CadenceError::Expression("expression is empty".into()));
    }
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(CadenceError::Expression(format!(
            "expression longer than {} characters",
            MAX_EXPRESSION_LEN
        )));
    }

    match expression.char_indices().find(|(_, c)| {
        !(c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || ALLOWED_PUNCTUATION.contains(c))
    }) {
        Some((pos, c)) => Err(CadenceError::Expression(format!(
            "disallowed character '{}' at position {}",
            c, pos
        ))),
        None => Ok(()),
    }
}

fn resolve(namespace: Namespace, path: &[String], context: &Context) -> Value {
    let found = match namespace {
        Namespace::Entity => context.lookup(keys::ENTITY, path),
        Namespace::Context => context.lookup(&path[0], &path[1..]),
    };
    found.cloned().unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Entity,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => loosely_equal(left, right),
            Self::Ne => !loosely_equal(left, right),
            Self::Lt => matches!(order(left, right), Some(Ordering::Less)),
            Self::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => matches!(order(left, right), Some(Ordering::Greater)),
            Self::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Reference(Namespace, Vec<String>),
    Literal(Value),
    Compare(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Reference(Namespace::Entity, path) => write!(f, "entity.{}", path.join(".")),
            Token::Reference(Namespace::Context, path) => write!(f, "context.{}", path.join(".")),
            Token::Literal(Value::String(s)) if s.contains('\'') => write!(f, "\"{}\"", s),
            Token::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Token::Literal(other) => write!(f, "{}", other),
            Token::Compare(op) => f.write_str(op.symbol()),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        match ch {
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(ch) {
                    return Err(CadenceError::Expression(format!(
                        "expected '{}{}'",
                        ch, ch
                    )));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '=' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(CadenceError::Expression(
                        "assignment is not supported, use '=='".into(),
                    ));
                }
                tokens.push(Token::Compare(CompareOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Compare(CompareOp::Ne));
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' | '>' => {
                chars.next();
                let or_equal = chars.peek() == Some(&'=');
                if or_equal {
                    chars.next();
                }
                let op = match (ch, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Compare(op));
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ch {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(CadenceError::Expression("unterminated string literal".into()));
                }
                tokens.push(Token::Literal(Value::String(value)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut raw = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        raw.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Literal(parse_number(&raw)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(classify_word(&word)?);
            }
            other => {
                return Err(CadenceError::Expression(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

fn parse_number(raw: &str) -> Result<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| CadenceError::Expression(format!("invalid number '{}'", raw)))
}

fn classify_word(word: &str) -> Result<Token> {
    match word {
        "true" => return Ok(Token::Literal(Value::Bool(true))),
        "false" => return Ok(Token::Literal(Value::Bool(false))),
        "null" => return Ok(Token::Literal(Value::Null)),
        _ => {}
    }

    let mut segments = word.split('.');
    let namespace = match segments.next() {
        Some("entity") => Namespace::Entity,
        Some("context") => Namespace::Context,
        _ => {
            return Err(CadenceError::Expression(format!(
                "unknown identifier '{}', references must start with 'entity.' or 'context.'",
                word
            )))
        }
    };

    let path: Vec<String> = segments.map(str::to_string).collect();
    if path.is_empty() || path.iter().any(String::is_empty) {
        return Err(CadenceError::Expression(format!(
            "incomplete reference '{}'",
            word
        )));
    }

    Ok(Token::Reference(namespace, path))
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn reduce(&self) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Not(inner) => Value::Bool(!truthy(&inner.reduce())),
            Expr::And(left, right) => {
                Value::Bool(truthy(&left.reduce()) && truthy(&right.reduce()))
            }
            Expr::Or(left, right) => {
                Value::Bool(truthy(&left.reduce()) || truthy(&right.reduce()))
            }
            Expr::Compare(op, left, right) => Value::Bool(op.apply(&left.reduce(), &right.reduce())),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(CadenceError::Expression(format!(
                "unexpected '{}' after end of expression",
                token
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            self.enter()?;
            let inner = self.parse_unary();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek().cloned() {
            self.next();
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or();
                self.depth -= 1;
                let inner = inner?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(token) => Err(CadenceError::Expression(format!(
                        "expected ')', found '{}'",
                        token
                    ))),
                    None => Err(CadenceError::Expression("missing ')'".into())),
                }
            }
            Some(Token::Reference(..)) => Err(CadenceError::Internal(
                "unresolved reference reached the parser".into(),
            )),
            Some(token) => Err(CadenceError::Expression(format!(
                "expected a value, found '{}'",
                token
            ))),
            None => Err(CadenceError::Expression(
                "unexpected end of expression".into(),
            )),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(CadenceError::Expression(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING
            )));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate() -> Context {
        Context::new()
            .with(keys::ENTITY_ID, 42)
            .with(keys::TO_STAGE, "Offer")
            .with(keys::FROM_STAGE, "Interview")
            .with("score", 87)
            .with(
                keys::ENTITY,
                json!({
                    "name": "Ada",
                    "status": "active",
                    "yearsExperience": 6,
                    "email": "ada@example.com",
                    "address": {"city": "Leeds"},
                    "archived": false
                }),
            )
    }

    #[test]
    fn test_simple_comparisons() {
        let ctx = candidate();
        assert!(evaluate("entity.yearsExperience > 5", &ctx).unwrap());
        assert!(evaluate("entity.yearsExperience >= 6", &ctx).unwrap());
        assert!(!evaluate("entity.yearsExperience < 6", &ctx).unwrap());
        assert!(evaluate("entity.status == 'active'", &ctx).unwrap());
        assert!(evaluate("entity.status != \"archived\"", &ctx).unwrap());
        assert!(evaluate("context.toStage == 'Offer'", &ctx).unwrap());
        assert!(evaluate("context.score <= 87.0", &ctx).unwrap());
    }

    #[test]
    fn test_boolean_connectives_and_precedence() {
        let ctx = candidate();
        assert!(evaluate("entity.status == 'active' && context.score > 80", &ctx).unwrap());
        assert!(evaluate("entity.status == 'inactive' || context.score > 80", &ctx).unwrap());
        // && binds tighter than ||
        assert!(evaluate("true || false && false", &ctx).unwrap());
        assert!(!evaluate("(true || false) && false", &ctx).unwrap());
        assert!(evaluate("!(entity.status == 'inactive')", &ctx).unwrap());
        assert!(evaluate("!entity.archived", &ctx).unwrap());
        assert!(evaluate("!!entity.name", &ctx).unwrap());
    }

    #[test]
    fn test_nested_references_and_missing_fields() {
        let ctx = candidate();
        assert!(evaluate("entity.address.city == 'Leeds'", &ctx).unwrap());
        assert!(evaluate("entity.phone == null", &ctx).unwrap());
        assert!(!evaluate("entity.phone", &ctx).unwrap());
        assert!(!evaluate("context.missing.deeper > 1", &ctx).unwrap());
    }

    #[test]
    fn test_mixed_type_ordering_is_false() {
        let ctx = candidate();
        assert!(!evaluate("entity.name > 3", &ctx).unwrap());
        assert!(!evaluate("entity.name < 3", &ctx).unwrap());
        assert!(!evaluate("entity.name == 3", &ctx).unwrap());
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        let ctx = candidate();
        assert!(evaluate("context.entityId == 42.0", &ctx).unwrap());
        assert!(evaluate("-1 < 0", &ctx).unwrap());
    }

    #[test]
    fn test_literal_values_allowed_punctuation() {
        let ctx = candidate();
        assert!(evaluate("entity.email == 'ada@example.com'", &ctx).unwrap());
        assert!(evaluate("'10:30' < '11:00'", &ctx).unwrap());
    }

    #[test]
    fn test_substitution_quotes_strings() {
        let ctx = candidate();
        let rendered = substitute("entity.status == 'active' && context.score > 80", &ctx).unwrap();
        assert_eq!(rendered, "'active' == 'active' && 87 > 80");

        let rendered = substitute("entity.phone == null", &ctx).unwrap();
        assert_eq!(rendered, "null == null");
    }

    #[test]
    fn test_rejects_disallowed_characters() {
        let ctx = candidate();
        for expr in [
            "entity.status == 'x'; process.exit(1)",
            "entity.name == `whoami`",
            "context.score > 1 + 1",
            "entity.constructor['prototype']",
            "${env.SECRET} == 1",
            "entity.status == 'a' /* comment */",
        ] {
            let err = evaluate(expr, &ctx).unwrap_err();
            assert!(
                matches!(err, CadenceError::Expression(ref m) if m.contains("disallowed character")),
                "expected rejection for {}: {:?}",
                expr,
                err
            );
            assert!(!is_satisfied(expr, &ctx));
        }
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        let ctx = candidate();
        assert!(evaluate("process.exit == 1", &ctx).is_err());
        assert!(evaluate("require == null", &ctx).is_err());
        assert!(evaluate("entity. == 1", &ctx).is_err());
        assert!(evaluate("entity == 1", &ctx).is_err());
    }

    #[test]
    fn test_syntax_errors() {
        let ctx = candidate();
        for expr in [
            "",
            "   ",
            "entity.status = 'active'",
            "entity.status == 'active",
            "(entity.score > 1",
            "entity.score > 1)",
            "entity.score >",
            "&& true",
            "true & false",
            "true | false",
            "1 2",
            "1.2.3 > 1",
        ] {
            assert!(evaluate(expr, &ctx).is_err(), "expected error for {:?}", expr);
        }
    }

    #[test]
    fn test_nesting_limit() {
        let ctx = candidate();
        let deep = format!("{}true{}", "(".repeat(40), ")".repeat(40));
        assert!(evaluate(&deep, &ctx).is_err());

        let shallow = format!("{}true{}", "(".repeat(5), ")".repeat(5));
        assert!(evaluate(&shallow, &ctx).unwrap());
    }

    #[test]
    fn test_length_limit() {
        let ctx = candidate();
        let long = format!("'{}' == 'a'", "a".repeat(MAX_EXPRESSION_LEN));
        assert!(evaluate(&long, &ctx).is_err());
    }

    #[test]
    fn test_is_satisfied_fails_closed() {
        let ctx = candidate();
        assert!(is_satisfied("entity.status == 'active'", &ctx));
        assert!(!is_satisfied("entity.status == ", &ctx));
    }
}
