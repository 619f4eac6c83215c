//! Environment markers (PEP 508): parsing, evaluation and the any-extra
//! applicability rule.
//!
//! Evaluation is pure. Unknown variables evaluate to the empty string and an
//! unbound `extra` compares unequal to everything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pynix_util::errors::{PynixError, PynixResult};

use crate::requirement::{normalize_name, Requirement};
use crate::target::System;
use crate::version::{Operator, PythonVersion, Specifier, Version};

/// Comparison operator inside a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Version(Operator),
    In,
    NotIn,
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerOp::Version(op) => write!(f, "{op}"),
            MarkerOp::In => f.write_str("in"),
            MarkerOp::NotIn => f.write_str("not in"),
        }
    }
}

/// One side of a marker comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Variable(name) => f.write_str(name),
            MarkerValue::Literal(s) if s.contains('"') => write!(f, "'{s}'"),
            MarkerValue::Literal(s) => write!(f, "\"{s}\""),
        }
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Compare {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
    And(Box<Marker>, Box<Marker>),
    Or(Box<Marker>, Box<Marker>),
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Compare { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Marker::And(a, b) => {
                for (i, side) in [a, b].into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    match side.as_ref() {
                        Marker::Or(..) => write!(f, "({side})")?,
                        _ => write!(f, "{side}")?,
                    }
                }
                Ok(())
            }
            Marker::Or(a, b) => write!(f, "{a} or {b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Str(String),
    Ident(String),
    Op(Operator),
}

fn parse_error(input: &str, reason: impl Into<String>) -> PynixError {
    PynixError::Parse {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> PynixResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        let Some(c) = rest.chars().next() else {
            break;
        };
        match c {
            '(' => {
                tokens.push(Token::LParen);
                rest = &rest[1..];
            }
            ')' => {
                tokens.push(Token::RParen);
                rest = &rest[1..];
            }
            '\'' | '"' => {
                let body = &rest[1..];
                let end = body
                    .find(c)
                    .ok_or_else(|| parse_error(input, "unterminated string in marker"))?;
                tokens.push(Token::Str(body[..end].to_string()));
                rest = &body[end + 1..];
            }
            '=' | '!' | '<' | '>' | '~' => {
                if rest.starts_with('=') && !rest.starts_with("==") {
                    return Err(parse_error(input, "single `=` in marker"));
                }
                let (op, after) = Operator::split_prefix(rest)
                    .ok_or_else(|| parse_error(input, "invalid operator in marker"))?;
                tokens.push(Token::Op(op));
                rest = after;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = rest
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(rest[..end].to_string()));
                rest = &rest[end..];
            }
            other => {
                return Err(parse_error(
                    input,
                    format!("unexpected character `{other}` in marker"),
                ))
            }
        }
    }
    Ok(tokens)
}

/// Canonical name of a marker variable, accepting legacy dotted aliases.
fn canonical_variable(name: &str) -> String {
    match name {
        "sys.platform" => "sys_platform",
        "os.name" => "os_name",
        "platform.version" => "platform_version",
        "platform.machine" => "platform_machine",
        "platform.python_implementation" | "python_implementation" => {
            "platform_python_implementation"
        }
        other => other,
    }
    .to_string()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn or_expr(&mut self) -> PynixResult<Marker> {
        let mut left = self.and_expr()?;
        while self.keyword("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Marker::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PynixResult<Marker> {
        let mut left = self.atom()?;
        while self.keyword("and") {
            self.pos += 1;
            let right = self.atom()?;
            left = Marker::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn atom(&mut self) -> PynixResult<Marker> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            if self.next() != Some(Token::RParen) {
                return Err(parse_error(self.input, "missing `)` in marker"));
            }
            return Ok(inner);
        }
        let lhs = self.value()?;
        let op = match self.next() {
            Some(Token::Op(op)) => MarkerOp::Version(op),
            Some(Token::Ident(w)) if w == "in" => MarkerOp::In,
            Some(Token::Ident(w)) if w == "not" => match self.next() {
                Some(Token::Ident(w)) if w == "in" => MarkerOp::NotIn,
                _ => return Err(parse_error(self.input, "expected `in` after `not`")),
            },
            _ => return Err(parse_error(self.input, "expected a comparison operator")),
        };
        let rhs = self.value()?;
        Ok(Marker::Compare { lhs, op, rhs })
    }

    fn value(&mut self) -> PynixResult<MarkerValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(MarkerValue::Literal(s)),
            Some(Token::Ident(name)) if !matches!(name.as_str(), "and" | "or" | "in" | "not") => {
                Ok(MarkerValue::Variable(canonical_variable(&name)))
            }
            _ => Err(parse_error(self.input, "expected a variable or a quoted string")),
        }
    }
}

impl Marker {
    /// Parse marker text such as `python_version < "3.8" and extra == 'test'`.
    pub fn parse(input: &str) -> PynixResult<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(parse_error(input, "empty marker"));
        }
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let marker = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(input, "trailing tokens in marker"));
        }
        Ok(marker)
    }

    /// The extra named by a marker of the exact shape `extra == 'X'`.
    pub fn sole_extra(&self) -> Option<&str> {
        match self {
            Marker::Compare {
                lhs: MarkerValue::Variable(var),
                op: MarkerOp::Version(Operator::Equal),
                rhs: MarkerValue::Literal(extra),
            }
            | Marker::Compare {
                lhs: MarkerValue::Literal(extra),
                op: MarkerOp::Version(Operator::Equal),
                rhs: MarkerValue::Variable(var),
            } if var == "extra" => Some(extra),
            _ => None,
        }
    }

    /// Evaluate against a context.
    pub fn evaluate(&self, ctx: &MarkerContext) -> bool {
        match self {
            Marker::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Marker::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
            Marker::Compare { lhs, op, rhs } => compare(lhs, *op, rhs, ctx),
        }
    }
}

fn is_extra(value: &MarkerValue) -> bool {
    matches!(value, MarkerValue::Variable(v) if v == "extra")
}

fn compare(lhs: &MarkerValue, op: MarkerOp, rhs: &MarkerValue, ctx: &MarkerContext) -> bool {
    let involves_extra = is_extra(lhs) || is_extra(rhs);
    let (Some(left), Some(right)) = (ctx.resolve(lhs), ctx.resolve(rhs)) else {
        // unbound `extra`
        return op == MarkerOp::Version(Operator::NotEqual) || op == MarkerOp::NotIn;
    };
    let (left, right) = if involves_extra {
        (normalize_name(&left), normalize_name(&right))
    } else {
        (left, right)
    };

    match op {
        MarkerOp::In => right.contains(left.as_str()),
        MarkerOp::NotIn => !right.contains(left.as_str()),
        MarkerOp::Version(op) => {
            let lv = Version::parse(&left);
            let rv = Version::parse(right.trim_end_matches(".*"));
            if !involves_extra && !lv.is_legacy() && !rv.is_legacy() {
                return Specifier::new(op, right).matches(&lv);
            }
            match op {
                Operator::Equal | Operator::Arbitrary => left == right,
                Operator::NotEqual => left != right,
                Operator::Less => left < right,
                Operator::LessEqual => left <= right,
                Operator::Greater => left > right,
                Operator::GreaterEqual => left >= right,
                Operator::Compatible => false,
            }
        }
    }
}

/// Values of the marker variables for one target environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerContext {
    values: BTreeMap<&'static str, String>,
    extra: Option<String>,
}

impl MarkerContext {
    /// Deterministic context for a runtime version on `arch`/`system`.
    ///
    /// Kernel version and release are blanked so results never depend on the
    /// machine running the resolver.
    pub fn new(python: &PythonVersion, arch: &str, system: System) -> Self {
        let mut values = BTreeMap::new();
        values.insert("os_name", "posix".to_string());
        values.insert("sys_platform", system.sys_platform().to_string());
        values.insert("platform_system", system.capitalized().to_string());
        values.insert("platform_machine", arch.to_string());
        values.insert("platform_release", String::new());
        values.insert("platform_version", String::new());
        values.insert("platform_python_implementation", "CPython".to_string());
        values.insert("implementation_name", "cpython".to_string());
        values.insert("implementation_version", python.python_full_version());
        values.insert("python_version", python.python_version());
        values.insert("python_full_version", python.python_full_version());
        Self {
            values,
            extra: None,
        }
    }

    /// A copy of this context with `extra` bound.
    pub fn with_extra(&self, extra: &str) -> Self {
        Self {
            values: self.values.clone(),
            extra: Some(extra.to_string()),
        }
    }

    /// Value of a variable; unknown variables are the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    fn resolve(&self, value: &MarkerValue) -> Option<String> {
        match value {
            MarkerValue::Literal(s) => Some(s.clone()),
            MarkerValue::Variable(v) if v == "extra" => self.extra.clone(),
            MarkerValue::Variable(v) => Some(self.get(v).to_string()),
        }
    }
}

/// Whether `requirement` applies in `ctx` when `extras` are selected.
///
/// Without a marker it always applies. With selected extras the marker is
/// evaluated once per extra and any success counts; otherwise it is
/// evaluated against the bare context.
pub fn applies(requirement: &Requirement, ctx: &MarkerContext, extras: &BTreeSet<String>) -> bool {
    let Some(marker) = &requirement.marker else {
        return true;
    };
    if extras.is_empty() {
        marker.evaluate(ctx)
    } else {
        extras
            .iter()
            .any(|extra| marker.evaluate(&ctx.with_extra(extra)))
    }
}

/// Keep the requirements that apply in `ctx` for `extras`.
pub fn filter_applicable<'a>(
    requirements: impl IntoIterator<Item = &'a Requirement>,
    ctx: &MarkerContext,
    extras: &BTreeSet<String>,
) -> Vec<Requirement> {
    requirements
        .into_iter()
        .filter(|r| applies(r, ctx, extras))
        .cloned()
        .collect()
}
