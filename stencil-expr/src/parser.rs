use std::sync::LazyLock;

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use serde_json::Value;

use crate::ast::{
    AssignOp, BinaryOp, Expr, ForClause, ForKind, Interpolated, Program, Segment, Stmt, UnaryOp,
};
use crate::value::number;

#[derive(pest_derive::Parser)]
#[grammar = "expr.pest"]
struct ExprParser;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[error("cannot parse `{input}`: {message}")]
pub struct ParseError {
    pub input: String,
    pub message: String,
}

impl ParseError {
    fn new(source: &str, message: impl Into<String>) -> Self {
        Self {
            input: source.to_string(),
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::strict_eq, Assoc::Left)
            | Op::infix(Rule::strict_ne, Assoc::Left)
            | Op::infix(Rule::eq, Assoc::Left)
            | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg))
        .op(Op::postfix(Rule::member) | Op::postfix(Rule::index) | Op::postfix(Rule::call))
});

/// Parse a single expression, e.g. a conditional guard or attribute hole.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let top = parse_rule(Rule::standalone, src)?;
    let expr = first_inner(top, src)?;
    build_expression(expr, src)
}

/// Parse a `;`-separated statement list.
pub fn parse_program(src: &str) -> Result<Program> {
    let top = parse_rule(Rule::program, src)?;
    let mut stmts = Vec::new();
    for pair in top.into_inner() {
        match pair.as_rule() {
            Rule::declaration => {
                let mut inner = pair.into_inner();
                // let_kw is atomic and produces its own pair
                let _kw = inner.next();
                let name = next_str(&mut inner, src)?;
                let value = build_expression(next_pair(&mut inner, src)?, src)?;
                stmts.push(Stmt::Let(name, value));
            }
            Rule::expression => stmts.push(Stmt::Expr(build_expression(pair, src)?)),
            _ => {}
        }
    }
    Ok(Program { stmts })
}

/// Parse an iteration clause: `item of items`, `(item, i) of items`, `key in obj`.
pub fn parse_for_clause(src: &str) -> Result<ForClause> {
    let top = parse_rule(Rule::for_clause, src)?;
    let mut item = None;
    let mut index = None;
    let mut kind = None;
    let mut iterable = None;
    for pair in top.into_inner() {
        match pair.as_rule() {
            Rule::binding => {
                let mut names = pair.into_inner().map(|p| p.as_str().to_string());
                item = names.next();
                index = names.next();
            }
            Rule::of_kw => kind = Some(ForKind::Of),
            Rule::in_kw => kind = Some(ForKind::In),
            Rule::expression => iterable = Some(build_expression(pair, src)?),
            _ => {}
        }
    }
    match (item, kind, iterable) {
        (Some(item), Some(kind), Some(iterable)) => Ok(ForClause {
            item,
            index,
            kind,
            iterable,
        }),
        _ => Err(ParseError::new(src, "incomplete iteration clause")),
    }
}

/// Split text into literal runs and `${expr}` / `{{expr}}` holes.
///
/// `\${` is kept as literal text.
pub fn parse_interpolated(src: &str) -> Result<Interpolated> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let bytes = src.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'\\' && src[i + 1..].starts_with("${") {
            text.push_str("${");
            i += 3;
            continue;
        }
        let (open, close) = if src[i..].starts_with("${") {
            (2, HoleEnd::Brace)
        } else if src[i..].starts_with("{{") {
            (2, HoleEnd::DoubleBrace)
        } else {
            let ch = src[i..].chars().next().unwrap_or_default();
            text.push(ch);
            i += ch.len_utf8().max(1);
            continue;
        };

        let start = i + open;
        let end = find_hole_end(src, start, close)
            .ok_or_else(|| ParseError::new(src, format!("unterminated expression at byte {i}")))?;
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }
        let inner = src[start..end].trim();
        if inner.is_empty() {
            return Err(ParseError::new(src, format!("empty expression at byte {i}")));
        }
        segments.push(Segment::Expr(parse_expression(inner)?));
        i = end + close.len();
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(Interpolated { segments })
}

#[derive(Clone, Copy)]
enum HoleEnd {
    Brace,
    DoubleBrace,
}

impl HoleEnd {
    fn len(self) -> usize {
        match self {
            HoleEnd::Brace => 1,
            HoleEnd::DoubleBrace => 2,
        }
    }
}

/// Byte offset of the closing delimiter, skipping nested braces and quoted strings.
fn find_hole_end(src: &str, start: usize, close: HoleEnd) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b'}' => match close {
                HoleEnd::Brace => return Some(i),
                HoleEnd::DoubleBrace if bytes.get(i + 1) == Some(&b'}') => return Some(i),
                HoleEnd::DoubleBrace => {}
            },
            _ => {}
        }
        i += 1;
    }
    None
}

fn parse_rule(rule: Rule, src: &str) -> Result<Pair<'_, Rule>> {
    let mut pairs =
        ExprParser::parse(rule, src).map_err(|e| ParseError::new(src, e.to_string()))?;
    pairs
        .next()
        .ok_or_else(|| ParseError::new(src, "empty input"))
}

fn first_inner<'i>(pair: Pair<'i, Rule>, src: &str) -> Result<Pair<'i, Rule>> {
    pair.into_inner()
        .next()
        .ok_or_else(|| ParseError::new(src, "missing expression"))
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, src: &str) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::new(src, "unexpected end of input"))
}

fn next_str(pairs: &mut Pairs<'_, Rule>, src: &str) -> Result<String> {
    Ok(next_pair(pairs, src)?.as_str().to_string())
}

fn build_expression(pair: Pair<'_, Rule>, src: &str) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expression => build_expression(first_inner(pair, src)?, src),
        Rule::assignment => {
            let mut inner = pair.into_inner();
            let target = build_expression(next_pair(&mut inner, src)?, src)?;
            let Some(op) = inner.next() else {
                return Ok(target);
            };
            if !target.is_assignable() {
                return Err(ParseError::new(src, "invalid assignment target"));
            }
            let op = match op.as_str() {
                "+=" => AssignOp::Add,
                "-=" => AssignOp::Sub,
                "*=" => AssignOp::Mul,
                "/=" => AssignOp::Div,
                _ => AssignOp::Set,
            };
            let value = build_expression(next_pair(&mut inner, src)?, src)?;
            Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
        }
        Rule::conditional => {
            let mut inner = pair.into_inner();
            let test = build_expression(next_pair(&mut inner, src)?, src)?;
            let Some(then) = inner.next() else {
                return Ok(test);
            };
            let then = build_expression(then, src)?;
            let otherwise = build_expression(next_pair(&mut inner, src)?, src)?;
            Ok(Expr::Conditional(
                Box::new(test),
                Box::new(then),
                Box::new(otherwise),
            ))
        }
        Rule::binary => build_binary(pair.into_inner(), src),
        _ => build_primary(pair, src),
    }
}

fn build_binary(pairs: Pairs<'_, Rule>, src: &str) -> Result<Expr> {
    PRATT
        .map_primary(|p| build_primary(p, src))
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                _ => UnaryOp::Neg,
            };
            Ok(Expr::Unary(op, Box::new(rhs?)))
        })
        .map_postfix(|lhs, op| {
            let lhs = Box::new(lhs?);
            match op.as_rule() {
                Rule::member => {
                    let key = first_inner(op, src)?.as_str().to_string();
                    Ok(Expr::Member(lhs, key))
                }
                Rule::index => {
                    let idx = build_expression(first_inner(op, src)?, src)?;
                    Ok(Expr::Index(lhs, Box::new(idx)))
                }
                _ => {
                    let args = op
                        .into_inner()
                        .map(|a| build_expression(a, src))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Expr::Call(lhs, args))
                }
            }
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::strict_eq => BinaryOp::StrictEq,
                Rule::strict_ne => BinaryOp::StrictNe,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}

fn build_primary(pair: Pair<'_, Rule>, src: &str) -> Result<Expr> {
    match pair.as_rule() {
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(|n| Expr::Literal(number(n)))
            .map_err(|e| ParseError::new(src, format!("bad number literal: {e}"))),
        Rule::string => {
            let raw = first_inner(pair, src)?.as_str();
            Ok(Expr::Literal(Value::String(unescape(raw))))
        }
        Rule::true_lit => Ok(Expr::Literal(Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(Value::Bool(false))),
        Rule::null_lit => Ok(Expr::Literal(Value::Null)),
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::group => build_expression(first_inner(pair, src)?, src),
        Rule::array => pair
            .into_inner()
            .map(|p| build_expression(p, src))
            .collect::<Result<Vec<_>>>()
            .map(Expr::Array),
        Rule::object => {
            let mut fields = Vec::new();
            for entry in pair.into_inner() {
                let mut inner = entry.into_inner();
                let key = next_pair(&mut inner, src)?;
                let key = match key.as_rule() {
                    Rule::string => unescape(first_inner(key, src)?.as_str()),
                    _ => key.as_str().to_string(),
                };
                let value = build_expression(next_pair(&mut inner, src)?, src)?;
                fields.push((key, value));
            }
            Ok(Expr::Object(fields))
        }
        other => build_expression_fallback(other, pair, src),
    }
}

fn build_expression_fallback(rule: Rule, pair: Pair<'_, Rule>, src: &str) -> Result<Expr> {
    match rule {
        Rule::expression | Rule::assignment | Rule::conditional | Rule::binary => {
            build_expression(pair, src)
        }
        _ => Err(ParseError::new(src, format!("unexpected {rule:?}"))),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
