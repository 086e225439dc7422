#![forbid(unsafe_code)]

//! The binding expression language.
//!
//! Bound attributes carry small, side-effect-free expressions over live
//! page state: literals, member access, indexing, arithmetic, comparisons,
//! boolean logic, and the ternary operator. There are no calls, no
//! assignments, and no statements, so an expression can never mutate the
//! state it reads.
//!
//! The parser is a hand-written tokenizer plus recursive descent with one
//! function per precedence level. Errors carry the byte offset they were
//! detected at.

use std::collections::BTreeSet;
use std::fmt;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Str(String),
    /// A scope name, the root of every data reference.
    Ident(String),
    /// `object.property`.
    Member {
        /// Expression producing the object.
        object: Box<Expr>,
        /// Property name.
        property: String,
    },
    /// `object[index]`.
    Index {
        /// Expression producing the object.
        object: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// `!operand` / `-operand`.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `condition ? consequent : alternate`.
    Ternary {
        /// Condition.
        condition: Box<Expr>,
        /// Value when truthy.
        consequent: Box<Expr>,
        /// Value when falsy.
        alternate: Box<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Numeric negation.
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl Expr {
    /// All scope names the expression reads.
    pub fn deps(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_deps(&mut out);
        out
    }

    fn collect_deps(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Null | Expr::Bool(_) | Expr::Number(_) | Expr::Str(_) => {}
            Expr::Ident(name) => {
                out.insert(name.clone());
            }
            Expr::Member { object, .. } => object.collect_deps(out),
            Expr::Index { object, index } => {
                object.collect_deps(out);
                index.collect_deps(out);
            }
            Expr::Unary { operand, .. } => operand.collect_deps(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_deps(out);
                rhs.collect_deps(out);
            }
            Expr::Ternary {
                condition,
                consequent,
                alternate,
            } => {
                condition.collect_deps(out);
                consequent.collect_deps(out);
                alternate.collect_deps(out);
            }
        }
    }
}

/// Parse failure with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into the source.
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at offset {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

// ── Tokenizer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Question,
    Colon,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
            }
            b'0'..=b'9' => {
                let mut end = i + 1;
                while end < bytes.len()
                    && (bytes[end].is_ascii_digit()
                        || bytes[end] == b'.'
                        || bytes[end] == b'e'
                        || bytes[end] == b'E'
                        || ((bytes[end] == b'+' || bytes[end] == b'-')
                            && matches!(bytes[end - 1], b'e' | b'E')))
                {
                    end += 1;
                }
                let text = &src[i..end];
                let value: f64 = text
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid number {text:?}"), start))?;
                tokens.push((Token::Number(value), start));
                i = end;
            }
            b'"' | b'\'' => {
                let quote = b;
                let mut value = String::new();
                i += 1;
                loop {
                    if i >= bytes.len() {
                        return Err(ParseError::new("unterminated string literal", start));
                    }
                    let c = bytes[i];
                    if c == quote {
                        i += 1;
                        break;
                    }
                    if c == b'\\' {
                        i += 1;
                        if i >= bytes.len() {
                            return Err(ParseError::new("unterminated string literal", start));
                        }
                        match bytes[i] {
                            b'n' => {
                                value.push('\n');
                                i += 1;
                            }
                            b't' => {
                                value.push('\t');
                                i += 1;
                            }
                            b'r' => {
                                value.push('\r');
                                i += 1;
                            }
                            _ => {
                                // Unknown escapes keep the escaped character,
                                // whole code point included.
                                let ch_len = src[i..]
                                    .chars()
                                    .next()
                                    .map(char::len_utf8)
                                    .unwrap_or(1);
                                value.push_str(&src[i..i + ch_len]);
                                i += ch_len;
                            }
                        }
                    } else {
                        // Consume one UTF-8 character.
                        let ch_len = src[i..]
                            .chars()
                            .next()
                            .map(char::len_utf8)
                            .unwrap_or(1);
                        value.push_str(&src[i..i + ch_len]);
                        i += ch_len;
                    }
                }
                tokens.push((Token::Str(value), start));
            }
            _ if is_ident_start(b) => {
                let mut end = i + 1;
                while end < bytes.len() && is_ident_continue(bytes[end]) {
                    end += 1;
                }
                tokens.push((Token::Ident(src[i..end].to_string()), start));
                i = end;
            }
            b'.' => {
                tokens.push((Token::Dot, start));
                i += 1;
            }
            b'[' => {
                tokens.push((Token::LBracket, start));
                i += 1;
            }
            b']' => {
                tokens.push((Token::RBracket, start));
                i += 1;
            }
            b'(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            b'?' => {
                tokens.push((Token::Question, start));
                i += 1;
            }
            b':' => {
                tokens.push((Token::Colon, start));
                i += 1;
            }
            b'+' => {
                tokens.push((Token::Plus, start));
                i += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, start));
                i += 1;
            }
            b'*' => {
                tokens.push((Token::Star, start));
                i += 1;
            }
            b'/' => {
                tokens.push((Token::Slash, start));
                i += 1;
            }
            b'%' => {
                tokens.push((Token::Percent, start));
                i += 1;
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::NotEq, start));
                    i += 2;
                } else {
                    tokens.push((Token::Bang, start));
                    i += 1;
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::EqEq, start));
                    i += 2;
                } else {
                    return Err(ParseError::new("assignment is not allowed", start));
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Le, start));
                    i += 2;
                } else {
                    tokens.push((Token::Lt, start));
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Ge, start));
                    i += 2;
                } else {
                    tokens.push((Token::Gt, start));
                    i += 1;
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push((Token::AndAnd, start));
                    i += 2;
                } else {
                    return Err(ParseError::new("unexpected '&'", start));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push((Token::OrOr, start));
                    i += 2;
                } else {
                    return Err(ParseError::new("unexpected '|'", start));
                }
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character {:?}", char::from(other)),
                    start,
                ));
            }
        }
    }
    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    len: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(ParseError::new(format!("expected {what}"), self.position()))
        }
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let consequent = self.ternary()?;
        self.expect(Token::Colon, "':' in conditional")?;
        let alternate = self.ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let position = self.position();
                match self.advance() {
                    Some(Token::Ident(name)) => {
                        let property = name.clone();
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                        };
                    }
                    _ => return Err(ParseError::new("expected property name", position)),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(Token::RBracket, "']'")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        let token = self.advance().cloned();
        match token {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                _ => Ok(Expr::Ident(name)),
            },
            Some(Token::LParen) => {
                let expr = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(ParseError::new("expected an expression", position)),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        len: src.len(),
    };
    let expr = parser.ternary()?;
    if parser.pos < tokens.len() {
        return Err(ParseError::new("unexpected trailing input", parser.position()));
    }
    Ok(expr)
}

// ── Binding paths ──────────────────────────────────────────────────────

/// A parsed `<sourceName>.<path>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    /// The root scope name the reference reads.
    pub source: String,
    /// Remaining path segments.
    pub segments: Vec<String>,
}

impl BindingPath {
    /// Lower the path to an expression, so that resolution shares the
    /// evaluator's access semantics.
    pub fn to_expr(&self) -> Expr {
        let mut expr = Expr::Ident(self.source.clone());
        for segment in &self.segments {
            expr = match segment.parse::<f64>() {
                Ok(n) => Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(Expr::Number(n)),
                },
                Err(_) => Expr::Member {
                    object: Box::new(expr),
                    property: segment.clone(),
                },
            };
        }
        expr
    }
}

/// Parse a dotted binding reference like `q1.data.0.name`.
pub fn parse_binding_path(path: &str) -> Result<BindingPath, ParseError> {
    let mut parts = path.split('.');
    let source = parts.next().unwrap_or_default();
    if source.is_empty() || !source.bytes().next().is_some_and(is_ident_start) {
        return Err(ParseError::new(
            format!("invalid binding source in {path:?}"),
            0,
        ));
    }
    let mut segments = Vec::new();
    for part in parts {
        if part.is_empty() {
            return Err(ParseError::new(
                format!("empty path segment in {path:?}"),
                0,
            ));
        }
        segments.push(part.to_string());
    }
    Ok(BindingPath {
        source: source.to_string(),
        segments,
    })
}

// ── String templates ───────────────────────────────────────────────────

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text, used as-is.
    Literal(String),
    /// An interpolated expression.
    Expr(Expr),
}

/// A parsed `{{ expr }}` string template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Template pieces in source order.
    pub parts: Vec<TemplatePart>,
}

impl Template {
    /// All scope names read by any interpolation.
    pub fn deps(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for part in &self.parts {
            if let TemplatePart::Expr(expr) = part {
                expr.collect_deps(&mut out);
            }
        }
        out
    }
}

/// Parse a string template with `{{ expr }}` interpolations.
pub fn parse_template(src: &str) -> Result<Template, ParseError> {
    let mut parts = Vec::new();
    let mut rest = src;
    let mut offset = 0;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            parts.push(TemplatePart::Literal(rest[..open].to_string()));
        }
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| {
            ParseError::new("unterminated '{{' interpolation", offset + open)
        })?;
        let inner = &after_open[..close];
        let expr = parse_expression(inner).map_err(|err| ParseError {
            message: err.message,
            position: offset + open + 2 + err.position,
        })?;
        parts.push(TemplatePart::Expr(expr));
        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest.to_string()));
    }
    Ok(Template { parts })
}
