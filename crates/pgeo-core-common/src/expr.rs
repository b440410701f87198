//! Attribute predicate language.
//!
//! A deliberately small SQL-like grammar used for layer attribute filters and
//! for `WHERE` clauses in engines that evaluate them:
//!
//! ```text
//! expr      := or_expr
//! or_expr   := and_expr ( OR and_expr )*
//! and_expr  := not_expr ( AND not_expr )*
//! not_expr  := NOT not_expr | predicate
//! predicate := '(' expr ')'
//!            | operand cmp operand
//!            | operand IS [NOT] NULL
//!            | operand [NOT] IN '(' literal (',' literal)* ')'
//! cmp       := '=' | '==' | '<>' | '!=' | '<' | '<=' | '>' | '>='
//! operand   := column | literal
//! column    := identifier | "quoted" | [bracketed]
//! literal   := ['-'] number | 'string' | NULL | TRUE | FALSE
//! ```
//!
//! Evaluation is three-valued: comparisons involving NULL, mismatched types or
//! unresolvable columns are *unknown*, and only *true* passes a filter.
//!
//! # Examples
//!
//! ```
//! use pgeo_core_common::expr::{ColumnResolver, Expr, Operand};
//!
//! struct Row;
//!
//! impl ColumnResolver for Row {
//!     fn resolve(&self, column: &str) -> Option<Operand<'_>> {
//!         match column {
//!             "OBJECTID" => Some(Operand::Integer(1)),
//!             "OWNER" => Some(Operand::Text("City".into())),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let expr: Expr = "OBJECTID = 1 AND OWNER <> 'County'".parse().unwrap();
//! assert!(expr.matches(&Row));
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while tokenizing or parsing an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// The expression text is blank.
    #[error("Empty expression")]
    Empty,

    /// A character that starts no token.
    #[error("Unexpected character '{ch}' at offset {position}")]
    UnexpectedChar {
        /// The offending character
        ch: char,
        /// Byte offset in the expression text
        position: usize,
    },

    /// A string literal or quoted identifier without its closing quote.
    #[error("Unterminated {what} starting at offset {position}")]
    Unterminated {
        /// "string literal" or "quoted identifier"
        what: &'static str,
        /// Byte offset of the opening quote
        position: usize,
    },

    /// A numeric literal that does not parse.
    #[error("Invalid number '{text}' at offset {position}")]
    InvalidNumber {
        /// The literal text
        text: String,
        /// Byte offset in the expression text
        position: usize,
    },

    /// A token other than the one the grammar requires.
    #[error("Expected {expected} but found {found}{}", position.map(|p| format!(" at offset {p}")).unwrap_or_default())]
    Unexpected {
        /// What the grammar allows here
        expected: String,
        /// What was found instead
        found: String,
        /// Byte offset, `None` at end of input
        position: Option<usize>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// A literal value in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

impl Literal {
    fn as_operand(&self) -> Operand<'_> {
        match self {
            Literal::Null => Operand::Null,
            Literal::Integer(v) => Operand::Integer(*v),
            Literal::Real(v) => Operand::Real(*v),
            Literal::Text(s) => Operand::Text(Cow::Borrowed(s)),
            Literal::Boolean(b) => Operand::Boolean(*b),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Integer(v) => write!(f, "{v}"),
            Literal::Real(v) => write!(f, "{v:?}"),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column by name.
    Column(String),
    /// Literal value.
    Literal(Literal),
    /// Binary comparison.
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
    /// `expr [NOT] IN (literal, ...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Literal>,
        negated: bool,
    },
}

/// A value an expression operand evaluates to.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(Cow<'a, str>),
    Boolean(bool),
    /// Opaque binary content; never comparable.
    Binary,
}

impl Operand<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn compare(&self, other: &Operand<'_>) -> Option<Ordering> {
        match (self, other) {
            (Operand::Integer(a), Operand::Integer(b)) => Some(a.cmp(b)),
            (Operand::Integer(a), Operand::Real(b)) => (*a as f64).partial_cmp(b),
            (Operand::Real(a), Operand::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Operand::Real(a), Operand::Real(b)) => a.partial_cmp(b),
            (Operand::Text(a), Operand::Text(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Operand::Boolean(a), Operand::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Resolves column names to values while an expression is evaluated.
pub trait ColumnResolver {
    /// Returns the value of `column`, or `None` if no such column exists.
    fn resolve(&self, column: &str) -> Option<Operand<'_>>;
}

impl Expr {
    /// Evaluates the expression with three-valued logic.
    ///
    /// Returns `None` when the result is unknown.
    pub fn evaluate<R: ColumnResolver + ?Sized>(&self, row: &R) -> Option<bool> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => match self.operand(row)? {
                Operand::Boolean(b) => Some(b),
                _ => None,
            },
            Expr::Compare { left, op, right } => {
                let left = left.operand(row)?;
                let right = right.operand(row)?;
                left.compare(&right).map(|ordering| op.test(ordering))
            },
            Expr::And(left, right) => match left.evaluate(row) {
                Some(false) => Some(false),
                lhs => match (lhs, right.evaluate(row)) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
            },
            Expr::Or(left, right) => match left.evaluate(row) {
                Some(true) => Some(true),
                lhs => match (lhs, right.evaluate(row)) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
            },
            Expr::Not(inner) => inner.evaluate(row).map(|b| !b),
            Expr::IsNull { expr, negated } => {
                let is_null = matches!(expr.operand(row)?, Operand::Null);
                Some(is_null != *negated)
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = expr.operand(row)?;
                if matches!(value, Operand::Null) {
                    return None;
                }
                let mut unknown = false;
                for literal in list {
                    match value.compare(&literal.as_operand()) {
                        Some(Ordering::Equal) => return Some(!*negated),
                        Some(_) => {},
                        None => unknown = true,
                    }
                }
                if unknown { None } else { Some(*negated) }
            },
        }
    }

    /// Returns `true` only when the expression evaluates to *true*.
    pub fn matches<R: ColumnResolver + ?Sized>(&self, row: &R) -> bool {
        self.evaluate(row) == Some(true)
    }

    /// Lists every column name the expression references, in order of appearance.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => out.push(name),
            Expr::Literal(_) => {},
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            },
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::IsNull { expr, .. } | Expr::InList { expr, .. } => expr.collect_columns(out),
        }
    }

    fn operand<'r, R: ColumnResolver + ?Sized>(&'r self, row: &'r R) -> Option<Operand<'r>> {
        match self {
            Expr::Column(name) => row.resolve(name),
            Expr::Literal(literal) => Some(literal.as_operand()),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "\"{}\"", name.replace('"', "\"\"")),
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Compare { left, op, right } => write!(f, "{left} {} {right}", op.as_str()),
            Expr::And(left, right) => write!(f, "({left} AND {right})"),
            Expr::Or(left, right) => write!(f, "({left} OR {right})"),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items = list
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{expr} {}IN ({items})", if *negated { "NOT " } else { "" })
            },
        }
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a complete predicate expression.
///
/// # Errors
///
/// Returns an [`ExprError`] describing the first lexical or syntax problem.
pub fn parse(text: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(text)?;
    if parser.is_at_end() {
        return Err(ExprError::Empty);
    }
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Lexical tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier or keyword.
    Word(String),
    /// `"quoted"` or `[bracketed]` identifier.
    QuotedIdent(String),
    Number(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Star,
    Minus,
    Cmp(CompareOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{w}'"),
            Token::QuotedIdent(w) => write!(f, "identifier \"{w}\""),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Star => f.write_str("'*'"),
            Token::Minus => f.write_str("'-'"),
            Token::Cmp(op) => write!(f, "'{}'", op.as_str()),
        }
    }
}

const RESERVED: &[&str] = &["AND", "OR", "NOT", "IS", "NULL", "IN", "TRUE", "FALSE"];

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let token = match ch {
            '(' | ')' | ',' | '*' | '-' => {
                chars.next();
                match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '*' => Token::Star,
                    _ => Token::Minus,
                }
            },
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                }
                Token::Cmp(CompareOp::Eq)
            },
            '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => Token::Cmp(CompareOp::NotEq),
                    _ => return Err(ExprError::UnexpectedChar { ch, position: start }),
                }
            },
            '<' => {
                chars.next();
                match chars.peek() {
                    Some((_, '=')) => {
                        chars.next();
                        Token::Cmp(CompareOp::LtEq)
                    },
                    Some((_, '>')) => {
                        chars.next();
                        Token::Cmp(CompareOp::NotEq)
                    },
                    _ => Token::Cmp(CompareOp::Lt),
                }
            },
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    Token::Cmp(CompareOp::GtEq)
                } else {
                    Token::Cmp(CompareOp::Gt)
                }
            },
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == ch {
                        // A doubled quote is an escaped quote.
                        if matches!(chars.peek(), Some((_, next)) if *next == ch) {
                            chars.next();
                            value.push(ch);
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(ExprError::Unterminated {
                        what: if ch == '\'' {
                            "string literal"
                        } else {
                            "quoted identifier"
                        },
                        position: start,
                    });
                }
                if ch == '\'' {
                    Token::Str(value)
                } else {
                    Token::QuotedIdent(value)
                }
            },
            '[' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(ExprError::Unterminated {
                        what: "quoted identifier",
                        position: start,
                    });
                }
                Token::QuotedIdent(value)
            },
            c if c.is_ascii_digit() || c == '.' => {
                let mut value = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    let exponent_sign = (c == '+' || c == '-')
                        && value.ends_with(['e', 'E'])
                        && value.chars().next().is_some_and(|f| f.is_ascii_digit() || f == '.');
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                        value.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Number(value)
            },
            c if c.is_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        value.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Word(value)
            },
            _ => return Err(ExprError::UnexpectedChar { ch, position: start }),
        };
        tokens.push((token, start));
    }

    Ok(tokens)
}

/// Recursive descent parser over the expression grammar.
///
/// Exposed so that engines can embed expressions in larger statements
/// (for example the `WHERE` clause of a `SELECT`).
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    /// Tokenizes `text` and positions the parser at the first token.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] if the text contains an invalid token.
    pub fn new(text: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    /// Returns `true` once every token has been consumed.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Fails unless every token has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Unexpected`] naming the first leftover token.
    pub fn expect_end(&self) -> Result<(), ExprError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    /// Returns `true` if the next token is the (case-insensitive) keyword.
    #[must_use]
    pub fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    /// Consumes the keyword if it is next.
    pub fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the keyword or fails.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Unexpected`] if the keyword is not next.
    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), ExprError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    /// Consumes `token` if it is next.
    pub fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes an identifier (bare, quoted or bracketed) that is not a reserved word.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Unexpected`] if the next token is not an identifier.
    pub fn expect_identifier(&mut self) -> Result<String, ExprError> {
        match self.peek() {
            Some(Token::Word(w)) if !is_reserved(w) => {
                let name = w.clone();
                self.pos += 1;
                Ok(name)
            },
            Some(Token::QuotedIdent(w)) => {
                let name = w.clone();
                self.pos += 1;
                Ok(name)
            },
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Parses an expression starting at the current token.
    ///
    /// Parsing stops at the first token that cannot continue the expression,
    /// leaving it for the caller.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] on syntax errors.
    pub fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.consume_keyword("NOT") {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, ExprError> {
        if self.consume(&Token::LParen) {
            let inner = self.parse_expr()?;
            if !self.consume(&Token::RParen) {
                return Err(self.unexpected("')'"));
            }
            return Ok(inner);
        }

        let left = self.parse_operand()?;

        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        if self.consume_keyword("IS") {
            let negated = self.consume_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = self.consume_keyword("NOT");
        if self.consume_keyword("IN") {
            if !self.consume(&Token::LParen) {
                return Err(self.unexpected("'('"));
            }
            let mut list = vec![self.parse_literal()?];
            while self.consume(&Token::Comma) {
                list.push(self.parse_literal()?);
            }
            if !self.consume(&Token::RParen) {
                return Err(self.unexpected("')'"));
            }
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }

        Err(self.unexpected(if negated {
            "IN"
        } else {
            "comparison operator, IS or IN"
        }))
    }

    fn parse_operand(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Word(w)) if !is_literal_keyword(w) => {
                self.expect_identifier().map(Expr::Column)
            },
            Some(Token::QuotedIdent(_)) => self.expect_identifier().map(Expr::Column),
            _ => self.parse_literal().map(Expr::Literal),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ExprError> {
        let negative = self.consume(&Token::Minus);
        let Some((token, position)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.unexpected("literal"));
        };

        let literal = match token {
            Token::Number(text) => parse_number(&text, negative, position)?,
            Token::Str(s) if !negative => Literal::Text(s),
            Token::Word(w) if !negative && w.eq_ignore_ascii_case("NULL") => Literal::Null,
            Token::Word(w) if !negative && w.eq_ignore_ascii_case("TRUE") => Literal::Boolean(true),
            Token::Word(w) if !negative && w.eq_ignore_ascii_case("FALSE") => {
                Literal::Boolean(false)
            },
            _ => {
                return Err(self.unexpected(if negative { "number" } else { "literal" }));
            },
        };
        self.pos += 1;
        Ok(literal)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        match self.tokens.get(self.pos) {
            Some((token, position)) => ExprError::Unexpected {
                expected: expected.to_string(),
                found: token.to_string(),
                position: Some(*position),
            },
            None => ExprError::Unexpected {
                expected: expected.to_string(),
                found: "end of expression".to_string(),
                position: None,
            },
        }
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn is_literal_keyword(word: &str) -> bool {
    ["NULL", "TRUE", "FALSE"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(word))
}

fn parse_number(text: &str, negative: bool, position: usize) -> Result<Literal, ExprError> {
    let signed = if negative {
        format!("-{text}")
    } else {
        text.to_string()
    };
    let is_real = text.contains(['.', 'e', 'E']);
    let literal = if is_real {
        signed.parse::<f64>().ok().map(Literal::Real)
    } else {
        signed.parse::<i64>().ok().map(Literal::Integer)
    };
    literal.ok_or(ExprError::InvalidNumber {
        text: signed,
        position,
    })
}
