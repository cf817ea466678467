//! Filter expressions over decoded results.
//!
//! Grammar:
//!
//! ```text
//! expr       := and ("||" and)*
//! and        := unary ("&&" unary)*
//! unary      := "!" unary | "(" expr ")" | comparison
//! comparison := field (op literal)?
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">="
//! literal    := number | 'text' | "text" | bareword
//! ```
//!
//! A bare field is only allowed for flag fields and means `field == true`.
//! Expressions are checked against the payload's field schema when parsed, so
//! typos surface as [`FilterError`] instead of silently matching nothing.
//! The empty expression matches every result. Nesting of `!` and `(` is
//! limited to [`MAX_NESTING`] levels.

use thiserror::Error;

pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Text(&'a str),
    Flag(bool),
}

/// Payloads that can be queried by filter expressions.
pub trait Filterable {
    /// Field names and kinds accepted in filter expressions.
    fn schema() -> &'static [(&'static str, FieldKind)];

    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("unexpected character '{found}' at {position}")]
    UnexpectedChar { position: usize, found: char },

    #[error("unexpected token '{found}' at {position}")]
    UnexpectedToken { position: usize, found: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unterminated string starting at {0}")]
    UnterminatedString(usize),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("operator '{op}' not supported for field '{field}'")]
    UnsupportedOperator { field: String, op: &'static str },

    #[error("invalid literal '{literal}' for field '{field}'")]
    InvalidLiteral { field: String, literal: String },

    #[error("expression nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    fn apply<T: PartialOrd>(&self, lhs: T, rhs: T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Compare {
        field: String,
        op: CmpOp,
        value: Literal,
    },
}

impl Node {
    fn eval<T: Filterable>(&self, item: &T) -> bool {
        match self {
            Node::And(terms) => terms.iter().all(|n| n.eval(item)),
            Node::Or(terms) => terms.iter().any(|n| n.eval(item)),
            Node::Not(inner) => !inner.eval(item),
            Node::Compare { field, op, value } => match (item.field(field), value) {
                (Some(FieldValue::Number(lhs)), Literal::Number(rhs)) => op.apply(lhs, *rhs),
                (Some(FieldValue::Text(lhs)), Literal::Text(rhs)) => op.apply(lhs, rhs.as_str()),
                (Some(FieldValue::Flag(lhs)), Literal::Flag(rhs)) => op.apply(lhs, *rhs),
                _ => false,
            },
        }
    }
}

/// A parsed, schema-checked filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Option<Node>,
}

impl Filter {
    /// Filter that accepts every result.
    pub fn match_all() -> Self {
        Self { root: None }
    }

    pub fn parse(
        expression: &str,
        schema: &[(&'static str, FieldKind)],
    ) -> Result<Self, FilterError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(Self::match_all());
        }

        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            schema,
        };
        let root = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(FilterError::UnexpectedToken {
                position: token.position,
                found: token.kind.to_string(),
            });
        }

        Ok(Self { root: Some(root) })
    }

    /// Parse against the schema published by `T`.
    pub fn for_payload<T: Filterable>(expression: &str) -> Result<Self, FilterError> {
        Self::parse(expression, T::schema())
    }

    pub fn is_match_all(&self) -> bool {
        self.root.is_none()
    }

    pub fn matches<T: Filterable>(&self, item: &T) -> bool {
        self.root.as_ref().is_none_or(|node| node.eval(item))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(f64),
    Text(String),
    Op(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Text(s) => write!(f, "'{}'", s),
            TokenKind::Op(op) => write!(f, "{}", op.as_str()),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        let (kind, width) = match (c, next) {
            (c, _) if c.is_whitespace() => {
                i += 1;
                continue;
            }
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('=', Some('=')) => (TokenKind::Op(CmpOp::Eq), 2),
            ('!', Some('=')) => (TokenKind::Op(CmpOp::Ne), 2),
            ('<', Some('=')) => (TokenKind::Op(CmpOp::Le), 2),
            ('>', Some('=')) => (TokenKind::Op(CmpOp::Ge), 2),
            ('<', _) => (TokenKind::Op(CmpOp::Lt), 1),
            ('>', _) => (TokenKind::Op(CmpOp::Gt), 1),
            ('!', _) => (TokenKind::Not, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('\'' | '"', _) => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&(_, ch)| ch == c)
                    .ok_or(FilterError::UnterminatedString(position))?;
                let text: String = chars[i + 1..i + 1 + end].iter().map(|&(_, ch)| ch).collect();
                (TokenKind::Text(text), end + 2)
            }
            (c, _) if c.is_ascii_digit() || c == '-' || c == '.' => {
                let len = chars[i..]
                    .iter()
                    .enumerate()
                    .take_while(|&(n, &(_, ch))| {
                        ch.is_ascii_digit() || ch == '.' || (n == 0 && ch == '-')
                    })
                    .count();
                let literal: String = chars[i..i + len].iter().map(|&(_, ch)| ch).collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| FilterError::UnexpectedToken {
                        position,
                        found: literal.clone(),
                    })?;
                (TokenKind::Number(value), len)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|&&(_, ch)| ch.is_alphanumeric() || ch == '_')
                    .count();
                let ident: String = chars[i..i + len].iter().map(|&(_, ch)| ch).collect();
                (TokenKind::Ident(ident), len)
            }
            (found, _) => return Err(FilterError::UnexpectedChar { position, found }),
        };

        tokens.push(Token { kind, position });
        i += width;
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    schema: &'a [(&'static str, FieldKind)],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&'a Token, FilterError> {
        let token = self.tokens.get(self.pos).ok_or(FilterError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Chains stay flat so tree depth only grows with `!` and `(`.
    fn expr(&mut self) -> Result<Node, FilterError> {
        let mut terms = vec![self.and()?];
        while self.eat(&TokenKind::Or) {
            terms.push(self.and()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Node::Or(terms),
        })
    }

    fn and(&mut self) -> Result<Node, FilterError> {
        let mut terms = vec![self.unary()?];
        while self.eat(&TokenKind::And) {
            terms.push(self.unary()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Node::And(terms),
        })
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Node, FilterError>,
    ) -> Result<Node, FilterError> {
        if self.depth >= MAX_NESTING {
            return Err(FilterError::TooDeep { limit: MAX_NESTING });
        }
        self.depth += 1;
        let node = parse(self);
        self.depth -= 1;
        node
    }

    fn unary(&mut self) -> Result<Node, FilterError> {
        if self.eat(&TokenKind::Not) {
            return Ok(Node::Not(Box::new(self.nested(Self::unary)?)));
        }
        if self.eat(&TokenKind::LParen) {
            let node = self.nested(Self::expr)?;
            let token = self.next()?;
            if token.kind != TokenKind::RParen {
                return Err(unexpected(token));
            }
            return Ok(node);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, FilterError> {
        let token = self.next()?;
        let field = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(unexpected(token)),
        };
        let kind = self
            .schema
            .iter()
            .find(|(name, _)| *name == field)
            .map(|&(_, kind)| kind)
            .ok_or_else(|| FilterError::UnknownField(field.clone()))?;

        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op(op)) => *op,
            _ if kind == FieldKind::Flag => {
                return Ok(Node::Compare {
                    field,
                    op: CmpOp::Eq,
                    value: Literal::Flag(true),
                });
            }
            _ => {
                return Err(match self.peek() {
                    Some(token) => unexpected(token),
                    None => FilterError::UnexpectedEnd,
                });
            }
        };
        self.pos += 1;

        if kind != FieldKind::Number && !op.is_equality() {
            return Err(FilterError::UnsupportedOperator {
                field,
                op: op.as_str(),
            });
        }

        let token = self.next()?;
        let value = match (kind, &token.kind) {
            (FieldKind::Number, TokenKind::Number(n)) => Literal::Number(*n),
            (FieldKind::Text, TokenKind::Text(s) | TokenKind::Ident(s)) => Literal::Text(s.clone()),
            (FieldKind::Flag, TokenKind::Ident(s)) if s == "true" => Literal::Flag(true),
            (FieldKind::Flag, TokenKind::Ident(s)) if s == "false" => Literal::Flag(false),
            (_, TokenKind::Number(_) | TokenKind::Text(_) | TokenKind::Ident(_)) => {
                return Err(FilterError::InvalidLiteral {
                    field,
                    literal: token.kind.to_string(),
                });
            }
            _ => return Err(unexpected(token)),
        };

        Ok(Node::Compare { field, op, value })
    }
}

fn unexpected(token: &Token) -> FilterError {
    FilterError::UnexpectedToken {
        position: token.position,
        found: token.kind.to_string(),
    }
}
