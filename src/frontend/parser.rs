use thiserror::Error;

use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::node::{BinOp, Node, Target};

static EOF: Token = Token::Eof;

/// How deeply parentheses and call arguments may nest.
pub const MAX_NESTING: usize = 200;

/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Recursive-descent parser producing a [`Node::Module`].
///
/// Grammar:
///
/// ```text
/// module     := (statement (NEWLINE | ';')*)* EOF
/// statement  := exprlist ('=' exprlist)*
/// exprlist   := expr (',' expr)*
/// expr       := term (('+' | '-') term)*
/// term       := postfix (('*' | '/' | '%') postfix)*
/// postfix    := atom ('(' [expr (',' expr)* [',']] ')')*
/// atom       := INTEGER | FLOAT | IDENT | '(' expr ')'
/// ```
///
/// In `a = b = value` every list but the last is a target. A target list with
/// more than one element becomes a `Target::Tuple`; any other target that is
/// not a plain name is kept as `Target::Expr` and left for the compiler to
/// reject.
///
/// Operator chains are built in a loop and may be any length; nesting through
/// parentheses or call arguments is limited to [`MAX_NESTING`] levels.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Current `expr` nesting.
    depth: usize,
    /// Span of the most recently consumed token.
    last_span: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            last_span: None,
        }
    }

    /// Returns the current token without consuming it.
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if let Some(s) = self.tokens.get(self.pos) {
            self.last_span = Some(s.span.clone());
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<(), ParserError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected '{}' {}, found {}",
                expected,
                context,
                self.peek()
            )))
        }
    }

    /// Constructs a `ParserError` at the current token, falling back to the
    /// last consumed one, then to 1:1 for empty input.
    fn error(&self, message: &str) -> ParserError {
        let span = self
            .tokens
            .get(self.pos)
            .map(|s| s.span.clone())
            .or_else(|| self.last_span.clone())
            .unwrap_or(Span { line: 1, col: 1 });
        ParserError {
            message: message.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    /// Parses a complete module.
    pub fn parse(&mut self) -> Result<Node, ParserError> {
        let mut body = Vec::new();

        self.skip_separators();
        while *self.peek() != Token::Eof {
            body.push(self.parse_statement()?);

            match self.peek() {
                Token::Newline | Token::Semicolon => self.skip_separators(),
                Token::Eof => break,
                other => {
                    return Err(self.error(&format!("expected end of statement, found {}", other)));
                }
            }
        }

        Ok(Node::Module(body))
    }

    fn parse_statement(&mut self) -> Result<Node, ParserError> {
        let mut lists = vec![self.parse_exprlist()?];
        while self.eat(&Token::Assign) {
            lists.push(self.parse_exprlist()?);
        }

        let value = match lists.pop() {
            Some(mut items) if items.len() == 1 => items.remove(0),
            Some(_) => return Err(self.error("tuple expressions are not supported")),
            None => return Err(self.error("expected expression")),
        };

        if lists.is_empty() {
            return Ok(Node::expr(value));
        }

        let targets = lists.into_iter().map(Self::to_target).collect();
        Ok(Node::Assign {
            targets,
            value: Box::new(value),
        })
    }

    fn to_target(mut items: Vec<Node>) -> Target {
        if items.len() == 1 {
            Target::from_node(items.remove(0))
        } else {
            Target::Tuple(items.into_iter().map(Target::from_node).collect())
        }
    }

    fn parse_exprlist(&mut self) -> Result<Vec<Node>, ParserError> {
        let mut items = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            items.push(self.parse_expr()?);
        }
        Ok(items)
    }

    fn parse_expr(&mut self) -> Result<Node, ParserError> {
        if self.depth == MAX_NESTING {
            return Err(self.error(&format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = self.parse_sum();
        self.depth -= 1;
        result
    }

    fn parse_sum(&mut self) -> Result<Node, ParserError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Node::binop(left, op, right);
        }
    }

    fn parse_term(&mut self) -> Result<Node, ParserError> {
        let mut left = self.parse_postfix()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_postfix()?;
            left = Node::binop(left, op, right);
        }
    }

    fn parse_postfix(&mut self) -> Result<Node, ParserError> {
        let mut node = self.parse_atom()?;
        while self.eat(&Token::LParen) {
            let mut args = Vec::new();
            while *self.peek() != Token::RParen {
                args.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen, "to close argument list")?;
            node = Node::call(node, args);
        }
        Ok(node)
    }

    fn parse_atom(&mut self) -> Result<Node, ParserError> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(Node::int(n))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Node::float(n))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Node::Name(name))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "after parenthesized expression")?;
                Ok(inner)
            }
            other => Err(self.error(&format!("expected expression, found {}", other))),
        }
    }
}
