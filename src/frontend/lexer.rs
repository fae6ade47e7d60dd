use thiserror::Error;

use crate::frontend::token::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    /// Open parentheses; newlines are not separators while this is non-zero.
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            depth: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>, span: &Span) -> LexerError {
        LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch == ' ' || ch == '\t' || ch == '\r' || (ch == '\n' && self.depth > 0) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.span();

        let mut digits = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    digits.push(ch);
                }
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                digits.push('.');
                self.advance();
            } else {
                break;
            }
        }

        if has_dot {
            let value: f64 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid float: {}", digits), &start))?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid integer: {}", digits), &start))?;
            Ok(Token::Integer(value))
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::Ident(ident)
    }

    fn read_operator(&mut self, span: &Span) -> Result<Token, LexerError> {
        let Some(ch) = self.current() else {
            return Err(self.error("unexpected end of input", span));
        };

        let token = match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => Token::Assign,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '(' => {
                self.depth += 1;
                Token::LParen
            }
            ')' => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| self.error("unmatched ')'", span))?;
                Token::RParen
            }
            other => return Err(self.error(format!("unexpected character '{}'", other), span)),
        };

        self.advance();
        Ok(token)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some('\n') => {
                    self.advance();
                    Token::Newline
                }
                Some(ch) if ch.is_ascii_digit() => self.read_number()?,
                Some('.') if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()?
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
                Some(_) => self.read_operator(&span)?,
            };

            tokens.push(Spanned { token, span });
        }

        Ok(tokens)
    }
}
