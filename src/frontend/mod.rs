//! Source text to [`Node`](crate::lang::node::Node) trees.

pub mod lexer;
pub mod parser;
pub mod token;

use crate::lang::node::Node;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("lexer error: {0}")]
    Lexer(#[from] lexer::LexerError),

    #[error("parse error: {0}")]
    Parser(#[from] parser::ParserError),
}

/// Tokenizes and parses `source` into a module node.
pub fn parse_source(source: &str) -> Result<Node, FrontendError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    Ok(parser::Parser::new(tokens).parse()?)
}
