use crate::{
    ast::{Block, Located},
    lex::Token,
    parse::{error::SyntaxError, parser::Parser},
};

pub mod error;
mod parser;
mod prec;

/// Parses a token stream as produced by [`crate::lex::tokenize`].
///
/// Syntax errors never stop the parse: each one is appended to `errors` and
/// parsing resumes at the next statement, so the returned tree holds
/// everything that could be recovered.
pub fn parse(tokens: &[Token], errors: &mut Vec<SyntaxError>) -> Located<Block> {
    let (program, mut found) = Parser::new(tokens).program();
    errors.append(&mut found);
    program
}
