use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lex::{Location, Token, TokenKind};

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("expected {expected} {context}, found {found}")]
    #[diagnostic(code(parse::expected_token))]
    ExpectedToken {
        expected: TokenKind,
        found: TokenKind,
        context: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unexpected {found} {context}")]
    #[diagnostic(code(parse::unexpected_token))]
    UnexpectedToken {
        found: TokenKind,
        context: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("ran out of tokens {context}")]
    #[diagnostic(code(parse::unexpected_eof))]
    UnexpectedEof {
        context: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unrecognized character '{lexeme}'")]
    #[diagnostic(code(parse::invalid_character))]
    InvalidCharacter {
        lexeme: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid number literal '{lexeme}'")]
    #[diagnostic(
        code(parse::invalid_number),
        help("literals must fit in an unsigned 64-bit integer")
    )]
    InvalidNumber {
        lexeme: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("expected an expression, but found none")]
    #[diagnostic(code(parse::empty_expression))]
    EmptyExpression {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("{operator} is missing an operand on its {side}")]
    #[diagnostic(code(parse::missing_operand))]
    MissingOperand {
        operator: TokenKind,
        side: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("expected an operand after an operator, but got {found}")]
    #[diagnostic(code(parse::consecutive_operators))]
    ConsecutiveOperators {
        found: TokenKind,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unclosed {delimiter}")]
    #[diagnostic(code(parse::unclosed_delimiter))]
    UnclosedDelimiter {
        delimiter: TokenKind,
        loc: Location,
        #[label("opened here")]
        span: SourceSpan,
    },

    #[error("mismatched {found}; expected {expected}")]
    #[diagnostic(code(parse::mismatched_delimiter))]
    MismatchedDelimiter {
        found: TokenKind,
        expected: TokenKind,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("only function definitions and global variable declarations are allowed at the top level")]
    #[diagnostic(code(parse::top_level_statement))]
    TopLevelStatement {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("function definitions are only allowed at the top level")]
    #[diagnostic(code(parse::nested_function))]
    NestedFunction {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },
}

impl SyntaxError {
    /// The right error for finding `token` where something else belonged.
    pub fn unexpected(token: &Token, context: &'static str) -> SyntaxError {
        let loc = token.loc.clone();
        let span = loc.span;
        match token.kind {
            TokenKind::Eoi => SyntaxError::UnexpectedEof { context, loc, span },
            TokenKind::Invalid => SyntaxError::InvalidCharacter {
                lexeme: token.lexeme.into(),
                loc,
                span,
            },
            found => SyntaxError::UnexpectedToken {
                found,
                context,
                loc,
                span,
            },
        }
    }

    pub fn expected(expected: TokenKind, token: &Token, context: &'static str) -> SyntaxError {
        match token.kind {
            TokenKind::Eoi | TokenKind::Invalid => SyntaxError::unexpected(token, context),
            found => SyntaxError::ExpectedToken {
                expected,
                found,
                context,
                loc: token.loc.clone(),
                span: token.loc.span,
            },
        }
    }

    pub fn loc(&self) -> &Location {
        match self {
            SyntaxError::ExpectedToken { loc, .. }
            | SyntaxError::UnexpectedToken { loc, .. }
            | SyntaxError::UnexpectedEof { loc, .. }
            | SyntaxError::InvalidCharacter { loc, .. }
            | SyntaxError::InvalidNumber { loc, .. }
            | SyntaxError::EmptyExpression { loc, .. }
            | SyntaxError::MissingOperand { loc, .. }
            | SyntaxError::ConsecutiveOperators { loc, .. }
            | SyntaxError::UnclosedDelimiter { loc, .. }
            | SyntaxError::MismatchedDelimiter { loc, .. }
            | SyntaxError::TopLevelStatement { loc, .. }
            | SyntaxError::NestedFunction { loc, .. } => loc,
        }
    }

    /// Whether the error was raised by running out of input.
    pub fn at_end_of_file(&self) -> bool {
        matches!(self, SyntaxError::UnexpectedEof { .. })
    }
}
