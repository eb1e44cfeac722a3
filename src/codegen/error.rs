use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lex::Location;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("unknown variable '{identifier}'")]
    #[diagnostic(code(codegen::undeclared_variable))]
    UndeclaredVariable {
        identifier: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("redefinition of function '{function}'")]
    #[diagnostic(code(codegen::redefinition))]
    Redefinition {
        function: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("'{function}' expects {expected} argument(s), got {got}")]
    #[diagnostic(code(codegen::arity_mismatch))]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid assignment target; only variables can be assigned")]
    #[diagnostic(code(codegen::invalid_assignment_target))]
    InvalidAssignmentTarget {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("{kind} does not produce a value")]
    #[diagnostic(code(codegen::missing_value))]
    MissingValue {
        kind: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("while loop bodies cannot produce a value")]
    #[diagnostic(
        code(codegen::loop_value),
        help("end the last expression in the loop body with ';'")
    )]
    LoopValue {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("global '{identifier}' must be initialized with a constant")]
    #[diagnostic(code(codegen::non_constant_global))]
    NonConstantGlobal {
        identifier: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("duplicate global '{identifier}'")]
    #[diagnostic(code(codegen::duplicate_global))]
    DuplicateGlobal {
        identifier: String,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("{kind} is not allowed here")]
    #[diagnostic(code(codegen::misplaced_statement))]
    MisplacedStatement {
        kind: &'static str,
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },
}

impl CodegenError {
    pub fn loc(&self) -> &Location {
        match self {
            CodegenError::UndeclaredVariable { loc, .. }
            | CodegenError::Redefinition { loc, .. }
            | CodegenError::ArityMismatch { loc, .. }
            | CodegenError::InvalidAssignmentTarget { loc, .. }
            | CodegenError::MissingValue { loc, .. }
            | CodegenError::LoopValue { loc, .. }
            | CodegenError::NonConstantGlobal { loc, .. }
            | CodegenError::DuplicateGlobal { loc, .. }
            | CodegenError::MisplacedStatement { loc, .. } => loc,
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CodegenWarning {
    #[error("if branches disagree on producing a value; the missing one yields 0")]
    #[diagnostic(code(codegen::branch_mismatch), severity(Warning))]
    BranchMismatch {
        loc: Location,
        #[label("here")]
        span: SourceSpan,
    },
}

impl CodegenWarning {
    pub fn loc(&self) -> &Location {
        match self {
            CodegenWarning::BranchMismatch { loc, .. } => loc,
        }
    }
}
