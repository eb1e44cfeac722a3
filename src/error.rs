use miette::Diagnostic;
use thiserror::Error;

use crate::{
    backend::{interp::RuntimeError, verify::VerifyError},
    codegen::error::CodegenError,
    parse::error::SyntaxError,
};

#[derive(Error, Debug, Diagnostic)]
pub enum CoatError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    SyntaxError(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CodegenError(#[from] CodegenError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    VerifyError(#[from] VerifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    RuntimeError(#[from] RuntimeError),
}

pub type Result<T> = std::result::Result<T, CoatError>;
