use std::fmt::{self, Display};

use miette::Report;

use crate::{
    codegen::error::{CodegenError, CodegenWarning},
    lex::Location,
    parse::error::SyntaxError,
};

/// One diagnostic of a file, whichever stage produced it.
#[derive(Debug, Clone, Copy)]
pub enum Reported<'a> {
    Syntax(&'a SyntaxError),
    Codegen(&'a CodegenError),
    Warning(&'a CodegenWarning),
}

impl<'a> Reported<'a> {
    pub fn loc(&self) -> &'a Location {
        match self {
            Reported::Syntax(err) => err.loc(),
            Reported::Codegen(err) => err.loc(),
            Reported::Warning(warning) => warning.loc(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Reported::Syntax(_) => "Syntax Error",
            Reported::Codegen(_) => "Codegen Error",
            Reported::Warning(_) => "Codegen Warning",
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Reported::Warning(_))
    }

    /// `In file F, line L, column C`, with `<end of file>` standing in for the
    /// line when the input ran out.
    pub fn location(&self) -> String {
        let loc = self.loc();
        let line = match self {
            Reported::Syntax(err) if err.at_end_of_file() => "<end of file>".to_string(),
            _ => loc.line.to_string(),
        };
        format!("In file {}, line {line}, column {}", loc.file, loc.column)
    }

    /// An owned report, ready to have source code attached for rendering.
    pub fn report(&self) -> Report {
        match self {
            Reported::Syntax(err) => Report::new((*err).clone()),
            Reported::Codegen(err) => Report::new((*err).clone()),
            Reported::Warning(warning) => Report::new((*warning).clone()),
        }
    }
}

impl Display for Reported<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Reported::Syntax(err) => err.to_string(),
            Reported::Codegen(err) => err.to_string(),
            Reported::Warning(warning) => warning.to_string(),
        };
        write!(f, "{} encountered: {message}", self.label())
    }
}

/// Merges the diagnostics of one file into ascending line order. Diagnostics
/// on the same line keep their stage order: syntax, codegen, warnings.
pub fn merge<'a>(
    syntax: &'a [SyntaxError],
    codegen: &'a [CodegenError],
    warnings: &'a [CodegenWarning],
) -> Vec<Reported<'a>> {
    let mut merged: Vec<Reported> = syntax
        .iter()
        .map(Reported::Syntax)
        .chain(codegen.iter().map(Reported::Codegen))
        .chain(warnings.iter().map(Reported::Warning))
        .collect();
    merged.sort_by_key(|reported| reported.loc().line);
    merged
}
