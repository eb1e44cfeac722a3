//! Compiler core for the coat language: a tokenizer, an error-recovering
//! parser, and a code generator that lowers programs through an abstract IR
//! builder. The `backend` module supplies a concrete IR with a verifier and an
//! interpreter.

use crate::{
    ast::{Block, Located},
    backend::{builder::ModuleBuilder, interp::Interpreter, ir::Module},
    codegen::error::{CodegenError, CodegenWarning},
    diagnostic::Reported,
    error::{CoatError, Result},
    lex::Token,
    parse::error::SyntaxError,
};

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod diagnostic;
pub mod error;
pub mod lex;
pub mod parse;

/// Everything produced from one source file.
#[derive(Debug)]
pub struct Compilation<'src> {
    pub tokens: Vec<Token<'src>>,
    pub ast: Located<Block>,
    pub module: Module,
    pub syntax_errors: Vec<SyntaxError>,
    pub codegen_errors: Vec<CodegenError>,
    pub warnings: Vec<CodegenWarning>,
}

/// The outcome of running `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub value: u64,
    pub output: Vec<u64>,
}

/// Runs every stage over `source`. Errors in the program are collected on the
/// returned [`Compilation`]; only a module that fails verification is `Err`.
pub fn compile<'src>(file: &str, source: &'src str) -> Result<Compilation<'src>> {
    let tokens = lex::tokenize(file, source);

    let mut syntax_errors = vec![];
    let ast = parse::parse(&tokens, &mut syntax_errors);

    let mut builder = ModuleBuilder::new(file);
    let mut codegen_errors = vec![];
    let mut warnings = vec![];
    codegen::generate(&ast, &mut builder, &mut codegen_errors, &mut warnings)?;

    Ok(Compilation {
        tokens,
        ast,
        module: builder.finish(),
        syntax_errors,
        codegen_errors,
        warnings,
    })
}

impl Compilation<'_> {
    pub fn has_errors(&self) -> bool {
        !self.syntax_errors.is_empty() || !self.codegen_errors.is_empty()
    }

    /// All diagnostics in line order.
    pub fn diagnostics(&self) -> Vec<Reported<'_>> {
        diagnostic::merge(&self.syntax_errors, &self.codegen_errors, &self.warnings)
    }

    /// Fails with the earliest error, if there is one.
    pub fn check(&self) -> Result<()> {
        let first = self.diagnostics().into_iter().find(Reported::is_error);
        match first {
            Some(Reported::Syntax(err)) => Err(CoatError::SyntaxError(err.clone())),
            Some(Reported::Codegen(err)) => Err(CoatError::CodegenError(err.clone())),
            _ => Ok(()),
        }
    }

    /// Calls `main` with no arguments.
    pub fn run(&self, max_steps: u64) -> Result<Execution> {
        self.check()?;
        let mut interpreter = Interpreter::new(&self.module).with_max_steps(max_steps);
        let value = interpreter.call("main", &[])?;
        Ok(Execution {
            value,
            output: interpreter.output().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::interp::{RuntimeError, DEFAULT_MAX_STEPS};

    fn run(source: &str) -> Execution {
        let compilation = match compile("test.ct", source) {
            Ok(compilation) => compilation,
            Err(err) => panic!("{source}: {err}"),
        };
        match compilation.run(DEFAULT_MAX_STEPS) {
            Ok(execution) => execution,
            Err(err) => panic!("{source}: {err}"),
        }
    }

    fn value(source: &str) -> u64 {
        run(source).value
    }

    #[test]
    fn arithmetic() {
        assert_eq!(value("fn main() { 3 + 2 * 3 + 4 % 3 }"), 10);
        assert_eq!(value("fn main() { (3 + 2) * 3 }"), 15);
        assert_eq!(value("fn main() { 20 / 3 / 2 }"), 3);
        assert_eq!(value("fn main() { 10 - 3 - 2 }"), 5);
        assert_eq!(value("fn main() { -1 }"), u64::MAX);
        assert_eq!(value("fn main() { 0 - 1 / 2 }"), 0);
        assert_eq!(value("fn main() { 0xff + 3 }"), 258);
    }

    #[test]
    fn calls_and_recursion() {
        let fib = "
            fn main() { fib(10) }
            fn fib(n) {
                if n {
                    if n - 1 { fib(n - 1) + fib(n - 2) } else { 1 }
                } else {
                    0
                }
            }
        ";
        assert_eq!(value(fib), 55);
        assert_eq!(value("fn add(a, b) { a + b } fn main() { add(add(1, 2), 3) }"), 6);
    }

    #[test]
    fn variables_and_scopes() {
        let source = "
            fn main() {
                let a = 1;
                let b = {
                    let a = 10;
                    a + 1
                };
                a + b
            }
        ";
        assert_eq!(value(source), 12);
        assert_eq!(value("fn main() { let a; a = 4; a = a * a; a }"), 16);
    }

    #[test]
    fn loops() {
        let source = "
            fn main() {
                let i = 5;
                let sum = 0;
                while i {
                    sum = sum + i;
                    i = i - 1;
                }
                sum
            }
        ";
        assert_eq!(value(source), 15);
    }

    #[test]
    fn early_return() {
        assert_eq!(value("fn main() { let x = 3; if x { return 7; } 9 }"), 7);
        assert_eq!(value("fn main() { return 1 + 1; }"), 2);
    }

    #[test]
    fn globals_are_shared() {
        let source = "
            let counter = 40;
            fn bump() { counter = counter + 1; counter }
            fn main() { bump(); bump() }
        ";
        assert_eq!(value(source), 42);
    }

    #[test]
    fn print_output() {
        let execution = run("fn main() { print(1); print(2 + 3); 0 }");
        assert_eq!(execution.output, [1, 5]);
        assert_eq!(execution.value, 0);
    }

    #[test]
    fn main_without_result_returns_zero() {
        assert_eq!(value("fn main() { let a = 3; }"), 0);
    }

    #[test]
    fn errors_are_merged_by_line() {
        let source = "fn main() {\n  let a = ;\n  b\n}";
        let compilation = compile("test.ct", source).expect("module verifies");
        assert!(compilation.has_errors());

        let labels: Vec<_> = compilation
            .diagnostics()
            .iter()
            .map(|reported| (reported.label(), reported.loc().line))
            .collect();
        assert_eq!(labels, [("Syntax Error", 2), ("Codegen Error", 3)]);
        assert!(matches!(compilation.check(), Err(CoatError::SyntaxError(_))));
        assert!(matches!(compilation.run(100), Err(CoatError::SyntaxError(_))));
    }

    #[test]
    fn warnings_do_not_block_running() {
        let compilation = compile("test.ct", "fn main() { let b = if 0 { 2 }; b }").expect("module verifies");
        assert!(!compilation.has_errors());
        assert_eq!(compilation.warnings.len(), 1);
        assert!(matches!(compilation.run(DEFAULT_MAX_STEPS), Ok(Execution { value: 0, .. })));
    }

    #[test]
    fn runtime_errors() {
        let compilation = compile("test.ct", "fn main() { while 1 { } 0 }").expect("module verifies");
        assert!(matches!(
            compilation.run(1000),
            Err(CoatError::RuntimeError(RuntimeError::StepLimit { limit: 1000 }))
        ));

        let compilation = compile("test.ct", "fn f() { 1 }").expect("module verifies");
        assert!(matches!(
            compilation.run(1000),
            Err(CoatError::RuntimeError(RuntimeError::UnknownFunction { .. }))
        ));
    }

    #[test]
    fn deterministic_output() {
        let source = "let g = 3;\nfn main() { let a = g; if a { a * 2 } else { print(a) } }";
        let first = compile("test.ct", source).expect("module verifies");
        let second = compile("test.ct", source).expect("module verifies");
        assert_eq!(first.module.to_string(), second.module.to_string());
        assert_eq!(first.ast.to_json(), second.ast.to_json());
    }
}
