use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use coatc::{backend::interp::DEFAULT_MAX_STEPS, compile, Compilation};
use miette::{IntoDiagnostic, NamedSource, Report, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// One line per token
    Tokens,
    /// The syntax tree as JSON
    Ast,
    /// The generated module
    Ir,
}

/// coat compiler
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source files, each compiled on its own
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// What to print for each file
    #[arg(long, value_enum, default_value_t = Emit::Ir)]
    emit: Emit,

    /// Output file, or "-" for stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run `main` after compiling and print its output
    #[arg(long)]
    run: bool,

    /// Instruction budget for --run
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: u64,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut out = String::new();
    let mut failed = false;
    for input in &args.inputs {
        let source = fs::read_to_string(input).into_diagnostic()?;
        let file = input.display().to_string();
        failed |= !process(&args, &file, &source, &mut out)?;
    }

    match args.output.as_deref() {
        Some(path) if path != Path::new("-") => fs::write(path, out).into_diagnostic()?,
        _ => print!("{out}"),
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Compiles one file, appending the requested output. Returns whether the
/// file came through without errors.
fn process(args: &Args, file: &str, source: &str, out: &mut String) -> Result<bool> {
    let compilation = match compile(file, source) {
        Ok(compilation) => compilation,
        Err(err) => return Err(Report::new(err).with_source_code(named(file, source))),
    };

    match args.emit {
        Emit::Tokens => {
            for token in &compilation.tokens {
                writeln!(out, "{token}").into_diagnostic()?;
            }
        }
        Emit::Ast => writeln!(out, "{:#}", compilation.ast.to_json()).into_diagnostic()?,
        Emit::Ir => write!(out, "{}", compilation.module).into_diagnostic()?,
    }

    report(&compilation, file, source);
    if compilation.has_errors() {
        return Ok(false);
    }

    if args.run {
        match compilation.run(args.max_steps) {
            Ok(execution) => {
                for value in execution.output {
                    writeln!(out, "{value}").into_diagnostic()?;
                }
                writeln!(out, "{file}: main returned {}", execution.value).into_diagnostic()?;
            }
            Err(err) => {
                eprintln!("{:?}", Report::new(err));
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn report(compilation: &Compilation, file: &str, source: &str) {
    for diagnostic in compilation.diagnostics() {
        eprintln!("{}: {}", diagnostic.label(), diagnostic.location());
        eprintln!("{:?}", diagnostic.report().with_source_code(named(file, source)));
    }
}

fn named(file: &str, source: &str) -> NamedSource<String> {
    NamedSource::new(file, source.to_string())
}
