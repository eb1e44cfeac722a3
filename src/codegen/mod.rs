use crate::{
    ast::{Block, Located},
    codegen::{
        builder::IrBuilder,
        error::{CodegenError, CodegenWarning},
        generator::Generator,
    },
};

pub mod builder;
pub mod error;
mod generator;

/// Lowers a parsed program through `builder`.
///
/// Errors and warnings in the program are appended to `errors` and
/// `warnings`; generation carries on past them. The returned `Err` is
/// reserved for a structurally broken result, which is a compiler bug.
pub fn generate<B: IrBuilder>(
    root: &Located<Block>,
    builder: &mut B,
    errors: &mut Vec<CodegenError>,
    warnings: &mut Vec<CodegenWarning>,
) -> Result<(), B::VerifyError> {
    let mut generator = Generator::new(builder);
    generator.register_globals(&root.node);
    generator.program(&root.node);

    let (found_errors, found_warnings) = generator.end();
    errors.extend(found_errors);
    warnings.extend(found_warnings);

    builder.verify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{builder::ModuleBuilder, ir::Module, verify::VerifyError},
        lex::tokenize,
        parse::parse,
    };

    struct Output {
        module: Module,
        errors: Vec<CodegenError>,
        warnings: Vec<CodegenWarning>,
        verified: Result<(), VerifyError>,
    }

    fn generate_source(source: &str) -> Output {
        let tokens = tokenize("test.ct", source);
        let mut syntax_errors = vec![];
        let ast = parse(&tokens, &mut syntax_errors);
        assert_eq!(syntax_errors, [], "{source}");

        let mut builder = ModuleBuilder::new("test.ct");
        let mut errors = vec![];
        let mut warnings = vec![];
        let verified = generate(&ast, &mut builder, &mut errors, &mut warnings);
        Output {
            module: builder.finish(),
            errors,
            warnings,
            verified,
        }
    }

    fn clean(source: &str) -> Module {
        let output = generate_source(source);
        assert_eq!(output.errors, [], "{source}");
        assert_eq!(output.verified, Ok(()), "{source}");
        output.module
    }

    #[test]
    fn good_programs() {
        let sources = [
            "fn main() { 0 }",
            "fn main() { let a = 1; let b = a * 2; b - a }",
            "fn main() { let x = 3; x = x + 1; x }",
            "fn main() { if 1 { 2 } else { 3 } }",
            "fn main() { (if 1 { 2 } else { 3 }) }",
            "fn main() { let i = 10; while i { i = i - 1; } i }",
            "fn main() { return 5; 6 }",
            "fn main() { { { 1 } } }",
            "fn f(a, b) { a % b } fn main() { f(7, 4) }",
            "let g = 2; fn main() { g = g + 1; g }",
            "fn main() { print(1); print(2) }",
        ];
        for source in sources {
            clean(source);
        }
    }

    #[test]
    fn forward_references() {
        let module = clean("fn a() { b(1) }\nfn b(x) { x + 1 }");
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(module.functions.iter().all(|f| !f.is_declaration()));
    }

    #[test]
    fn functions_start_with_a_declarations_block() {
        let module = clean("fn f(a) { let b = a; b }");
        let Some(function) = module.function("f") else {
            panic!("f was not generated");
        };
        let entry = function.entry().map(|index| function.blocks[index].name.as_str());
        assert_eq!(entry, Some("declarations"));

        let text = module.to_string();
        assert!(text.contains("define i64 @f(i64 %a)"));
        assert!(text.contains("call void @llvm.lifetime.start.p0(i64 8, ptr %b."));
        assert!(text.contains("call void @llvm.lifetime.end.p0(i64 8, ptr %b."));
    }

    #[test]
    fn allocas_live_in_the_declarations_block() {
        let module = clean("fn f() { let a = 1; if a { let b = 2; b } else { 0 } }");
        let Some(function) = module.function("f") else {
            panic!("f was not generated");
        };
        for (index, block) in function.blocks.iter().enumerate() {
            let allocas = block
                .insts
                .iter()
                .filter(|inst| inst.kind == crate::backend::ir::InstKind::Alloca)
                .count();
            if block.name != "declarations" {
                assert_eq!(allocas, 0, "alloca in block {index} ({})", block.name);
            }
        }
    }

    #[test]
    fn calls_to_unknown_functions_declare_them() {
        let module = clean("fn main() { print(1) }");
        let print = module.function("print");
        assert!(print.is_some_and(|f| f.is_declaration() && f.params.len() == 1));
        assert!(module.to_string().contains("declare i64 @print(i64 %arg0)"));
    }

    #[test]
    fn undeclared_variables() {
        let output = generate_source("fn main() { let a = 1; a + b }");
        assert!(matches!(
            &output.errors[..],
            [CodegenError::UndeclaredVariable { identifier, .. }] if identifier == "b"
        ));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn scopes_end_with_their_block() {
        let output = generate_source("fn main() { if 1 { let inner = 2; inner } else { 0 }; inner }");
        assert!(matches!(&output.errors[..], [CodegenError::UndeclaredVariable { .. }]));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn redefinition() {
        let output = generate_source("fn f() { 1 }\nfn f() { 2 }");
        assert!(matches!(&output.errors[..], [CodegenError::Redefinition { .. }]));
        assert_eq!(output.errors[0].loc().line, 2);
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn arity_mismatch() {
        let output = generate_source("fn f(a) { a }\nfn main() { f(1, 2) }");
        assert!(matches!(
            &output.errors[..],
            [CodegenError::ArityMismatch { expected: 1, got: 2, .. }]
        ));

        let output = generate_source("fn main() { print(1); print(1, 2) }");
        assert!(matches!(&output.errors[..], [CodegenError::ArityMismatch { .. }]));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn invalid_assignment_target() {
        let output = generate_source("fn main() { let a = 1; a + 1 = 2; a }");
        assert!(matches!(&output.errors[..], [CodegenError::InvalidAssignmentTarget { .. }]));
    }

    #[test]
    fn values_are_required() {
        let output = generate_source("fn main() { let a = 1; a = while 0 { }; a }");
        assert!(matches!(&output.errors[..], [CodegenError::MissingValue { kind: "while", .. }]));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn loop_bodies_cannot_produce_values() {
        let output = generate_source("fn main() { let i = 1; while i { i = 0; 5 } i }");
        assert!(matches!(&output.errors[..], [CodegenError::LoopValue { .. }]));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn errors_in_loop_conditions_keep_the_structure_valid() {
        let output = generate_source("fn main() { while nope { } 0 }");
        assert!(matches!(&output.errors[..], [CodegenError::UndeclaredVariable { .. }]));
        assert_eq!(output.verified, Ok(()));
    }

    #[test]
    fn branch_mismatch_is_a_warning() {
        let output = generate_source("fn main() { let a = 1; let b = if a { 2 }; b }");
        assert_eq!(output.errors, []);
        assert!(matches!(&output.warnings[..], [CodegenWarning::BranchMismatch { .. }]));
        assert_eq!(output.verified, Ok(()));

        let output = generate_source("fn main() { if 1 { 2 } else { 3 } }");
        assert_eq!(output.warnings, []);
    }

    #[test]
    fn globals() {
        let module = clean("let a; let b = 0x10; let c = -1; let d = 2 * 3 + 1;");
        let inits: Vec<_> = module.globals.iter().map(|g| (g.name.as_str(), g.init)).collect();
        assert_eq!(inits, [("a", 0), ("b", 16), ("c", u64::MAX), ("d", 7)]);

        let output = generate_source("let a = 1; let a = 2;");
        assert!(matches!(&output.errors[..], [CodegenError::DuplicateGlobal { .. }]));

        let output = generate_source("let a = f(); let b = 1 / 0;");
        assert!(matches!(
            &output.errors[..],
            [CodegenError::NonConstantGlobal { .. }, CodegenError::NonConstantGlobal { .. }]
        ));
    }

    #[test]
    fn statements_after_return_get_their_own_block() {
        let module = clean("fn main() { return 1; 2 }");
        let Some(function) = module.function("main") else {
            panic!("main was not generated");
        };
        assert!(function.layout.iter().any(|&b| function.blocks[b].name == "after_return"));
    }

    #[test]
    fn for_loops_lower_like_while() {
        use crate::{
            ast::{Expression, Statement},
            lex::Location,
        };
        use miette::SourceSpan;

        let loc = Location {
            file: "test.ct".into(),
            line: 1,
            column: 1,
            span: SourceSpan::new(0.into(), 0),
        };
        let expr = |node| Located::new(node, loc.clone());
        let var = |name: &str| expr(Expression::VarRef(name.into()));

        // for (let i = 3; i; i = i - 1) { }
        let for_loop = expr(Expression::For {
            init: Box::new(Located::new(
                Statement::DeclAssignment {
                    name: "i".into(),
                    value: Some(expr(Expression::Constant(3))),
                },
                loc.clone(),
            )),
            condition: Box::new(var("i")),
            update: Box::new(Located::new(
                Statement::Assignment {
                    target: var("i"),
                    value: expr(Expression::Binary {
                        op: crate::ast::BinaryOp::Subtract,
                        lhs: Box::new(var("i")),
                        rhs: Box::new(expr(Expression::Constant(1))),
                    }),
                },
                loc.clone(),
            )),
            body: Box::new(expr(Expression::Block(Block {
                statements: vec![],
                result: None,
                is_toplevel: false,
            }))),
        });
        let main = Located::new(
            Statement::FunctionDef {
                proto: crate::ast::FunctionProto::new("main", vec![]),
                body: Located::new(
                    Block {
                        statements: vec![Located::new(Statement::Expression(for_loop), loc.clone())],
                        result: None,
                        is_toplevel: false,
                    },
                    loc.clone(),
                ),
            },
            loc.clone(),
        );
        let program = Located::new(
            Block {
                statements: vec![main],
                result: None,
                is_toplevel: true,
            },
            loc,
        );

        let mut builder = ModuleBuilder::new("test.ct");
        let (mut errors, mut warnings) = (vec![], vec![]);
        let verified = generate(&program, &mut builder, &mut errors, &mut warnings);
        assert_eq!(errors, []);
        assert_eq!(verified, Ok(()));

        let module = builder.finish();
        let Some(function) = module.function("main") else {
            panic!("main was not generated");
        };
        assert!(function.layout.iter().any(|&b| function.blocks[b].name == "for_cond"));
        assert!(function.layout.iter().any(|&b| function.blocks[b].name == "post_for"));
    }
}
