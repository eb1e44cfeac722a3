use miette::Diagnostic;
use thiserror::Error;

use crate::backend::ir::{FuncId, Function, InstKind, IntOp, Module, Value};

pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;
const MAX_DEPTH: usize = 512;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("division by zero in '{function}'")]
    #[diagnostic(code(run::division_by_zero))]
    DivisionByZero { function: String },

    #[error("no function named '{name}'")]
    #[diagnostic(code(run::unknown_function))]
    UnknownFunction { name: String },

    #[error("'{name}' is declared but never defined")]
    #[diagnostic(
        code(run::unresolved_external),
        help("the only host function is print(x)")
    )]
    UnresolvedExternal { name: String },

    #[error("execution did not finish within {limit} steps")]
    #[diagnostic(code(run::step_limit))]
    StepLimit { limit: u64 },

    #[error("call stack exceeded {depth} frames")]
    #[diagnostic(code(run::stack_overflow))]
    StackOverflow { depth: usize },

    #[error("'{name}' takes {expected} argument(s), got {got}")]
    #[diagnostic(code(run::argument_count))]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Executes functions of a verified module. Arithmetic wraps at 64 bits.
#[derive(Debug)]
pub struct Interpreter<'m> {
    module: &'m Module,
    globals: Vec<u64>,
    output: Vec<u64>,
    steps: u64,
    max_steps: u64,
    depth: usize,
}

struct Frame {
    values: Vec<u64>,
    /// Backing storage of each alloca, indexed like `values`.
    memory: Vec<u64>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Interpreter {
            module,
            globals: module.globals.iter().map(|global| global.init).collect(),
            output: vec![],
            steps: 0,
            max_steps: DEFAULT_MAX_STEPS,
            depth: 0,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Every value passed to `print` so far.
    pub fn output(&self) -> &[u64] {
        &self.output
    }

    pub fn call(&mut self, name: &str, args: &[u64]) -> Result<u64, RuntimeError> {
        let id = self
            .module
            .function_id(name)
            .ok_or_else(|| RuntimeError::UnknownFunction { name: name.into() })?;
        self.invoke(id, args)
    }

    fn invoke(&mut self, id: FuncId, args: &[u64]) -> Result<u64, RuntimeError> {
        let module = self.module;
        let function = &module.functions[id.0];
        if function.params.len() != args.len() {
            return Err(RuntimeError::ArgumentCount {
                name: function.name.clone(),
                expected: function.params.len(),
                got: args.len(),
            });
        }

        if function.is_declaration() {
            return self.host(function, args);
        }

        if self.depth >= MAX_DEPTH {
            return Err(RuntimeError::StackOverflow { depth: MAX_DEPTH });
        }
        self.depth += 1;
        let result = self.run(function, args);
        self.depth -= 1;
        result
    }

    fn host(&mut self, function: &Function, args: &[u64]) -> Result<u64, RuntimeError> {
        match (function.name.as_str(), args) {
            ("print", &[value]) => {
                self.output.push(value);
                Ok(value)
            }
            _ => Err(RuntimeError::UnresolvedExternal {
                name: function.name.clone(),
            }),
        }
    }

    fn run(&mut self, function: &'m Function, args: &[u64]) -> Result<u64, RuntimeError> {
        let mut frame = Frame {
            values: vec![0; function.value_names.len()],
            memory: vec![0; function.value_names.len()],
        };
        let Some(mut block) = function.entry() else {
            return Err(RuntimeError::UnresolvedExternal {
                name: function.name.clone(),
            });
        };

        loop {
            let mut next = None;
            for inst in &function.blocks[block].insts {
                self.tick()?;
                let id = inst.id.0;
                match &inst.kind {
                    InstKind::Alloca => frame.memory[id] = 0,
                    InstKind::Load(ptr) => {
                        frame.values[id] = *slot(&mut self.globals, &mut frame.memory, *ptr);
                    }
                    InstKind::Store { value, ptr } => {
                        let value = read(&frame, args, *value);
                        *slot(&mut self.globals, &mut frame.memory, *ptr) = value;
                    }
                    InstKind::Int { op, lhs, rhs } => {
                        let (lhs, rhs) = (read(&frame, args, *lhs), read(&frame, args, *rhs));
                        let result = match op {
                            IntOp::Add => Some(lhs.wrapping_add(rhs)),
                            IntOp::Sub => Some(lhs.wrapping_sub(rhs)),
                            IntOp::Mul => Some(lhs.wrapping_mul(rhs)),
                            IntOp::UDiv => lhs.checked_div(rhs),
                            IntOp::URem => lhs.checked_rem(rhs),
                        };
                        frame.values[id] = result.ok_or_else(|| RuntimeError::DivisionByZero {
                            function: function.name.clone(),
                        })?;
                    }
                    InstKind::IsNonZero(value) => {
                        frame.values[id] = u64::from(read(&frame, args, *value) != 0);
                    }
                    InstKind::Call { callee, args: call_args } => {
                        let values: Vec<u64> = call_args.iter().map(|arg| read(&frame, args, *arg)).collect();
                        frame.values[id] = self.invoke(*callee, &values)?;
                    }
                    InstKind::LifetimeStart(_) | InstKind::LifetimeEnd(_) => {}
                    InstKind::Br(target) => {
                        next = Some(*target);
                        break;
                    }
                    InstKind::CondBr {
                        condition,
                        then_block,
                        else_block,
                    } => {
                        next = Some(match read(&frame, args, *condition) {
                            0 => *else_block,
                            _ => *then_block,
                        });
                        break;
                    }
                    InstKind::Ret(value) => return Ok(read(&frame, args, *value)),
                }
            }

            match next {
                Some(target) => block = target,
                None => unreachable!("verified blocks end in a terminator"),
            }
        }
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(RuntimeError::StepLimit {
                limit: self.max_steps,
            });
        }
        Ok(())
    }
}

fn read(frame: &Frame, args: &[u64], value: Value) -> u64 {
    match value {
        Value::Const(value) => value,
        Value::Param(index) => args[index],
        Value::Inst(id) => frame.values[id.0],
        Value::Global(_) => unreachable!("globals are only used as pointers"),
    }
}

fn slot<'a>(globals: &'a mut [u64], memory: &'a mut [u64], ptr: Value) -> &'a mut u64 {
    match ptr {
        Value::Global(id) => &mut globals[id.0],
        Value::Inst(id) => &mut memory[id.0],
        _ => unreachable!("verified pointers are allocas or globals"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::FunctionProto, backend::builder::ModuleBuilder, codegen::builder::IrBuilder};

    fn proto(name: &str, params: &[&str]) -> FunctionProto {
        FunctionProto::new(name, params.iter().map(|p| p.to_string()).collect())
    }

    /// `f(a, b) = a <op> b`
    fn binary(op: IntOp) -> Module {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = builder.declare_function(&proto("f", &["a", "b"]));
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let (a, b) = (builder.param(f, 0), builder.param(f, 1));
        let result = match op {
            IntOp::Add => builder.build_int_add(a, b, "r"),
            IntOp::Sub => builder.build_int_sub(a, b, "r"),
            IntOp::Mul => builder.build_int_mul(a, b, "r"),
            IntOp::UDiv => builder.build_int_unsigned_div(a, b, "r"),
            IntOp::URem => builder.build_int_unsigned_rem(a, b, "r"),
        };
        builder.build_return(result);
        builder.finish()
    }

    #[test]
    fn arithmetic_wraps() {
        let sub = binary(IntOp::Sub);
        assert_eq!(Interpreter::new(&sub).call("f", &[1, 2]), Ok(u64::MAX));

        let mul = binary(IntOp::Mul);
        assert_eq!(Interpreter::new(&mul).call("f", &[u64::MAX, 2]), Ok(u64::MAX - 1));

        let div = binary(IntOp::UDiv);
        assert_eq!(Interpreter::new(&div).call("f", &[u64::MAX, 2]), Ok(u64::MAX / 2));
    }

    #[test]
    fn division_by_zero() {
        let rem = binary(IntOp::URem);
        assert!(matches!(
            Interpreter::new(&rem).call("f", &[1, 0]),
            Err(RuntimeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn print_records_its_argument() {
        let mut builder = ModuleBuilder::new("test.ct");
        let print = builder.declare_function(&FunctionProto::external("print", 1));
        let main = builder.declare_function(&proto("main", &[]));
        let entry = builder.append_block(main, "entry");
        builder.position_at_end(entry);
        let seven = builder.const_int(7);
        let printed = builder.build_call(print, &[seven], "printed");
        builder.build_return(printed);
        let module = builder.finish();

        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.call("main", &[]), Ok(7));
        assert_eq!(interpreter.output(), [7]);
    }

    #[test]
    fn unknown_and_unresolved_functions() {
        let mut builder = ModuleBuilder::new("test.ct");
        builder.declare_function(&FunctionProto::external("missing", 0));
        let module = builder.finish();

        let mut interpreter = Interpreter::new(&module);
        assert!(matches!(interpreter.call("nope", &[]), Err(RuntimeError::UnknownFunction { .. })));
        assert!(matches!(
            interpreter.call("missing", &[]),
            Err(RuntimeError::UnresolvedExternal { .. })
        ));
        assert!(matches!(
            interpreter.call("missing", &[1]),
            Err(RuntimeError::ArgumentCount { expected: 0, got: 1, .. })
        ));
    }

    #[test]
    fn infinite_loops_hit_the_step_limit() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = builder.declare_function(&proto("f", &[]));
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        builder.build_br(entry);
        let module = builder.finish();

        let result = Interpreter::new(&module).with_max_steps(100).call("f", &[]);
        assert_eq!(result, Err(RuntimeError::StepLimit { limit: 100 }));
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = builder.declare_function(&proto("f", &[]));
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let result = builder.build_call(f, &[], "r");
        builder.build_return(result);
        let module = builder.finish();

        let result = Interpreter::new(&module).call("f", &[]);
        assert_eq!(result, Err(RuntimeError::StackOverflow { depth: MAX_DEPTH }));
    }

    #[test]
    fn globals_persist_across_calls() {
        let mut builder = ModuleBuilder::new("test.ct");
        let counter = builder.declare_global("counter", 10);
        let f = builder.declare_function(&proto("bump", &[]));
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let old = builder.build_load(counter, "old");
        let one = builder.const_int(1);
        let new = builder.build_int_add(old, one, "new");
        builder.build_store(new, counter);
        builder.build_return(new);
        let module = builder.finish();

        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.call("bump", &[]), Ok(11));
        assert_eq!(interpreter.call("bump", &[]), Ok(12));
    }
}
