use miette::Diagnostic;
use thiserror::Error;

use crate::backend::ir::{Function, InstKind, Module, Type, Value};

/// A structural defect in a module. These come from bugs in whatever built
/// the module, never from the program being compiled.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block '{block}' of '{function}' is empty")]
    #[diagnostic(code(verify::empty_block))]
    EmptyBlock { function: String, block: String },

    #[error("block '{block}' of '{function}' does not end in a terminator")]
    #[diagnostic(code(verify::missing_terminator))]
    MissingTerminator { function: String, block: String },

    #[error("block '{block}' of '{function}' has a terminator before its end")]
    #[diagnostic(code(verify::early_terminator))]
    EarlyTerminator { function: String, block: String },

    #[error("'{function}' branches to block '{block}', which is not laid out")]
    #[diagnostic(code(verify::detached_block))]
    DetachedBlock { function: String, block: String },

    #[error("'{function}' has blocks but none of them are laid out")]
    #[diagnostic(code(verify::no_entry))]
    NoEntry { function: String },

    #[error("block '{block}' of '{function}' uses a value that is not defined in the function")]
    #[diagnostic(code(verify::undefined_value))]
    UndefinedValue { function: String, block: String },

    #[error("block '{block}' of '{function}' expected an operand of type {expected}, found {found}")]
    #[diagnostic(code(verify::type_mismatch))]
    TypeMismatch {
        function: String,
        block: String,
        expected: Type,
        found: Type,
    },

    #[error("lifetime marker in block '{block}' of '{function}' does not refer to an alloca")]
    #[diagnostic(code(verify::lifetime_operand))]
    LifetimeOperand { function: String, block: String },

    #[error("call to '{callee}' in '{function}' passes {got} argument(s), expected {expected}")]
    #[diagnostic(code(verify::argument_count))]
    ArgumentCount {
        function: String,
        callee: String,
        expected: usize,
        got: usize,
    },
}

pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for function in &module.functions {
        if !function.is_declaration() {
            verify_function(module, function)?;
        }
    }
    Ok(())
}

fn verify_function(module: &Module, function: &Function) -> Result<(), VerifyError> {
    if function.layout.is_empty() {
        return Err(VerifyError::NoEntry {
            function: function.name.clone(),
        });
    }

    // only instructions in laid-out blocks define anything
    let mut types = vec![None; function.value_names.len()];
    for &index in &function.layout {
        for inst in &function.blocks[index].insts {
            types[inst.id.0] = inst.kind.result_type();
        }
    }

    for &index in &function.layout {
        let block = &function.blocks[index];
        let checker = Checker {
            module,
            function,
            types: &types,
            block: &block.name,
        };

        let Some((last, body)) = block.insts.split_last() else {
            return Err(VerifyError::EmptyBlock {
                function: function.name.clone(),
                block: block.name.clone(),
            });
        };
        if !last.kind.is_terminator() {
            return Err(checker.error(|function, block| VerifyError::MissingTerminator { function, block }));
        }
        if body.iter().any(|inst| inst.kind.is_terminator()) {
            return Err(checker.error(|function, block| VerifyError::EarlyTerminator { function, block }));
        }

        for inst in &block.insts {
            checker.inst(&inst.kind)?;
        }
    }
    Ok(())
}

struct Checker<'m> {
    module: &'m Module,
    function: &'m Function,
    types: &'m [Option<Type>],
    block: &'m str,
}

impl Checker<'_> {
    fn error(&self, make: impl FnOnce(String, String) -> VerifyError) -> VerifyError {
        make(self.function.name.clone(), self.block.into())
    }

    fn type_of(&self, value: Value) -> Result<Type, VerifyError> {
        let ty = match value {
            Value::Const(_) => Some(Type::Word),
            Value::Param(index) => (index < self.function.params.len()).then_some(Type::Word),
            Value::Global(id) => (id.0 < self.module.globals.len()).then_some(Type::Ptr),
            Value::Inst(id) => self.types.get(id.0).copied().flatten(),
        };
        ty.ok_or_else(|| self.error(|function, block| VerifyError::UndefinedValue { function, block }))
    }

    fn expect(&self, value: Value, expected: Type) -> Result<(), VerifyError> {
        let found = self.type_of(value)?;
        if found != expected {
            return Err(VerifyError::TypeMismatch {
                function: self.function.name.clone(),
                block: self.block.into(),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn target(&self, block: usize) -> Result<(), VerifyError> {
        if self.function.layout.contains(&block) {
            return Ok(());
        }
        let name = self
            .function
            .blocks
            .get(block)
            .map_or_else(|| format!("#{block}"), |b| b.name.clone());
        Err(VerifyError::DetachedBlock {
            function: self.function.name.clone(),
            block: name,
        })
    }

    fn inst(&self, kind: &InstKind) -> Result<(), VerifyError> {
        match kind {
            InstKind::Alloca => Ok(()),
            InstKind::Load(ptr) => self.expect(*ptr, Type::Ptr),
            InstKind::Store { value, ptr } => {
                self.expect(*value, Type::Word)?;
                self.expect(*ptr, Type::Ptr)
            }
            InstKind::Int { lhs, rhs, .. } => {
                self.expect(*lhs, Type::Word)?;
                self.expect(*rhs, Type::Word)
            }
            InstKind::IsNonZero(value) => self.expect(*value, Type::Word),
            InstKind::Call { callee, args } => {
                let callee = &self.module.functions[callee.0];
                if callee.params.len() != args.len() {
                    return Err(VerifyError::ArgumentCount {
                        function: self.function.name.clone(),
                        callee: callee.name.clone(),
                        expected: callee.params.len(),
                        got: args.len(),
                    });
                }
                args.iter().try_for_each(|arg| self.expect(*arg, Type::Word))
            }
            InstKind::LifetimeStart(ptr) | InstKind::LifetimeEnd(ptr) => {
                let is_alloca = matches!(ptr, Value::Inst(_)) && self.type_of(*ptr)? == Type::Ptr;
                if !is_alloca {
                    return Err(self.error(|function, block| VerifyError::LifetimeOperand { function, block }));
                }
                Ok(())
            }
            InstKind::Br(target) => self.target(*target),
            InstKind::CondBr {
                condition,
                then_block,
                else_block,
            } => {
                self.expect(*condition, Type::Bool)?;
                self.target(*then_block)?;
                self.target(*else_block)
            }
            InstKind::Ret(value) => self.expect(*value, Type::Word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::FunctionProto, backend::builder::ModuleBuilder, codegen::builder::IrBuilder};

    fn function(builder: &mut ModuleBuilder, params: &[&str]) -> crate::backend::ir::FuncId {
        let params = params.iter().map(|p| p.to_string()).collect();
        builder.declare_function(&FunctionProto::new("f", params))
    }

    #[test]
    fn well_formed_function() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &["a"]);
        let entry = builder.append_block(f, "entry");
        let exit = builder.create_block(f, "exit");
        builder.position_at_end(entry);
        let slot = builder.build_alloca("a");
        builder.build_lifetime_start(slot);
        let a = builder.param(f, 0);
        builder.build_store(a, slot);
        let cond = builder.build_is_nonzero(a, "cond");
        builder.build_cond_br(cond, exit, exit);
        builder.insert_block(exit);
        builder.position_at_end(exit);
        let value = builder.build_load(slot, "value");
        builder.build_lifetime_end(slot);
        builder.build_return(value);

        assert_eq!(builder.verify(), Ok(()));
    }

    #[test]
    fn declarations_need_no_blocks() {
        let mut builder = ModuleBuilder::new("test.ct");
        function(&mut builder, &["a", "b"]);
        assert_eq!(builder.verify(), Ok(()));
    }

    #[test]
    fn unterminated_block() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &[]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        builder.build_alloca("x");
        assert!(matches!(builder.verify(), Err(VerifyError::MissingTerminator { .. })));
    }

    #[test]
    fn empty_block() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &[]);
        builder.append_block(f, "entry");
        assert!(matches!(builder.verify(), Err(VerifyError::EmptyBlock { .. })));
    }

    #[test]
    fn instructions_after_a_terminator() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &[]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let zero = builder.const_int(0);
        builder.build_return(zero);
        builder.build_return(zero);
        assert!(matches!(builder.verify(), Err(VerifyError::EarlyTerminator { .. })));
    }

    #[test]
    fn branch_to_a_detached_block() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &[]);
        let entry = builder.append_block(f, "entry");
        let nowhere = builder.create_block(f, "nowhere");
        builder.position_at_end(entry);
        builder.build_br(nowhere);
        assert!(matches!(builder.verify(), Err(VerifyError::DetachedBlock { .. })));
    }

    #[test]
    fn operand_types() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &["a"]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let a = builder.param(f, 0);
        // loading through a plain integer
        builder.build_load(a, "bad");
        builder.build_return(a);
        assert!(matches!(
            builder.verify(),
            Err(VerifyError::TypeMismatch {
                expected: Type::Ptr,
                found: Type::Word,
                ..
            })
        ));
    }

    #[test]
    fn conditions_must_be_booleans() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &["a"]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let a = builder.param(f, 0);
        builder.build_cond_br(a, entry, entry);
        assert!(matches!(builder.verify(), Err(VerifyError::TypeMismatch { .. })));
    }

    #[test]
    fn call_argument_count() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &["a"]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        let result = builder.build_call(f, &[], "call");
        builder.build_return(result);
        assert!(matches!(builder.verify(), Err(VerifyError::ArgumentCount { expected: 1, got: 0, .. })));
    }

    #[test]
    fn lifetime_markers_need_an_alloca() {
        let mut builder = ModuleBuilder::new("test.ct");
        let g = builder.declare_global("g", 0);
        let f = function(&mut builder, &[]);
        let entry = builder.append_block(f, "entry");
        builder.position_at_end(entry);
        builder.build_lifetime_start(g);
        let zero = builder.const_int(0);
        builder.build_return(zero);
        assert!(matches!(builder.verify(), Err(VerifyError::LifetimeOperand { .. })));
    }

    #[test]
    fn values_from_detached_blocks_are_undefined() {
        let mut builder = ModuleBuilder::new("test.ct");
        let f = function(&mut builder, &[]);
        let entry = builder.append_block(f, "entry");
        let detached = builder.create_block(f, "detached");
        builder.position_at_end(detached);
        let slot = builder.build_alloca("x");
        builder.position_at_end(entry);
        let value = builder.build_load(slot, "value");
        builder.build_return(value);
        assert!(matches!(builder.verify(), Err(VerifyError::UndefinedValue { .. })));
    }
}
