use crate::{
    ast::FunctionProto,
    backend::{
        ir::{
            BasicBlock, BlockRef, CallConv, FuncId, Function, Global, Inst, InstId, InstKind, IntOp,
            Linkage, Module, Value,
        },
        verify::{verify_module, VerifyError},
    },
    codegen::builder::IrBuilder,
};

/// Builds a [`Module`] in memory.
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
    position: Option<BlockRef>,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            module: Module::new(name),
            position: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    fn push(&mut self, name: &str, kind: InstKind) -> Value {
        let Some(position) = self.position else {
            panic!("instruction built without an insertion point");
        };
        let function = &mut self.module.functions[position.func.0];
        let id = InstId(function.value_names.len());
        function.value_names.push(format!("{name}.{}", id.0));
        function.blocks[position.index].insts.push(Inst { id, kind });
        Value::Inst(id)
    }

    fn int(&mut self, op: IntOp, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(name, InstKind::Int { op, lhs, rhs })
    }
}

impl IrBuilder for ModuleBuilder {
    type Value = Value;
    type Function = FuncId;
    type Block = BlockRef;
    type VerifyError = VerifyError;

    fn declare_function(&mut self, proto: &FunctionProto) -> FuncId {
        self.module.add_function(Function {
            name: proto.name.clone(),
            params: proto.params.clone(),
            linkage: if proto.is_extern {
                Linkage::External
            } else {
                Linkage::Internal
            },
            call_conv: if proto.is_fastcc { CallConv::Fast } else { CallConv::C },
            blocks: vec![],
            layout: vec![],
            value_names: vec![],
        })
    }

    fn get_function(&self, name: &str) -> Option<FuncId> {
        self.module.function_id(name)
    }

    fn param_count(&self, function: FuncId) -> usize {
        self.module.functions[function.0].params.len()
    }

    fn has_body(&self, function: FuncId) -> bool {
        !self.module.functions[function.0].is_declaration()
    }

    fn param(&self, _function: FuncId, index: usize) -> Value {
        Value::Param(index)
    }

    fn declare_global(&mut self, name: &str, init: u64) -> Value {
        Value::Global(self.module.add_global(Global {
            name: name.into(),
            init,
        }))
    }

    fn get_global(&self, name: &str) -> Option<Value> {
        self.module.global_id(name).map(Value::Global)
    }

    fn create_block(&mut self, function: FuncId, name: &str) -> BlockRef {
        let blocks = &mut self.module.functions[function.0].blocks;
        blocks.push(BasicBlock {
            name: name.into(),
            insts: vec![],
        });
        BlockRef {
            func: function,
            index: blocks.len() - 1,
        }
    }

    fn insert_block(&mut self, block: BlockRef) {
        self.module.functions[block.func.0].layout.push(block.index);
    }

    fn position_at_end(&mut self, block: BlockRef) {
        self.position = Some(block);
    }

    fn insert_point(&self) -> Option<BlockRef> {
        self.position
    }

    fn is_terminated(&self, block: BlockRef) -> bool {
        self.module.functions[block.func.0].blocks[block.index]
            .terminator()
            .is_some()
    }

    fn const_int(&mut self, value: u64) -> Value {
        Value::Const(value)
    }

    fn build_alloca(&mut self, name: &str) -> Value {
        self.push(name, InstKind::Alloca)
    }

    fn build_load(&mut self, ptr: Value, name: &str) -> Value {
        self.push(name, InstKind::Load(ptr))
    }

    fn build_store(&mut self, value: Value, ptr: Value) {
        self.push("", InstKind::Store { value, ptr });
    }

    fn build_int_add(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.int(IntOp::Add, lhs, rhs, name)
    }

    fn build_int_sub(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.int(IntOp::Sub, lhs, rhs, name)
    }

    fn build_int_mul(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.int(IntOp::Mul, lhs, rhs, name)
    }

    fn build_int_unsigned_div(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.int(IntOp::UDiv, lhs, rhs, name)
    }

    fn build_int_unsigned_rem(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.int(IntOp::URem, lhs, rhs, name)
    }

    fn build_is_nonzero(&mut self, value: Value, name: &str) -> Value {
        self.push(name, InstKind::IsNonZero(value))
    }

    fn build_br(&mut self, target: BlockRef) {
        self.push("", InstKind::Br(target.index));
    }

    fn build_cond_br(&mut self, condition: Value, then_block: BlockRef, else_block: BlockRef) {
        self.push(
            "",
            InstKind::CondBr {
                condition,
                then_block: then_block.index,
                else_block: else_block.index,
            },
        );
    }

    fn build_call(&mut self, function: FuncId, args: &[Value], name: &str) -> Value {
        self.push(
            name,
            InstKind::Call {
                callee: function,
                args: args.to_vec(),
            },
        )
    }

    fn build_return(&mut self, value: Value) {
        self.push("", InstKind::Ret(value));
    }

    fn build_lifetime_start(&mut self, ptr: Value) {
        self.push("", InstKind::LifetimeStart(ptr));
    }

    fn build_lifetime_end(&mut self, ptr: Value) {
        self.push("", InstKind::LifetimeEnd(ptr));
    }

    fn verify(&self) -> Result<(), VerifyError> {
        verify_module(&self.module)
    }
}
