use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub usize);

/// Index of an instruction within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub func: FuncId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Const(u64),
    Param(usize),
    Inst(InstId),
    Global(GlobalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Word,
    Bool,
    Ptr,
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Word => write!(f, "i64"),
            Type::Bool => write!(f, "i1"),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    C,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
    UDiv,
    URem,
}

impl IntOp {
    pub fn name(self) -> &'static str {
        match self {
            IntOp::Add => "add",
            IntOp::Sub => "sub",
            IntOp::Mul => "mul",
            IntOp::UDiv => "udiv",
            IntOp::URem => "urem",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Alloca,
    Load(Value),
    Store { value: Value, ptr: Value },
    Int { op: IntOp, lhs: Value, rhs: Value },
    IsNonZero(Value),
    Call { callee: FuncId, args: Vec<Value> },
    LifetimeStart(Value),
    LifetimeEnd(Value),
    /// Branch targets are block indices within the same function.
    Br(usize),
    CondBr {
        condition: Value,
        then_block: usize,
        else_block: usize,
    },
    Ret(Value),
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Br(_) | InstKind::CondBr { .. } | InstKind::Ret(_))
    }

    /// Type of the value the instruction defines, if it defines one.
    pub fn result_type(&self) -> Option<Type> {
        match self {
            InstKind::Alloca => Some(Type::Ptr),
            InstKind::Load(_) | InstKind::Int { .. } | InstKind::Call { .. } => Some(Type::Word),
            InstKind::IsNonZero(_) => Some(Type::Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub id: InstId,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub name: String,
    pub insts: Vec<Inst>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&InstKind> {
        self.insts.last().map(|inst| &inst.kind).filter(|kind| kind.is_terminator())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub linkage: Linkage,
    pub call_conv: CallConv,
    /// Every block ever created, laid out or not.
    pub blocks: Vec<BasicBlock>,
    /// Order in which blocks appear in the function; the first is the entry.
    pub layout: Vec<usize>,
    /// Display name of each instruction, indexed by [`InstId`].
    pub value_names: Vec<String>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry(&self) -> Option<usize> {
        self.layout.first().copied()
    }

    fn label(&self, block: usize) -> String {
        format!("{}.{}", self.blocks[block].name, block)
    }

    fn operand(&self, module: &Module, value: Value) -> String {
        match value {
            Value::Const(value) => value.to_string(),
            Value::Param(index) => format!("%{}", self.params[index]),
            Value::Inst(id) => format!("%{}", self.value_names[id.0]),
            Value::Global(id) => format!("@{}", module.globals[id.0].name),
        }
    }

    fn signature(&self) -> String {
        let linkage = match self.linkage {
            Linkage::External => "",
            Linkage::Internal => "internal ",
        };
        let call_conv = match self.call_conv {
            CallConv::C => "",
            CallConv::Fast => "fastcc ",
        };
        let params = self.params.iter().map(|param| format!("i64 %{param}")).join(", ");
        format!("{linkage}{call_conv}i64 @{}({params})", self.name)
    }

    fn render_inst(&self, module: &Module, inst: &Inst) -> String {
        let operand = |value| self.operand(module, value);
        let result = &self.value_names[inst.id.0];
        match &inst.kind {
            InstKind::Alloca => format!("%{result} = alloca i64"),
            InstKind::Load(ptr) => format!("%{result} = load i64, ptr {}", operand(*ptr)),
            InstKind::Store { value, ptr } => {
                format!("store i64 {}, ptr {}", operand(*value), operand(*ptr))
            }
            InstKind::Int { op, lhs, rhs } => format!(
                "%{result} = {} i64 {}, {}",
                op.name(),
                operand(*lhs),
                operand(*rhs)
            ),
            InstKind::IsNonZero(value) => format!("%{result} = icmp ne i64 {}, 0", operand(*value)),
            InstKind::Call { callee, args } => {
                let callee = &module.functions[callee.0];
                let call_conv = match callee.call_conv {
                    CallConv::C => "",
                    CallConv::Fast => "fastcc ",
                };
                let args = args.iter().map(|arg| format!("i64 {}", operand(*arg))).join(", ");
                format!("%{result} = call {call_conv}i64 @{}({args})", callee.name)
            }
            InstKind::LifetimeStart(ptr) => {
                format!("call void @llvm.lifetime.start.p0(i64 8, ptr {})", operand(*ptr))
            }
            InstKind::LifetimeEnd(ptr) => {
                format!("call void @llvm.lifetime.end.p0(i64 8, ptr {})", operand(*ptr))
            }
            InstKind::Br(target) => format!("br label %{}", self.label(*target)),
            InstKind::CondBr {
                condition,
                then_block,
                else_block,
            } => format!(
                "br i1 {}, label %{}, label %{}",
                operand(*condition),
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstKind::Ret(value) => format!("ret i64 {}", operand(*value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub init: u64,
}

/// One compiled file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    function_index: HashMap<String, FuncId>,
    global_index: HashMap<String, GlobalId>,
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.into(),
            ..Module::default()
        }
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len());
        self.function_index.insert(function.name.clone(), id);
        self.functions.push(function);
        id
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.globals.len());
        self.global_index.insert(global.name.clone(), id);
        self.globals.push(global);
        id
    }

    pub fn function_id(&self, name: &str) -> Option<FuncId> {
        self.function_index.get(name).copied()
    }

    pub fn global_id(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.function_id(name).map(|id| &self.functions[id.0])
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "source_filename = \"{}\"", self.name)?;

        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            writeln!(f, "@{} = global i64 {}", global.name, global.init)?;
        }

        for function in &self.functions {
            writeln!(f)?;
            if function.is_declaration() {
                writeln!(f, "declare {}", function.signature())?;
                continue;
            }

            writeln!(f, "define {} {{", function.signature())?;
            for (position, &block) in function.layout.iter().enumerate() {
                if position > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "{}:", function.label(block))?;
                for inst in &function.blocks[block].insts {
                    writeln!(f, "  {}", function.render_inst(self, inst))?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
