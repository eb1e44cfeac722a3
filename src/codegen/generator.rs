use std::collections::HashMap;

use crate::{
    ast::{BinaryOp, Block, Expr, Expression, FunctionProto, Located, Statement, Stmt, UnaryOp},
    codegen::{
        builder::IrBuilder,
        error::{CodegenError, CodegenWarning},
    },
    lex::Location,
};

type CResult<T> = std::result::Result<T, CodegenError>;

/// Everything visible at one point of a function body.
///
/// Entering a block clones the scope and leaving it restores the clone, so
/// inner declarations shadow without ever touching the parent's table.
#[derive(Debug, Clone)]
struct Scope<V, K> {
    values: HashMap<String, V>,
    /// Block holding every alloca of the current function.
    declarations: Option<K>,
    /// Block collecting lifetime starts for the innermost block.
    lifetimes: Option<K>,
    /// Slots whose lifetime ends with the innermost block.
    declared: Vec<V>,
}

impl<V, K> Scope<V, K> {
    fn new(values: HashMap<String, V>) -> Self {
        Scope {
            values,
            declarations: None,
            lifetimes: None,
            declared: vec![],
        }
    }
}

pub struct Generator<'b, B: IrBuilder> {
    builder: &'b mut B,
    scope: Scope<B::Value, B::Block>,
    globals: HashMap<String, B::Value>,
    function: Option<B::Function>,
    errors: Vec<CodegenError>,
    warnings: Vec<CodegenWarning>,
}

impl<'b, B: IrBuilder> Generator<'b, B> {
    pub fn new(builder: &'b mut B) -> Self {
        Generator {
            builder,
            scope: Scope::new(HashMap::new()),
            globals: HashMap::new(),
            function: None,
            errors: vec![],
            warnings: vec![],
        }
    }

    pub fn end(self) -> (Vec<CodegenError>, Vec<CodegenWarning>) {
        (self.errors, self.warnings)
    }

    /// Declares every function and global of the program up front, so bodies
    /// may refer to anything defined later in the file.
    pub fn register_globals(&mut self, program: &Block) {
        for statement in &program.statements {
            match &statement.node {
                Statement::FunctionDef { proto, .. } => {
                    if self.builder.get_function(&proto.name).is_none() {
                        self.builder.declare_function(proto);
                    }
                }
                Statement::DeclAssignment { name, value } => {
                    if let Err(err) = self.global(name, value.as_ref(), &statement.loc) {
                        self.errors.push(err);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn program(&mut self, program: &Block) {
        for statement in &program.statements {
            let outcome = match &statement.node {
                Statement::FunctionDef { proto, body } => self.function(proto, body, &statement.loc),
                Statement::DeclAssignment { .. } => Ok(()),
                other => Err(CodegenError::MisplacedStatement {
                    kind: other.kind(),
                    loc: statement.loc.clone(),
                    span: statement.loc.span,
                }),
            };
            if let Err(err) = outcome {
                self.errors.push(err);
            }
        }
    }

    fn global(&mut self, name: &str, value: Option<&Expr>, loc: &Location) -> CResult<()> {
        if self.globals.contains_key(name) {
            return Err(CodegenError::DuplicateGlobal {
                identifier: name.into(),
                loc: loc.clone(),
                span: loc.span,
            });
        }

        let init = match value {
            Some(expr) => constant_value(expr).ok_or_else(|| CodegenError::NonConstantGlobal {
                identifier: name.into(),
                loc: expr.loc.clone(),
                span: expr.loc.span,
            })?,
            None => 0,
        };

        let global = self.builder.declare_global(name, init);
        self.globals.insert(name.into(), global);
        Ok(())
    }

    fn function(&mut self, proto: &FunctionProto, body: &Located<Block>, loc: &Location) -> CResult<()> {
        let Some(function) = self.builder.get_function(&proto.name) else {
            unreachable!("prototype of '{}' was not registered", proto.name);
        };
        if self.builder.has_body(function) {
            return Err(CodegenError::Redefinition {
                function: proto.name.clone(),
                loc: loc.clone(),
                span: loc.span,
            });
        }

        let declarations = self.builder.append_block(function, "declarations");
        let entry = self.builder.append_block(function, "entry");
        self.function = Some(function);

        // parameters live in stack slots so they can be assigned like locals
        let mut values = self.globals.clone();
        self.builder.position_at_end(declarations);
        for (index, name) in proto.params.iter().enumerate() {
            let slot = self.builder.build_alloca(name);
            let param = self.builder.param(function, index);
            self.builder.build_store(param, slot);
            values.insert(name.clone(), slot);
        }
        self.scope = Scope {
            declarations: Some(declarations),
            ..Scope::new(values)
        };

        self.builder.position_at_end(entry);
        let result = self.block(&body.node);
        if !self.is_terminated() {
            let value = match result {
                Some(value) => value,
                None => self.builder.const_int(0),
            };
            self.builder.build_return(value);
        }

        self.builder.position_at_end(declarations);
        self.builder.build_br(entry);

        self.function = None;
        self.scope = Scope::new(HashMap::new());
        Ok(())
    }

    /// Emits a nested block. Statement errors are recorded and skipped, so a
    /// block always completes.
    fn block(&mut self, block: &Block) -> Option<B::Value> {
        let function = self.current_function();
        let lifetimes_start = self.builder.append_block(function, "block_lifetimes_start");
        let entry = self.builder.append_block(function, "block_entry");
        let lifetimes_end = self.builder.create_block(function, "block_lifetimes_end");
        self.builder.build_br(lifetimes_start);

        let parent = self.scope.clone();
        self.scope.lifetimes = Some(lifetimes_start);
        self.scope.declared.clear();

        self.builder.position_at_end(entry);
        for statement in &block.statements {
            if let Err(err) = self.statement(statement) {
                self.errors.push(err);
            }
        }

        let mut result = None;
        if let Some(expr) = &block.result {
            match self.expression(expr) {
                Ok(value) => result = value,
                Err(err) => self.errors.push(err),
            }
        }

        let tail = self.current_block();
        self.builder.position_at_end(lifetimes_start);
        self.builder.build_br(entry);
        self.builder.position_at_end(tail);
        self.branch_to(lifetimes_end);

        self.builder.insert_block(lifetimes_end);
        self.builder.position_at_end(lifetimes_end);
        for &slot in &self.scope.declared {
            self.builder.build_lifetime_end(slot);
        }

        self.scope = parent;
        result
    }

    fn statement(&mut self, statement: &Stmt) -> CResult<()> {
        match &statement.node {
            Statement::DeclAssignment { name, value } => self.declaration(name, value.as_ref()),
            Statement::Assignment { target, value } => self.assignment(target, value),
            Statement::Return(value) => self.return_statement(value),
            Statement::Expression(expr) => self.expression(expr).map(|_| ()),
            other => Err(CodegenError::MisplacedStatement {
                kind: other.kind(),
                loc: statement.loc.clone(),
                span: statement.loc.span,
            }),
        }
    }

    fn declaration(&mut self, name: &str, value: Option<&Expr>) -> CResult<()> {
        // the initializer still sees any outer binding of the same name
        let init = match value {
            Some(expr) => self.value(expr)?,
            None => self.builder.const_int(0),
        };

        let slot = self.alloca(name);
        if let Some(lifetimes) = self.scope.lifetimes {
            let current = self.current_block();
            self.builder.position_at_end(lifetimes);
            self.builder.build_lifetime_start(slot);
            self.builder.position_at_end(current);
            self.scope.declared.push(slot);
        }
        self.builder.build_store(init, slot);
        self.scope.values.insert(name.into(), slot);
        Ok(())
    }

    fn assignment(&mut self, target: &Expr, value: &Expr) -> CResult<()> {
        let Expression::VarRef(name) = &target.node else {
            return Err(CodegenError::InvalidAssignmentTarget {
                loc: target.loc.clone(),
                span: target.loc.span,
            });
        };

        let slot = self.lookup(name, &target.loc)?;
        let value = self.value(value)?;
        self.builder.build_store(value, slot);
        Ok(())
    }

    fn return_statement(&mut self, value: &Expr) -> CResult<()> {
        let value = self.value(value)?;
        self.builder.build_return(value);

        // anything after the return still needs somewhere to go
        let function = self.current_function();
        let after = self.builder.append_block(function, "after_return");
        self.builder.position_at_end(after);
        Ok(())
    }

    fn expression(&mut self, expr: &Expr) -> CResult<Option<B::Value>> {
        let value = match &expr.node {
            Expression::Constant(value) => self.builder.const_int(*value),
            Expression::VarRef(name) => {
                let slot = self.lookup(name, &expr.loc)?;
                self.builder.build_load(slot, name)
            }
            Expression::Unary {
                op: UnaryOp::Negate,
                operand,
            } => {
                let operand = self.value(operand)?;
                self.builder.build_int_neg(operand, "negtmp")
            }
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                match op {
                    BinaryOp::Add => self.builder.build_int_add(lhs, rhs, "addtmp"),
                    BinaryOp::Subtract => self.builder.build_int_sub(lhs, rhs, "subtmp"),
                    BinaryOp::Multiply => self.builder.build_int_mul(lhs, rhs, "multmp"),
                    BinaryOp::Divide => self.builder.build_int_unsigned_div(lhs, rhs, "divtmp"),
                    BinaryOp::Modulo => self.builder.build_int_unsigned_rem(lhs, rhs, "modtmp"),
                }
            }
            Expression::Call { name, args } => self.call(name, args, &expr.loc)?,
            Expression::Block(block) => return Ok(self.block(block)),
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => self.if_expression(condition, then_branch, else_branch.as_deref(), &expr.loc)?,
            Expression::While { condition, body } => {
                self.while_loop(condition, body)?;
                return Ok(None);
            }
            Expression::For {
                init,
                condition,
                update,
                body,
            } => {
                let parent = self.scope.clone();
                self.scope.lifetimes = None;
                let outcome = self.for_loop(init, condition, update, body);
                self.scope = parent;
                outcome?;
                return Ok(None);
            }
        };
        Ok(Some(value))
    }

    /// Like [`Generator::expression`], but the expression must produce a value.
    fn value(&mut self, expr: &Expr) -> CResult<B::Value> {
        self.expression(expr)?
            .ok_or_else(|| CodegenError::MissingValue {
                kind: expr.node.kind(),
                loc: expr.loc.clone(),
                span: expr.loc.span,
            })
    }

    fn call(&mut self, name: &str, args: &[Expr], loc: &Location) -> CResult<B::Value> {
        let function = match self.builder.get_function(name) {
            Some(function) => function,
            None => self
                .builder
                .declare_function(&FunctionProto::external(name, args.len())),
        };

        let expected = self.builder.param_count(function);
        if expected != args.len() {
            return Err(CodegenError::ArityMismatch {
                function: name.into(),
                expected,
                got: args.len(),
                loc: loc.clone(),
                span: loc.span,
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.value(arg)?);
        }
        Ok(self.builder.build_call(function, &values, "calltmp"))
    }

    fn if_expression(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        loc: &Location,
    ) -> CResult<B::Value> {
        let condition = self.value(condition)?;
        let condition = self.builder.build_is_nonzero(condition, "ifcond");

        let function = self.current_function();
        let result = self.alloca("if_result");
        let then_block = self.builder.append_block(function, "cond_true");
        let else_block = self.builder.create_block(function, "cond_false");
        let post = self.builder.create_block(function, "post_if");
        self.builder.build_cond_br(condition, then_block, else_block);

        self.builder.position_at_end(then_block);
        let then_value = self.branch(Some(then_branch), result, post);

        self.builder.insert_block(else_block);
        self.builder.position_at_end(else_block);
        let else_value = self.branch(else_branch, result, post);

        if then_value != else_value {
            self.warnings.push(CodegenWarning::BranchMismatch {
                loc: loc.clone(),
                span: loc.span,
            });
        }

        self.builder.insert_block(post);
        self.builder.position_at_end(post);
        Ok(self.builder.build_load(result, "iftmp"))
    }

    /// Emits one arm of an if, storing its value (or 0) into `slot`. Returns
    /// whether the arm produced a value.
    fn branch(&mut self, branch: Option<&Expr>, slot: B::Value, post: B::Block) -> bool {
        let value = match branch.map(|branch| self.expression(branch)) {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                self.errors.push(err);
                None
            }
            None => None,
        };

        if !self.is_terminated() {
            let stored = match value {
                Some(value) => value,
                None => self.builder.const_int(0),
            };
            self.builder.build_store(stored, slot);
            self.builder.build_br(post);
        }
        value.is_some()
    }

    fn while_loop(&mut self, condition: &Expr, body: &Expr) -> CResult<()> {
        let function = self.current_function();
        let cond_block = self.builder.append_block(function, "cond_block");
        let body_block = self.builder.create_block(function, "loop_body");
        let post = self.builder.create_block(function, "post_while");
        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        self.loop_condition(condition, body_block, post)?;

        self.builder.insert_block(body_block);
        self.builder.position_at_end(body_block);
        let body_value = self.expression(body);
        self.branch_to(cond_block);

        self.builder.insert_block(post);
        self.builder.position_at_end(post);
        Self::no_loop_value(body_value?, body)
    }

    fn for_loop(&mut self, init: &Stmt, condition: &Expr, update: &Stmt, body: &Expr) -> CResult<()> {
        self.statement(init)?;

        let function = self.current_function();
        let cond_block = self.builder.append_block(function, "for_cond");
        let body_block = self.builder.create_block(function, "for_body");
        let post = self.builder.create_block(function, "post_for");
        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        self.loop_condition(condition, body_block, post)?;

        self.builder.insert_block(body_block);
        self.builder.position_at_end(body_block);
        let body_value = self.expression(body);
        if !self.is_terminated() {
            if let Err(err) = self.statement(update) {
                self.errors.push(err);
            }
        }
        self.branch_to(cond_block);

        self.builder.insert_block(post);
        self.builder.position_at_end(post);
        Self::no_loop_value(body_value?, body)
    }

    /// Branches into the loop body or out to `post`. On error the loop is
    /// closed off so the surrounding code stays well formed.
    fn loop_condition(&mut self, condition: &Expr, body: B::Block, post: B::Block) -> CResult<()> {
        match self.value(condition) {
            Ok(value) => {
                let condition = self.builder.build_is_nonzero(value, "loopcond");
                self.builder.build_cond_br(condition, body, post);
                Ok(())
            }
            Err(err) => {
                self.branch_to(post);
                self.builder.insert_block(post);
                self.builder.position_at_end(post);
                Err(err)
            }
        }
    }

    fn no_loop_value(value: Option<B::Value>, body: &Expr) -> CResult<()> {
        match value {
            Some(_) => Err(CodegenError::LoopValue {
                loc: body.loc.clone(),
                span: body.loc.span,
            }),
            None => Ok(()),
        }
    }

    fn lookup(&self, name: &str, loc: &Location) -> CResult<B::Value> {
        self.scope
            .values
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UndeclaredVariable {
                identifier: name.into(),
                loc: loc.clone(),
                span: loc.span,
            })
    }

    /// Allocates a slot in the function's declarations block, wherever the
    /// builder currently is.
    fn alloca(&mut self, name: &str) -> B::Value {
        let Some(declarations) = self.scope.declarations else {
            unreachable!("allocation outside of a function body");
        };
        let current = self.current_block();
        self.builder.position_at_end(declarations);
        let slot = self.builder.build_alloca(name);
        self.builder.position_at_end(current);
        slot
    }

    fn branch_to(&mut self, target: B::Block) {
        if !self.is_terminated() {
            self.builder.build_br(target);
        }
    }

    fn is_terminated(&self) -> bool {
        self.builder.is_terminated(self.current_block())
    }

    fn current_block(&self) -> B::Block {
        match self.builder.insert_point() {
            Some(block) => block,
            None => unreachable!("code generation always has an insertion point"),
        }
    }

    fn current_function(&self) -> B::Function {
        match self.function {
            Some(function) => function,
            None => unreachable!("code generation outside of a function body"),
        }
    }
}

/// Folds a global initializer. Division by zero is not a constant.
fn constant_value(expr: &Expr) -> Option<u64> {
    match &expr.node {
        Expression::Constant(value) => Some(*value),
        Expression::Unary {
            op: UnaryOp::Negate,
            operand,
        } => constant_value(operand).map(u64::wrapping_neg),
        Expression::Binary { op, lhs, rhs } => {
            let (lhs, rhs) = (constant_value(lhs)?, constant_value(rhs)?);
            match op {
                BinaryOp::Add => Some(lhs.wrapping_add(rhs)),
                BinaryOp::Subtract => Some(lhs.wrapping_sub(rhs)),
                BinaryOp::Multiply => Some(lhs.wrapping_mul(rhs)),
                BinaryOp::Divide => lhs.checked_div(rhs),
                BinaryOp::Modulo => lhs.checked_rem(rhs),
            }
        }
        _ => None,
    }
}
