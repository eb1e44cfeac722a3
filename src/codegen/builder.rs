use std::fmt::Debug;

use crate::ast::FunctionProto;

/// The instruction-emission surface the code generator drives.
///
/// Every value is a 64-bit integer, except that allocas and globals yield
/// pointers and [`IrBuilder::build_is_nonzero`] yields a boolean. Blocks are
/// created detached and only become part of their function's layout once
/// inserted, so the generator can decide their final order.
pub trait IrBuilder {
    type Value: Copy + PartialEq + Debug;
    type Function: Copy + PartialEq + Debug;
    type Block: Copy + PartialEq + Debug;
    type VerifyError;

    fn declare_function(&mut self, proto: &FunctionProto) -> Self::Function;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn param_count(&self, function: Self::Function) -> usize;
    /// Whether the function already has blocks, i.e. has been defined.
    fn has_body(&self, function: Self::Function) -> bool;
    fn param(&self, function: Self::Function, index: usize) -> Self::Value;

    fn declare_global(&mut self, name: &str, init: u64) -> Self::Value;
    fn get_global(&self, name: &str) -> Option<Self::Value>;

    /// Creates a block that is not yet part of any layout.
    fn create_block(&mut self, function: Self::Function, name: &str) -> Self::Block;
    /// Appends a detached block to the end of its function's layout.
    fn insert_block(&mut self, block: Self::Block);
    fn append_block(&mut self, function: Self::Function, name: &str) -> Self::Block {
        let block = self.create_block(function, name);
        self.insert_block(block);
        block
    }
    fn position_at_end(&mut self, block: Self::Block);
    fn insert_point(&self) -> Option<Self::Block>;
    fn is_terminated(&self, block: Self::Block) -> bool;

    fn const_int(&mut self, value: u64) -> Self::Value;
    fn build_alloca(&mut self, name: &str) -> Self::Value;
    fn build_load(&mut self, ptr: Self::Value, name: &str) -> Self::Value;
    fn build_store(&mut self, value: Self::Value, ptr: Self::Value);

    fn build_int_add(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_int_sub(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_int_mul(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_int_unsigned_div(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_int_unsigned_rem(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_int_neg(&mut self, value: Self::Value, name: &str) -> Self::Value {
        let zero = self.const_int(0);
        self.build_int_sub(zero, value, name)
    }
    /// `value != 0`, as a boolean.
    fn build_is_nonzero(&mut self, value: Self::Value, name: &str) -> Self::Value;

    fn build_br(&mut self, target: Self::Block);
    fn build_cond_br(&mut self, condition: Self::Value, then_block: Self::Block, else_block: Self::Block);
    fn build_call(&mut self, function: Self::Function, args: &[Self::Value], name: &str) -> Self::Value;
    fn build_return(&mut self, value: Self::Value);

    fn build_lifetime_start(&mut self, ptr: Self::Value);
    fn build_lifetime_end(&mut self, ptr: Self::Value);

    /// Checks the structure of everything built so far.
    fn verify(&self) -> Result<(), Self::VerifyError>;
}
