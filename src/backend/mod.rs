//! In-memory IR: the module the code generator builds, its structural
//! verifier, a text dump and an interpreter for running it.

pub mod builder;
pub mod interp;
pub mod ir;
pub mod verify;
