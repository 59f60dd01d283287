//! MidIR: the typed, CFG-based intermediate representation consumed by the
//! code generator.
//!
//! A [`Module`] is three indexed tables (named types, globals, GC headers)
//! plus a name. Function globals optionally carry a [`FuncBody`]: a control
//! flow graph whose statements use named variables that may be assigned
//! more than once; the code generator rewrites those into SSA form.

pub mod body;
pub mod types;
pub mod validate;

pub use body::{
    BinOp, Block, ConstExpr, FuncBody, FuncBodyBuilder, Operand, Rvalue, Statement, Terminator,
    UnOp,
};
pub use types::{
    Field, FuncDecl, GcHeader, GcHeaderIdx, Global, GlobalIdx, Mobility, Mutability, Module,
    NamedType, NodeId, Pointee, Type, TypeIdx, VarDecl, VarId, VarTypes,
};
pub use validate::validate_module;
