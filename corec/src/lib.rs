//! # Core Compiler: Code Generation Core
//!
//! This crate lowers MidIR, the typed control-flow-graph intermediate
//! representation of the Core toolchain, to LLVM IR in SSA form.
//!
//! ## Pipeline
//!
//! ```text
//! MidIR Module -> Type materialisation -> GC descriptors -> Declarations
//!              -> Accessor intrinsics  -> per-function SSA construction
//!              -> LLVM Module
//! ```
//!
//! The front-end (parsing and type checking of Core source) lives upstream;
//! this crate consumes a fully-formed [`midir::Module`] and produces an
//! [`inkwell::module::Module`] ready for the bitcode writer or further
//! passes.
//!
//! ## Module Overview
//!
//! - [`diagnostics`] - Entity-located error reporting
//! - [`midir`] - MidIR data model: types, globals, function bodies
//! - [`codegen`] - LLVM code generation, φ placement, value tracking
//!
//! ## Quick Start
//!
//! ```no_run
//! use corec::midir::{FuncBodyBuilder, Operand, Terminator, Type, VarId};
//! use corec::midir::{FuncDecl, Global, Module, VarTypes};
//! use inkwell::context::Context;
//!
//! let mut builder = FuncBodyBuilder::new();
//! builder.terminate(Terminator::Return(Some(Operand::Var(VarId::new(0)))));
//!
//! let module = Module {
//!     name: "demo".into(),
//!     types: Vec::new(),
//!     globals: vec![Global::Func(FuncDecl {
//!         name: "id".into(),
//!         params: vec![VarId::new(0)],
//!         ret: Some(Type::i32()),
//!         vars: VarTypes::new(VarId::new(0), vec![Type::i32()]),
//!         body: Some(builder.finish()),
//!     })],
//!     gc_headers: Vec::new(),
//! };
//!
//! let context = Context::create();
//! let llvm = corec::codegen::to_llvm(&context, &module).unwrap();
//! println!("{}", llvm.print_to_string().to_string());
//! ```

pub mod codegen;
pub mod diagnostics;
pub mod midir;

// Re-export commonly used types
pub use codegen::to_llvm;
pub use diagnostics::{Diagnostic, DiagnosticKind, Entity, ErrorCode};
