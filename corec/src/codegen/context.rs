//! Code generation context.
//!
//! [`CodegenContext`] owns the view onto one LLVM module under construction
//! and the frozen lookup tables the lowering passes share: the materialised
//! type table, the declaration table and the GC descriptor table. The tables
//! are filled by the single-threaded preamble passes and are read-only by
//! the time function bodies are lowered.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicTypeEnum, StructType};
use inkwell::values::{BasicValueEnum, FunctionValue, GlobalValue};

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir;
use crate::midir::GlobalIdx;

/// A lowered global declaration.
#[derive(Debug, Clone, Copy)]
pub enum DeclValue<'ctx> {
    Func(FunctionValue<'ctx>),
    Var(GlobalValue<'ctx>),
}

/// The code generation context for one module.
pub struct CodegenContext<'ctx, 'a> {
    /// The LLVM context.
    pub context: &'ctx Context,
    /// The LLVM module being built.
    pub module: &'a Module<'ctx>,
    /// The LLVM IR builder.
    pub builder: &'a Builder<'ctx>,
    /// The MidIR module being lowered.
    pub midir: &'a midir::Module,
    /// LLVM type per named-type entry. `None` = not yet materialised.
    pub type_table: Vec<Option<BasicTypeEnum<'ctx>>>,
    /// Entries currently being filled; guards against alias cycles.
    pub(crate) filling: Vec<bool>,
    /// The named opaque `core.gc.typedesc` struct, once created.
    pub gc_typedesc: Option<StructType<'ctx>>,
    /// Descriptor global per GC header.
    pub gc_table: Vec<GlobalValue<'ctx>>,
    /// Declaration per module global.
    pub decl_table: Vec<DeclValue<'ctx>>,
    /// The function currently being lowered.
    pub current_fn: Option<FunctionValue<'ctx>>,
}

impl<'ctx, 'a> CodegenContext<'ctx, 'a> {
    /// Create a new code generation context.
    pub fn new(
        context: &'ctx Context,
        module: &'a Module<'ctx>,
        builder: &'a Builder<'ctx>,
        midir: &'a midir::Module,
    ) -> Self {
        let type_count = midir.types.len();
        Self {
            context,
            module,
            builder,
            midir,
            type_table: vec![None; type_count],
            filling: vec![false; type_count],
            gc_typedesc: None,
            gc_table: Vec::new(),
            decl_table: Vec::new(),
            current_fn: None,
        }
    }

    /// Look up a lowered global declaration.
    pub fn decl(&self, idx: GlobalIdx, entity: Entity) -> Result<DeclValue<'ctx>, Vec<Diagnostic>> {
        self.decl_table
            .get(idx.index())
            .copied()
            .ok_or_else(|| vec![LowerError::DanglingGlobalIndex { idx, entity }.into()])
    }

    /// An undefined value of the given LLVM type.
    pub fn undef_of(&self, ty: BasicTypeEnum<'ctx>) -> BasicValueEnum<'ctx> {
        match ty {
            BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
            BasicTypeEnum::FloatType(t) => t.get_undef().into(),
            BasicTypeEnum::IntType(t) => t.get_undef().into(),
            BasicTypeEnum::PointerType(t) => t.get_undef().into(),
            BasicTypeEnum::StructType(t) => t.get_undef().into(),
            BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        }
    }
}
