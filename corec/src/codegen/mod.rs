//! Code generation for Core.
//!
//! This module lowers a MidIR module to LLVM IR, using inkwell as a safe
//! wrapper around LLVM.
//!
//! # Architecture
//!
//! ```text
//! MidIR Module -> validate -> type table -> GC descriptors -> declarations
//!              -> accessor intrinsics -> function bodies (SSA) -> metadata
//! ```
//!
//! The preamble passes run first and freeze the shared tables (types,
//! declarations, GC descriptors); function lowering only reads them. The
//! whole pipeline is single-threaded per module: the LLVM context and
//! builder are single-owner resources.

pub mod accessors;
pub mod consts;
pub mod context;
pub mod declare;
pub mod gc;
pub mod lower;
pub mod memory;
pub mod metadata;
pub mod phi;
pub mod types;
pub mod value_map;

pub use accessors::AccessorEmit;
pub use consts::ConstLowering;
pub use context::{CodegenContext, DeclValue};
pub use declare::DeclEmit;
pub use gc::GcDescriptors;
pub use lower::{FuncLowering, StatementLowering, TerminatorLowering};
pub use memory::MemAccess;
pub use metadata::GcMetadata;
pub use phi::{plan_phis, PhiPlan};
pub use types::TypeLowering;
pub use value_map::{Location, ValMap, ValueTracking};

use inkwell::context::Context;
use inkwell::module::Module;

use crate::diagnostics::Diagnostic;
use crate::midir;
use crate::midir::validate_module;

/// Lower a MidIR module to an LLVM module.
///
/// The returned module is ready for bitcode writing or further passes; its
/// handles are owned by `context`, which must outlive it.
pub fn to_llvm<'ctx>(
    context: &'ctx Context,
    module: &midir::Module,
) -> Result<Module<'ctx>, Vec<Diagnostic>> {
    validate_module(module)?;

    let llvm_module = context.create_module(&module.name);
    let builder = context.create_builder();
    let mut ctx = CodegenContext::new(context, &llvm_module, &builder, module);

    ctx.materialise_types()?;
    ctx.emit_gc_descriptors()?;
    ctx.emit_declarations()?;
    ctx.emit_accessors()?;

    for (idx, func) in module.funcs() {
        if let Some(body) = &func.body {
            ctx.lower_function(idx, func, body)?;
        }
    }

    ctx.gen_metadata()?;

    tracing::debug!(module = %module.name, "lowered module");
    drop(ctx);
    Ok(llvm_module)
}
