//! GC runtime metadata.
//!
//! Owns the layout of the `core.gc.typedesc` struct and the initializers of
//! the descriptor globals reserved by the descriptor pass. The layout is
//! shared with the collector runtime:
//!
//! ```text
//! core.gc.typedesc = { i64 size, i8 mobility, i8 mutability }
//! ```
//!
//! The size word is filled in by the runtime loader; mobility and
//! mutability are encoded here.

use crate::diagnostics::{Diagnostic, Entity};
use crate::midir::{Mobility, Mutability};

use super::context::CodegenContext;

/// Extension trait for populating GC metadata.
pub trait GcMetadata<'ctx> {
    /// Fill the `core.gc.typedesc` body and initialize every descriptor
    /// global.
    fn gen_metadata(&mut self) -> Result<(), Vec<Diagnostic>>;
}

fn mobility_code(mobility: &Mobility) -> u64 {
    match mobility {
        Mobility::Mobile => 0,
        Mobility::Immobile => 1,
    }
}

fn mutability_code(mutability: &Mutability) -> u64 {
    match mutability {
        Mutability::Immutable => 0,
        Mutability::WriteOnce => 1,
        Mutability::Mutable => 2,
        Mutability::Custom(_) => 3,
    }
}

impl<'ctx, 'a> GcMetadata<'ctx> for CodegenContext<'ctx, 'a> {
    fn gen_metadata(&mut self) -> Result<(), Vec<Diagnostic>> {
        let typedesc = match self.gc_typedesc {
            Some(typedesc) => typedesc,
            // No descriptors were emitted; nothing to describe.
            None => return Ok(()),
        };

        let i64_ty = self.context.i64_type();
        let i8_ty = self.context.i8_type();
        if typedesc.is_opaque() {
            typedesc.set_body(&[i64_ty.into(), i8_ty.into(), i8_ty.into()], false);
        }

        if self.gc_table.len() != self.midir.gc_headers.len() {
            return Err(vec![Diagnostic::error(
                "descriptor table does not match the GC header table",
                Entity::Module,
            )]);
        }

        for (header, global) in self.midir.gc_headers.iter().zip(&self.gc_table) {
            let init = typedesc.const_named_struct(&[
                i64_ty.const_int(0, false).into(),
                i8_ty.const_int(mobility_code(&header.mobility), false).into(),
                i8_ty
                    .const_int(mutability_code(&header.mutability), false)
                    .into(),
            ]);
            global.set_initializer(&init);
        }
        Ok(())
    }
}
