//! GC type-descriptor globals.
//!
//! Every GC header in the module gets one private constant global of the
//! named opaque `core.gc.typedesc` struct. The struct body and the
//! initializers are owned by the metadata collaborator (`gen_metadata`);
//! this pass only reserves the globals under their deterministic names so
//! later passes can reference them.

use inkwell::module::Linkage;

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::GcHeaderIdx;

use super::context::CodegenContext;

/// Extension trait for emitting GC type-descriptor globals.
pub trait GcDescriptors<'ctx> {
    /// Create `core.gc.typedesc` and one descriptor global per GC header.
    fn emit_gc_descriptors(&mut self) -> Result<(), Vec<Diagnostic>>;
}

impl<'ctx, 'a> GcDescriptors<'ctx> for CodegenContext<'ctx, 'a> {
    fn emit_gc_descriptors(&mut self) -> Result<(), Vec<Diagnostic>> {
        let typedesc = self.context.opaque_struct_type("core.gc.typedesc");
        self.gc_typedesc = Some(typedesc);

        for (i, header) in self.midir.gc_headers.iter().enumerate() {
            let idx = GcHeaderIdx::new(i as u32);
            let entity = Entity::GcHeader(idx);
            let entry = self.midir.named_type(header.ty).ok_or_else(|| {
                vec![Diagnostic::from(LowerError::DanglingTypeIndex {
                    idx: header.ty,
                    entity,
                })]
            })?;

            let name = format!(
                "core.gc.typedesc.{}.{}.{}",
                entry.display_name,
                header.mobility.name(),
                header.mutability.name()
            );
            let global = self.module.add_global(typedesc, None, &name);
            global.set_constant(true);
            global.set_linkage(Linkage::Private);
            self.gc_table.push(global);
        }

        tracing::debug!(headers = self.gc_table.len(), "emitted GC type descriptors");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midir::{GcHeader, Mobility, Module, Mutability, NamedType, Type, TypeIdx};
    use inkwell::context::Context;

    #[test]
    fn test_descriptor_names_and_attributes() {
        let midir = Module {
            name: "t".into(),
            types: vec![NamedType::new("Cell", Some(Type::i32()))],
            globals: Vec::new(),
            gc_headers: vec![
                GcHeader {
                    ty: TypeIdx::new(0),
                    mobility: Mobility::Mobile,
                    mutability: Mutability::Immutable,
                },
                GcHeader {
                    ty: TypeIdx::new(0),
                    mobility: Mobility::Immobile,
                    mutability: Mutability::Custom("frozen".into()),
                },
            ],
        };

        let context = Context::create();
        let module = context.create_module("t");
        let builder = context.create_builder();
        let mut ctx = CodegenContext::new(&context, &module, &builder, &midir);
        ctx.emit_gc_descriptors().unwrap();

        assert_eq!(ctx.gc_table.len(), 2);
        let first = ctx.gc_table[0];
        assert_eq!(
            first.get_name().to_str().unwrap(),
            "core.gc.typedesc.Cell.mobile.const"
        );
        assert!(first.is_constant());
        assert_eq!(first.get_linkage(), Linkage::Private);
        assert_eq!(
            ctx.gc_table[1].get_name().to_str().unwrap(),
            "core.gc.typedesc.Cell.immobile.frozen"
        );
    }
}
