//! Accessor and modifier intrinsic declarations.
//!
//! For every scalar leaf reachable through the field tree of a named type,
//! the runtime expects a pair of compiler-synthesised intrinsics:
//!
//! - `<path>.read(obj, idx...) -> leaf`: `nounwind readonly alwaysinline`
//! - `<path>.write(obj, idx..., value)`: `nounwind alwaysinline`
//!
//! Paths start at `core.types`, append the type's display name, then one
//! segment per struct field crossed. Crossing an array level adds an `i32`
//! index parameter; index arguments are passed innermost dimension first.
//! The write intrinsic is omitted when the path crosses an `Immutable`
//! field: once any step of the path is immutable the leaf can never be
//! written through the object again.

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, PointerType};
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

use crate::diagnostics::{Diagnostic, Entity};
use crate::midir::{Mutability, Type, TypeIdx};

use super::context::CodegenContext;
use super::types::TypeLowering;

/// Extension trait for emitting accessor declarations.
pub trait AccessorEmit<'ctx> {
    /// Emit read/write declarations for every named type with a body.
    fn emit_accessors(&mut self) -> Result<(), Vec<Diagnostic>>;
}

impl<'ctx, 'a> AccessorEmit<'ctx> for CodegenContext<'ctx, 'a> {
    fn emit_accessors(&mut self) -> Result<(), Vec<Diagnostic>> {
        let midir = self.midir;
        for (i, entry) in midir.types.iter().enumerate() {
            let idx = TypeIdx::new(i as u32);
            let entity = Entity::Type(idx);
            let body = match &entry.body {
                Some(body) => body.clone(),
                None => continue,
            };
            let outer = self.named_llvm_type(idx, entity)?;
            let outer_ptr = outer.ptr_type(AddressSpace::default());
            let path = format!("core.types.{}", entry.display_name);
            self.walk_leaf_paths(outer_ptr, &path, &body, false, 0, entity)?;
        }
        Ok(())
    }
}

impl<'ctx, 'a> CodegenContext<'ctx, 'a> {
    /// Descend through structs and arrays; emit a declaration pair at every
    /// scalar leaf.
    fn walk_leaf_paths(
        &mut self,
        outer_ptr: PointerType<'ctx>,
        path: &str,
        ty: &Type,
        is_const: bool,
        index_depth: usize,
        entity: Entity,
    ) -> Result<(), Vec<Diagnostic>> {
        // Named references resolve through the table; an opaque entry has
        // no reachable leaves.
        let resolved = match self.midir.resolve(ty) {
            Some(resolved) => resolved.clone(),
            None => return Ok(()),
        };

        match resolved {
            Type::Struct { fields, .. } => {
                for field in &fields {
                    let field_path = format!("{}.{}", path, field.name);
                    let field_const = is_const || field.mutability == Mutability::Immutable;
                    self.walk_leaf_paths(
                        outer_ptr,
                        &field_path,
                        &field.ty,
                        field_const,
                        index_depth,
                        entity,
                    )?;
                }
            }
            Type::Array { element, .. } => {
                self.walk_leaf_paths(outer_ptr, path, &element, is_const, index_depth + 1, entity)?;
            }
            leaf => {
                self.emit_leaf_pair(outer_ptr, path, &leaf, is_const, index_depth, entity)?;
            }
        }
        Ok(())
    }

    fn emit_leaf_pair(
        &mut self,
        outer_ptr: PointerType<'ctx>,
        path: &str,
        leaf: &Type,
        is_const: bool,
        index_depth: usize,
        entity: Entity,
    ) -> Result<(), Vec<Diagnostic>> {
        let leaf_ty = self.llvm_type(leaf, entity)?;

        let mut params: Vec<BasicMetadataTypeEnum> = Vec::with_capacity(index_depth + 2);
        params.push(outer_ptr.into());
        for _ in 0..index_depth {
            params.push(self.context.i32_type().into());
        }

        let read_ty = leaf_ty.fn_type(&params, false);
        let read = self
            .module
            .add_function(&format!("{}.read", path), read_ty, None);
        self.add_fn_attrs(read, &["nounwind", "readonly", "alwaysinline"]);

        if !is_const {
            params.push(leaf_ty.into());
            let write_ty = self.context.void_type().fn_type(&params, false);
            let write = self
                .module
                .add_function(&format!("{}.write", path), write_ty, None);
            self.add_fn_attrs(write, &["nounwind", "alwaysinline"]);
        }
        Ok(())
    }

    /// Attach named enum attributes to a function.
    pub(crate) fn add_fn_attrs(&self, fn_value: FunctionValue<'ctx>, names: &[&str]) {
        for name in names {
            let kind = Attribute::get_named_enum_kind_id(name);
            let attr = self.context.create_enum_attribute(kind, 0);
            fn_value.add_attribute(AttributeLoc::Function, attr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midir::{Field, Module, NamedType};
    use inkwell::context::Context;

    fn emit(midir: &Module) -> (Context, Vec<String>) {
        let context = Context::create();
        let names;
        {
            let module = context.create_module("t");
            let builder = context.create_builder();
            let mut ctx = CodegenContext::new(&context, &module, &builder, midir);
            ctx.materialise_types().unwrap();
            ctx.emit_accessors().unwrap();

            let mut collected = Vec::new();
            let mut f = module.get_first_function();
            while let Some(fv) = f {
                collected.push(fv.get_name().to_str().unwrap().to_string());
                f = fv.get_next_function();
            }
            names = collected;
        }
        (context, names)
    }

    #[test]
    fn test_scalar_fields_get_read_and_write() {
        let midir = Module {
            name: "t".into(),
            types: vec![NamedType::new(
                "Point",
                Some(Type::struct_of(vec![
                    Field::new("x", Mutability::Mutable, Type::i32()),
                    Field::new("y", Mutability::Mutable, Type::i32()),
                ])),
            )],
            globals: Vec::new(),
            gc_headers: Vec::new(),
        };
        let (_context, names) = emit(&midir);
        assert!(names.contains(&"core.types.Point.x.read".to_string()));
        assert!(names.contains(&"core.types.Point.x.write".to_string()));
        assert!(names.contains(&"core.types.Point.y.read".to_string()));
        assert!(names.contains(&"core.types.Point.y.write".to_string()));
    }

    #[test]
    fn test_immutable_path_omits_write() {
        let midir = Module {
            name: "t".into(),
            types: vec![NamedType::new(
                "Id",
                Some(Type::struct_of(vec![Field::new(
                    "value",
                    Mutability::Immutable,
                    Type::i64(),
                )])),
            )],
            globals: Vec::new(),
            gc_headers: Vec::new(),
        };
        let (_context, names) = emit(&midir);
        assert!(names.contains(&"core.types.Id.value.read".to_string()));
        assert!(!names.contains(&"core.types.Id.value.write".to_string()));
    }

    #[test]
    fn test_immutability_is_sticky_through_nesting() {
        // outer field is immutable; the nested mutable field still cannot
        // be written through the object.
        let inner = Type::struct_of(vec![Field::new("n", Mutability::Mutable, Type::i32())]);
        let midir = Module {
            name: "t".into(),
            types: vec![NamedType::new(
                "Box",
                Some(Type::struct_of(vec![Field::new(
                    "frozen",
                    Mutability::Immutable,
                    inner,
                )])),
            )],
            globals: Vec::new(),
            gc_headers: Vec::new(),
        };
        let (_context, names) = emit(&midir);
        assert!(names.contains(&"core.types.Box.frozen.n.read".to_string()));
        assert!(!names.contains(&"core.types.Box.frozen.n.write".to_string()));
    }

    #[test]
    fn test_array_levels_add_index_parameters() {
        let grid = Type::array_of(Some(4), Type::array_of(Some(4), Type::i32()));
        let midir = Module {
            name: "t".into(),
            types: vec![NamedType::new(
                "Board",
                Some(Type::struct_of(vec![Field::new(
                    "cells",
                    Mutability::Mutable,
                    grid,
                )])),
            )],
            globals: Vec::new(),
            gc_headers: Vec::new(),
        };

        let context = Context::create();
        let module = context.create_module("t");
        let builder = context.create_builder();
        let mut ctx = CodegenContext::new(&context, &module, &builder, &midir);
        ctx.materialise_types().unwrap();
        ctx.emit_accessors().unwrap();

        // object pointer + one i32 per array level
        let read = module.get_function("core.types.Board.cells.read").unwrap();
        assert_eq!(read.count_params(), 3);
        // same plus the stored value
        let write = module.get_function("core.types.Board.cells.write").unwrap();
        assert_eq!(write.count_params(), 4);
        assert!(write.get_type().get_return_type().is_none());
    }
}
