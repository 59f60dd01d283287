//! Type materialisation.
//!
//! MidIR named types may reference each other freely, including mutual
//! recursion through pointers. Resolution happens in two phases over the
//! named-type table:
//!
//! 1. **Seeding**: every entry whose body is absent or a struct gets a
//!    named opaque LLVM struct carrying its display name. Other entries
//!    keep a "not yet built" sentinel.
//! 2. **Filling**: struct bodies are translated and installed on their
//!    opaque seeds; non-struct entries are translated on demand.
//!
//! Pointers may pass through still-opaque seeds, which is exactly how LLVM
//! expects cyclic types to be tied.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::AddressSpace;

use crate::diagnostics::{Diagnostic, Entity, ErrorCode, LowerError};
use crate::midir::{Pointee, Type, TypeIdx};

use super::context::CodegenContext;

/// Extension trait for translating MidIR types to LLVM types.
pub trait TypeLowering<'ctx> {
    /// Run both phases over the named-type table. After this, every entry
    /// has exactly one LLVM type and `llvm_type` is total on well-formed
    /// input.
    fn materialise_types(&mut self) -> Result<(), Vec<Diagnostic>>;

    /// Translate a MidIR type.
    fn llvm_type(&mut self, ty: &Type, entity: Entity)
        -> Result<BasicTypeEnum<'ctx>, Vec<Diagnostic>>;

    /// The LLVM type of a named-type table entry.
    fn named_llvm_type(
        &mut self,
        idx: TypeIdx,
        entity: Entity,
    ) -> Result<BasicTypeEnum<'ctx>, Vec<Diagnostic>>;
}

impl<'ctx, 'a> TypeLowering<'ctx> for CodegenContext<'ctx, 'a> {
    fn materialise_types(&mut self) -> Result<(), Vec<Diagnostic>> {
        let midir = self.midir;

        // Phase 1: seed named opaque structs. Forward declarations stay
        // opaque for good; struct bodies are filled in phase 2.
        for (i, entry) in midir.types.iter().enumerate() {
            match &entry.body {
                None | Some(Type::Struct { .. }) => {
                    let opaque = self.context.opaque_struct_type(&entry.display_name);
                    self.type_table[i] = Some(opaque.into());
                }
                Some(_) => {
                    self.type_table[i] = None;
                }
            }
        }

        // Phase 2: fill.
        for (i, entry) in midir.types.iter().enumerate() {
            let idx = TypeIdx::new(i as u32);
            let entity = Entity::Type(idx);
            match &entry.body {
                Some(Type::Struct { packed, fields }) => {
                    let seeded = match self.type_table[i] {
                        Some(BasicTypeEnum::StructType(st)) => st,
                        _ => {
                            return Err(vec![Diagnostic::error(
                                "named struct was not seeded",
                                entity,
                            )])
                        }
                    };
                    if seeded.is_opaque() {
                        let mut field_types = Vec::with_capacity(fields.len());
                        for field in fields {
                            field_types.push(self.llvm_type(&field.ty, entity)?);
                        }
                        seeded.set_body(&field_types, *packed);
                    }
                }
                Some(_) => {
                    // Translates and installs the entry unless an earlier
                    // fill already reached it through a Named reference.
                    self.named_llvm_type(idx, entity)?;
                }
                None => {}
            }
        }

        tracing::debug!(types = midir.types.len(), "materialised named types");
        Ok(())
    }

    fn llvm_type(
        &mut self,
        ty: &Type,
        entity: Entity,
    ) -> Result<BasicTypeEnum<'ctx>, Vec<Diagnostic>> {
        match ty {
            Type::Int { width, .. } => match *width {
                0 => Err(vec![Diagnostic::from_error_code(
                    ErrorCode::UnsupportedIntWidth,
                    entity,
                )]),
                1 => Ok(self.context.bool_type().into()),
                8 => Ok(self.context.i8_type().into()),
                16 => Ok(self.context.i16_type().into()),
                32 => Ok(self.context.i32_type().into()),
                64 => Ok(self.context.i64_type().into()),
                w => Ok(self.context.custom_width_int_type(w).into()),
            },
            Type::Float(width) => match *width {
                32 => Ok(self.context.f32_type().into()),
                64 => Ok(self.context.f64_type().into()),
                128 => Ok(self.context.f128_type().into()),
                w => Err(vec![Diagnostic::from_error_code(
                    ErrorCode::UnsupportedFloatWidth,
                    entity,
                )
                .with_note(format!("found f{}", w))]),
            },
            Type::Ptr(Pointee::Basic(inner)) => {
                let pointee = self.llvm_type(inner, entity)?;
                Ok(pointee.ptr_type(AddressSpace::default()).into())
            }
            Type::Ptr(Pointee::Gc(_, header)) => {
                // GC object-ness lives in the descriptor global; the pointer
                // type itself is a plain pointer to the header's named type.
                let header_entry = self
                    .midir
                    .gc_header(*header)
                    .ok_or_else(|| {
                        vec![Diagnostic::from(LowerError::DanglingGcHeader {
                            idx: *header,
                            entity,
                        })]
                    })?;
                let pointee = self.named_llvm_type(header_entry.ty, entity)?;
                Ok(pointee.ptr_type(AddressSpace::default()).into())
            }
            Type::Array { size, element } => {
                let element = self.llvm_type(element, entity)?;
                Ok(element.array_type(size.unwrap_or(0) as u32).into())
            }
            Type::Struct { packed, fields } => {
                let mut field_types = Vec::with_capacity(fields.len());
                for field in fields {
                    field_types.push(self.llvm_type(&field.ty, entity)?);
                }
                Ok(self.context.struct_type(&field_types, *packed).into())
            }
            Type::Named(idx) => self.named_llvm_type(*idx, entity),
        }
    }

    fn named_llvm_type(
        &mut self,
        idx: TypeIdx,
        entity: Entity,
    ) -> Result<BasicTypeEnum<'ctx>, Vec<Diagnostic>> {
        let entry = self
            .midir
            .named_type(idx)
            .ok_or_else(|| vec![Diagnostic::from(LowerError::DanglingTypeIndex { idx, entity })])?;

        if let Some(ty) = self.type_table[idx.index()] {
            return Ok(ty);
        }

        // Only non-struct entries can still be sentinels here, and a chain
        // of those that loops back on itself has no base case.
        if self.filling[idx.index()] {
            return Err(vec![Diagnostic::from_error_code(
                ErrorCode::UnsizedTypeCycle,
                Entity::Type(idx),
            )]);
        }

        let body = match &entry.body {
            Some(body) => body.clone(),
            None => {
                return Err(vec![Diagnostic::error(
                    "opaque type entry was not seeded",
                    Entity::Type(idx),
                )])
            }
        };

        self.filling[idx.index()] = true;
        let result = self.llvm_type(&body, Entity::Type(idx));
        self.filling[idx.index()] = false;

        let ty = result?;
        self.type_table[idx.index()] = Some(ty);
        Ok(ty)
    }
}
