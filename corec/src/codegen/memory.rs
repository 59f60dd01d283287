//! Memory access primitives.
//!
//! Loads and stores flow through this collaborator so mutability hints end
//! up on the emitted instructions: loads from `Immutable` locations carry
//! `!invariant.load` metadata, and both directions get explicit natural
//! alignment so LLVM never has to guess.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum, PointerValue};

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::{Mutability, Type};

use super::context::CodegenContext;
use super::types::TypeLowering;

/// Extension trait for mutability-aware loads and stores.
pub trait MemAccess<'ctx> {
    /// Emit a load of a value of MidIR type `ty` from `addr`.
    fn gen_load(
        &mut self,
        addr: PointerValue<'ctx>,
        mutability: &Mutability,
        ty: &Type,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>>;

    /// Emit a store of `value` to `addr`.
    fn gen_store(
        &mut self,
        value: BasicValueEnum<'ctx>,
        addr: PointerValue<'ctx>,
        mutability: &Mutability,
    ) -> Result<(), Vec<Diagnostic>>;

    /// Natural ABI alignment of an LLVM type, in bytes.
    fn natural_alignment(&self, ty: BasicTypeEnum<'ctx>) -> u32;
}

impl<'ctx, 'a> MemAccess<'ctx> for CodegenContext<'ctx, 'a> {
    fn gen_load(
        &mut self,
        addr: PointerValue<'ctx>,
        mutability: &Mutability,
        ty: &Type,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>> {
        let expected = self.llvm_type(ty, Entity::Module)?;
        let loaded = self
            .builder
            .build_load(addr, "load")
            .map_err(|e| {
                vec![Diagnostic::error(
                    format!("LLVM load error: {}", e),
                    Entity::Module,
                )]
            })?;
        if loaded.get_type() != expected {
            return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                context: "load",
                entity: Entity::Module,
            })]);
        }

        if let Some(inst) = loaded.as_instruction_value() {
            let _ = inst.set_alignment(self.natural_alignment(loaded.get_type()));
            if *mutability == Mutability::Immutable {
                let node = self.context.metadata_node(&[]);
                let _ = inst.set_metadata(node, self.context.get_kind_id("invariant.load"));
            }
        }
        Ok(loaded)
    }

    fn gen_store(
        &mut self,
        value: BasicValueEnum<'ctx>,
        addr: PointerValue<'ctx>,
        _mutability: &Mutability,
    ) -> Result<(), Vec<Diagnostic>> {
        let store = self
            .builder
            .build_store(addr, value)
            .map_err(|e| {
                vec![Diagnostic::error(
                    format!("LLVM store error: {}", e),
                    Entity::Module,
                )]
            })?;
        let _ = store.set_alignment(self.natural_alignment(value.get_type()));
        Ok(())
    }

    fn natural_alignment(&self, ty: BasicTypeEnum<'ctx>) -> u32 {
        match ty {
            BasicTypeEnum::IntType(t) => {
                let bytes = (t.get_bit_width() as u64).div_ceil(8);
                bytes.clamp(1, 8) as u32
            }
            BasicTypeEnum::FloatType(t) => {
                if t == self.context.f32_type() {
                    4
                } else if t == self.context.f16_type() {
                    2
                } else {
                    8
                }
            }
            BasicTypeEnum::PointerType(_) => 8,
            BasicTypeEnum::ArrayType(t) => self.natural_alignment(t.get_element_type()),
            BasicTypeEnum::StructType(t) => {
                let mut max_align = 1;
                for i in 0..t.count_fields() {
                    if let Some(field) = t.get_field_type_at_index(i) {
                        max_align = max_align.max(self.natural_alignment(field));
                    }
                }
                max_align
            }
            BasicTypeEnum::VectorType(_) => 16,
        }
    }
}
