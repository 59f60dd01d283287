//! Constant lowering.
//!
//! Lowers [`ConstExpr`] initializers and operands to LLVM constant values,
//! returning the value together with its MidIR type so callers can keep
//! type bookkeeping without re-deriving it.

use inkwell::values::BasicValueEnum;

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::{ConstExpr, Global, Pointee, Type};

use super::context::{CodegenContext, DeclValue};
use super::types::TypeLowering;

/// Extension trait for lowering constant expressions.
pub trait ConstLowering<'ctx> {
    /// Lower a constant expression to an LLVM constant.
    fn gen_const(
        &mut self,
        expr: &ConstExpr,
        entity: Entity,
    ) -> Result<(BasicValueEnum<'ctx>, Type), Vec<Diagnostic>>;

    /// The MidIR type of a constant expression, without lowering it.
    fn const_type(&self, expr: &ConstExpr, entity: Entity) -> Result<Type, Vec<Diagnostic>>;
}

impl<'ctx, 'a> ConstLowering<'ctx> for CodegenContext<'ctx, 'a> {
    fn gen_const(
        &mut self,
        expr: &ConstExpr,
        entity: Entity,
    ) -> Result<(BasicValueEnum<'ctx>, Type), Vec<Diagnostic>> {
        match expr {
            ConstExpr::Int(value, ty) => {
                let llvm_ty = self.llvm_type(ty, entity)?;
                if !llvm_ty.is_int_type() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "integer constant",
                        entity,
                    })]);
                }
                let int_ty = llvm_ty.into_int_type();
                let signed = matches!(ty, Type::Int { signed: true, .. });
                let value = if int_ty.get_bit_width() > 64 {
                    let words = [*value as u64, (*value >> 64) as u64];
                    int_ty.const_int_arbitrary_precision(&words)
                } else {
                    int_ty.const_int(*value as u64, signed)
                };
                Ok((value.into(), ty.clone()))
            }
            ConstExpr::Float(value, ty) => {
                let llvm_ty = self.llvm_type(ty, entity)?;
                if !llvm_ty.is_float_type() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "float constant",
                        entity,
                    })]);
                }
                let value = llvm_ty.into_float_type().const_float(*value);
                Ok((value.into(), ty.clone()))
            }
            ConstExpr::Bool(b) => {
                let value = self.context.bool_type().const_int(*b as u64, false);
                Ok((value.into(), Type::bool()))
            }
            ConstExpr::Null(ty) => {
                let llvm_ty = self.llvm_type(ty, entity)?;
                if !llvm_ty.is_pointer_type() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "null constant",
                        entity,
                    })]);
                }
                Ok((llvm_ty.into_pointer_type().const_null().into(), ty.clone()))
            }
            ConstExpr::Undef(ty) => {
                let llvm_ty = self.llvm_type(ty, entity)?;
                Ok((self.undef_of(llvm_ty), ty.clone()))
            }
            ConstExpr::GlobalAddr(idx) => {
                let ty = self.const_type(expr, entity)?;
                let value: BasicValueEnum = match self.decl(*idx, entity)? {
                    DeclValue::Func(fv) => fv.as_global_value().as_pointer_value().into(),
                    DeclValue::Var(gv) => gv.as_pointer_value().into(),
                };
                Ok((value, ty))
            }
        }
    }

    fn const_type(&self, expr: &ConstExpr, entity: Entity) -> Result<Type, Vec<Diagnostic>> {
        match expr {
            ConstExpr::Int(_, ty)
            | ConstExpr::Float(_, ty)
            | ConstExpr::Null(ty)
            | ConstExpr::Undef(ty) => Ok(ty.clone()),
            ConstExpr::Bool(_) => Ok(Type::bool()),
            ConstExpr::GlobalAddr(idx) => {
                let global = self.midir.global(*idx).ok_or_else(|| {
                    vec![Diagnostic::from(LowerError::DanglingGlobalIndex {
                        idx: *idx,
                        entity,
                    })]
                })?;
                let pointee = match global {
                    Global::Var(var) => var.ty.clone(),
                    // Function addresses travel as opaque byte pointers.
                    Global::Func(_) => Type::Int {
                        signed: false,
                        width: 8,
                    },
                };
                Ok(Type::Ptr(Pointee::Basic(Box::new(pointee))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midir::Module;
    use inkwell::context::Context;

    fn empty_midir() -> Module {
        Module {
            name: "t".into(),
            types: Vec::new(),
            globals: Vec::new(),
            gc_headers: Vec::new(),
        }
    }

    #[test]
    fn test_int_and_bool_constants() {
        let midir = empty_midir();
        let context = Context::create();
        let module = context.create_module("t");
        let builder = context.create_builder();
        let mut ctx = CodegenContext::new(&context, &module, &builder, &midir);

        let (value, ty) = ctx
            .gen_const(&ConstExpr::Int(7, Type::i32()), Entity::Module)
            .unwrap();
        assert_eq!(ty, Type::i32());
        assert_eq!(
            value.into_int_value().get_zero_extended_constant(),
            Some(7)
        );

        let (value, ty) = ctx.gen_const(&ConstExpr::Bool(true), Entity::Module).unwrap();
        assert_eq!(ty, Type::bool());
        assert_eq!(value.into_int_value().get_type().get_bit_width(), 1);
    }

    #[test]
    fn test_null_requires_pointer_type() {
        let midir = empty_midir();
        let context = Context::create();
        let module = context.create_module("t");
        let builder = context.create_builder();
        let mut ctx = CodegenContext::new(&context, &module, &builder, &midir);

        let err = ctx
            .gen_const(&ConstExpr::Null(Type::i32()), Entity::Module)
            .unwrap_err();
        assert_eq!(err[0].code.as_deref(), Some("E0606"));

        let ok = ctx.gen_const(
            &ConstExpr::Null(Type::ptr_to(Type::i32())),
            Entity::Module,
        );
        assert!(ok.is_ok());
    }
}
