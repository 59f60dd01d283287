//! Global declarations.
//!
//! Emits an LLVM `declare` for every function global and an external global
//! for every variable global, building the declaration table that call and
//! address lowering resolve against. Bodies are attached later by the
//! function lowering pass.

use inkwell::types::{BasicMetadataTypeEnum, BasicType};

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::{Global, GlobalIdx};

use super::context::{CodegenContext, DeclValue};
use super::types::TypeLowering;

/// Extension trait for emitting global declarations.
pub trait DeclEmit<'ctx> {
    /// Fill the declaration table, one entry per module global.
    fn emit_declarations(&mut self) -> Result<(), Vec<Diagnostic>>;
}

impl<'ctx, 'a> DeclEmit<'ctx> for CodegenContext<'ctx, 'a> {
    fn emit_declarations(&mut self) -> Result<(), Vec<Diagnostic>> {
        let midir = self.midir;
        for (i, global) in midir.globals.iter().enumerate() {
            let entity = Entity::Global(GlobalIdx::new(i as u32));
            match global {
                Global::Func(func) => {
                    let mut param_types: Vec<BasicMetadataTypeEnum> =
                        Vec::with_capacity(func.params.len());
                    for &param in &func.params {
                        let ty = func.vars.get(param).ok_or_else(|| {
                            vec![Diagnostic::from(LowerError::UndefinedVariable {
                                var: param,
                                entity,
                            })]
                        })?;
                        param_types.push(self.llvm_type(ty, entity)?.into());
                    }
                    let fn_type = match &func.ret {
                        Some(ret) => self.llvm_type(ret, entity)?.fn_type(&param_types, false),
                        None => self.context.void_type().fn_type(&param_types, false),
                    };
                    let fn_value = self.module.add_function(&func.name, fn_type, None);
                    self.decl_table.push(DeclValue::Func(fn_value));
                }
                Global::Var(var) => {
                    let ty = self.llvm_type(&var.ty, entity)?;
                    let global = self.module.add_global(ty, None, &var.name);
                    self.decl_table.push(DeclValue::Var(global));
                }
            }
        }

        tracing::debug!(globals = self.decl_table.len(), "emitted declarations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midir::{FuncDecl, Module, Mutability, Type, VarDecl, VarId, VarTypes};
    use inkwell::context::Context;

    #[test]
    fn test_function_and_variable_declarations() {
        let midir = Module {
            name: "t".into(),
            types: Vec::new(),
            globals: vec![
                Global::Func(FuncDecl {
                    name: "add".into(),
                    params: vec![VarId::new(0), VarId::new(1)],
                    ret: Some(Type::i32()),
                    vars: VarTypes::new(VarId::new(0), vec![Type::i32(), Type::i32()]),
                    body: None,
                }),
                Global::Var(VarDecl {
                    name: "counter".into(),
                    ty: Type::i64(),
                    mutability: Mutability::Mutable,
                }),
            ],
            gc_headers: Vec::new(),
        };

        let context = Context::create();
        let module = context.create_module("t");
        let builder = context.create_builder();
        let mut ctx = CodegenContext::new(&context, &module, &builder, &midir);
        ctx.emit_declarations().unwrap();

        let add = module.get_function("add").unwrap();
        assert_eq!(add.count_params(), 2);
        assert_eq!(add.count_basic_blocks(), 0);
        assert!(module.get_global("counter").is_some());
    }
}
