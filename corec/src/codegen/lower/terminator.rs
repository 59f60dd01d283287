//! Terminator lowering.

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::{NodeId, Terminator};

use super::super::context::CodegenContext;
use super::super::value_map::ValMap;
use super::statement::StatementLowering;
use super::FuncCx;

/// Extension trait for terminator lowering.
pub trait TerminatorLowering<'ctx> {
    /// Lower the terminator of `node`.
    fn lower_terminator(
        &mut self,
        term: &Terminator,
        vmap: &ValMap<'ctx>,
        fcx: &FuncCx<'ctx>,
        node: NodeId,
    ) -> Result<(), Vec<Diagnostic>>;
}

impl<'ctx, 'a> TerminatorLowering<'ctx> for CodegenContext<'ctx, 'a> {
    fn lower_terminator(
        &mut self,
        term: &Terminator,
        vmap: &ValMap<'ctx>,
        fcx: &FuncCx<'ctx>,
        node: NodeId,
    ) -> Result<(), Vec<Diagnostic>> {
        let entity = Entity::Block(node);
        match term {
            Terminator::Jump(target) => {
                let bb = fcx.block(*target)?;
                self.builder
                    .build_unconditional_branch(bb)
                    .map_err(|e| llvm_err(e, entity))?;
            }

            Terminator::Branch {
                cond,
                then_node,
                else_node,
            } => {
                let cond_value = self.eval_operand(cond, vmap, node)?;
                if !cond_value.is_int_value() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "branch condition",
                        entity,
                    })]);
                }
                let then_bb = fcx.block(*then_node)?;
                let else_bb = fcx.block(*else_node)?;
                self.builder
                    .build_conditional_branch(cond_value.into_int_value(), then_bb, else_bb)
                    .map_err(|e| llvm_err(e, entity))?;
            }

            Terminator::Switch {
                discr,
                cases,
                default,
            } => {
                let discr_value = self.eval_operand(discr, vmap, node)?;
                if !discr_value.is_int_value() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "switch discriminant",
                        entity,
                    })]);
                }
                let discr_int = discr_value.into_int_value();
                let default_bb = fcx.block(*default)?;
                let mut llvm_cases = Vec::with_capacity(cases.len());
                for (value, target) in cases {
                    let case_value = discr_int.get_type().const_int(*value, false);
                    llvm_cases.push((case_value, fcx.block(*target)?));
                }
                self.builder
                    .build_switch(discr_int, default_bb, &llvm_cases)
                    .map_err(|e| llvm_err(e, entity))?;
            }

            Terminator::Return(Some(op)) => {
                let value = self.eval_operand(op, vmap, node)?;
                self.builder
                    .build_return(Some(&value))
                    .map_err(|e| llvm_err(e, entity))?;
            }

            Terminator::Return(None) => {
                self.builder
                    .build_return(None)
                    .map_err(|e| llvm_err(e, entity))?;
            }

            Terminator::Unreachable => {
                self.builder
                    .build_unreachable()
                    .map_err(|e| llvm_err(e, entity))?;
            }
        }
        Ok(())
    }
}

fn llvm_err(e: impl std::fmt::Display, entity: Entity) -> Vec<Diagnostic> {
    vec![Diagnostic::error(format!("LLVM builder error: {}", e), entity)]
}
