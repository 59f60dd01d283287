//! Function body lowering.
//!
//! Turns one MidIR CFG into an LLVM function in SSA form:
//!
//! 1. Append a synthetic `entry` block plus one LLVM block `L<n>` per CFG
//!    node, so terminators can reference their successors up front.
//! 2. Plan φs from dominance frontiers and create them, still empty, at the
//!    top of their blocks.
//! 3. Seed the value map in `entry` (parameters bound and aggregate-
//!    expanded, everything else `undef`), wire the entry node's φs for the
//!    synthetic edge, and branch to the CFG entry.
//! 4. Depth-first over the CFG: each block folds its statements over a
//!    private clone of the incoming value map, lowers its terminator, and
//!    contributes one φ incoming per successor edge. φs planned at the
//!    block itself override the incoming bindings first; inside the block
//!    the φ is the authoritative value for its variable.
//!
//! Blocks never reached by the traversal are terminated with `unreachable`
//! so the function stays well-formed.

mod statement;
mod terminator;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValueEnum, PhiValue};

use crate::diagnostics::{Diagnostic, Entity, ErrorCode, LowerError};
use crate::midir::{FuncBody, FuncDecl, GlobalIdx, NodeId, VarId};

pub use statement::StatementLowering;
pub use terminator::TerminatorLowering;

use super::context::{CodegenContext, DeclValue};
use super::phi::plan_phis;
use super::types::TypeLowering;
use super::value_map::{Location, ValMap, ValueTracking};

/// Per-function lowering state shared by the statement and terminator
/// passes.
pub(crate) struct FuncCx<'ctx> {
    /// LLVM block per CFG node.
    pub blocks: BTreeMap<NodeId, BasicBlock<'ctx>>,
    /// Created φs per CFG node, in plan order.
    pub phis: BTreeMap<NodeId, Vec<(VarId, PhiValue<'ctx>)>>,
}

impl<'ctx> FuncCx<'ctx> {
    pub fn block(&self, node: NodeId) -> Result<BasicBlock<'ctx>, Vec<Diagnostic>> {
        self.blocks.get(&node).copied().ok_or_else(|| {
            vec![Diagnostic::from(LowerError::UnknownJumpTarget {
                target: node,
                entity: Entity::Block(node),
            })]
        })
    }
}

/// Extension trait for lowering function bodies.
pub trait FuncLowering<'ctx> {
    /// Lower the body of a declared function.
    fn lower_function(
        &mut self,
        idx: GlobalIdx,
        func: &FuncDecl,
        body: &FuncBody,
    ) -> Result<(), Vec<Diagnostic>>;
}

impl<'ctx, 'a> FuncLowering<'ctx> for CodegenContext<'ctx, 'a> {
    fn lower_function(
        &mut self,
        idx: GlobalIdx,
        func: &FuncDecl,
        body: &FuncBody,
    ) -> Result<(), Vec<Diagnostic>> {
        let fn_value = match self.decl(idx, Entity::Global(idx))? {
            DeclValue::Func(fn_value) => fn_value,
            DeclValue::Var(_) => {
                return Err(vec![Diagnostic::from_error_code(
                    ErrorCode::NotAFunction,
                    Entity::Global(idx),
                )])
            }
        };
        self.current_fn = Some(fn_value);
        tracing::debug!(function = %func.name, blocks = body.blocks.len(), "lowering function");

        // Blocks first, so terminators and φs can reference them.
        let entry_bb = self.context.append_basic_block(fn_value, "entry");
        let mut blocks = BTreeMap::new();
        for node in body.node_ids() {
            let bb = self.context.append_basic_block(fn_value, &node.to_string());
            blocks.insert(node, bb);
        }

        // Create planned φs at the top of their blocks, in plan order.
        let plan = plan_phis(body);
        let mut phis: BTreeMap<NodeId, Vec<(VarId, PhiValue<'ctx>)>> = BTreeMap::new();
        for (node, ids) in plan.iter() {
            let bb = *blocks.get(&node).ok_or_else(|| {
                vec![Diagnostic::from(LowerError::UnknownJumpTarget {
                    target: node,
                    entity: Entity::Block(node),
                })]
            })?;
            self.builder.position_at_end(bb);
            let mut created = Vec::with_capacity(ids.len());
            for &id in ids {
                let ty = func.vars.get(id).cloned().ok_or_else(|| {
                    vec![Diagnostic::from_error_code(
                        ErrorCode::PhiWithoutDef,
                        Entity::BlockVar(node, id),
                    )]
                })?;
                let llvm_ty = self.llvm_type(&ty, Entity::BlockVar(node, id))?;
                let phi = self
                    .builder
                    .build_phi(llvm_ty, &format!("v{}", id.0))
                    .map_err(|e| {
                        vec![Diagnostic::error(
                            format!("LLVM phi error: {}", e),
                            Entity::BlockVar(node, id),
                        )]
                    })?;
                created.push((id, phi));
            }
            phis.insert(node, created);
        }

        let fcx = FuncCx { blocks, phis };

        // Seed the value map in the synthetic entry block, feed the entry
        // node's φs for the synthetic edge, then branch.
        self.builder.position_at_end(entry_bb);
        let vmap = self.seed_value_map(fn_value, func)?;
        if let Some(entry_phis) = fcx.phis.get(&body.entry) {
            let mut seeded = Vec::with_capacity(entry_phis.len());
            for &(id, phi) in entry_phis {
                seeded.push((phi, self.resolve_ssa(&vmap, id)?));
            }
            for (phi, value) in &seeded {
                phi.add_incoming(&[(value, entry_bb)]);
            }
        }
        let target = fcx.block(body.entry)?;
        self.builder
            .build_unconditional_branch(target)
            .map_err(|e| {
                vec![Diagnostic::error(
                    format!("LLVM branch error: {}", e),
                    Entity::Block(body.entry),
                )]
            })?;

        let mut visited = BTreeSet::new();
        self.lower_node(body, &fcx, body.entry, vmap, &mut visited)?;

        // Nodes the traversal never reached still need a terminator.
        for node in body.node_ids() {
            if !visited.contains(&node) {
                self.builder.position_at_end(fcx.block(node)?);
                self.builder.build_unreachable().map_err(|e| {
                    vec![Diagnostic::error(
                        format!("LLVM unreachable error: {}", e),
                        Entity::Block(node),
                    )]
                })?;
            }
        }

        self.current_fn = None;
        Ok(())
    }
}

impl<'ctx, 'a> CodegenContext<'ctx, 'a> {
    fn lower_node(
        &mut self,
        body: &FuncBody,
        fcx: &FuncCx<'ctx>,
        node: NodeId,
        mut vmap: ValMap<'ctx>,
        visited: &mut BTreeSet<NodeId>,
    ) -> Result<(), Vec<Diagnostic>> {
        visited.insert(node);

        // Inside this block the φs are the authoritative bindings, whatever
        // the incoming map says.
        if let Some(phi_list) = fcx.phis.get(&node) {
            for &(id, phi) in phi_list {
                vmap.bind(id, Location::Bind(phi.as_basic_value()));
            }
        }

        let bb = fcx.block(node)?;
        self.builder.position_at_end(bb);

        let block = body.get_block(node).ok_or_else(|| {
            vec![Diagnostic::from(LowerError::UnknownJumpTarget {
                target: node,
                entity: Entity::Block(node),
            })]
        })?;

        for stmt in &block.statements {
            self.lower_statement(stmt, &mut vmap, node)?;
        }

        // Resolve φ incomings for the successors before the terminator goes
        // in: recomposing an expanded aggregate emits instructions, and
        // those must sit inside this block.
        let succs = block.successors();
        let mut incoming: Vec<(PhiValue<'ctx>, BasicValueEnum<'ctx>)> = Vec::new();
        for &succ in &succs {
            if let Some(phi_list) = fcx.phis.get(&succ) {
                for &(id, phi) in phi_list {
                    incoming.push((phi, self.resolve_ssa(&vmap, id)?));
                }
            }
        }

        let term = block.terminator.as_ref().ok_or_else(|| {
            vec![Diagnostic::from_error_code(
                ErrorCode::MissingTerminator,
                Entity::Block(node),
            )]
        })?;
        self.lower_terminator(term, &vmap, fcx, node)?;

        // One incoming per successor edge; a target reached through two
        // edges gets two entries, as LLVM requires.
        for (phi, value) in &incoming {
            phi.add_incoming(&[(value, bb)]);
        }

        for &succ in &succs {
            if !visited.contains(&succ) {
                self.lower_node(body, fcx, succ, vmap.clone(), visited)?;
            }
        }
        Ok(())
    }
}
