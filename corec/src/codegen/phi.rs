//! φ placement planning.
//!
//! Computes, for every CFG node, the set of variable ids that need a φ at
//! the top of the node, using dominance frontiers: a definition of `v` in
//! block `B` forces a φ for `v` in every block of `B`'s frontier, and the
//! φ itself counts as a definition, so placement iterates to a fixed point.
//!
//! Dominators come from the Cooper-Harvey-Kennedy iteration over reverse
//! postorder. A virtual root is prepended with a single edge onto the CFG
//! entry: the lowered function has exactly that shape (a synthetic `entry`
//! block branching to the entry node), and it makes a back edge into the
//! entry node behave like any other join.

use std::collections::{BTreeMap, BTreeSet};

use crate::midir::{FuncBody, NodeId, VarId};

/// The φ plan for one function: per node, the variables needing a φ, in
/// ascending id order.
#[derive(Debug, Clone, Default)]
pub struct PhiPlan {
    per_node: BTreeMap<NodeId, Vec<VarId>>,
}

impl PhiPlan {
    /// Variables needing a φ at `node`.
    pub fn at(&self, node: NodeId) -> &[VarId] {
        self.per_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over nodes with a non-empty plan, in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[VarId])> {
        self.per_node.iter().map(|(node, ids)| (*node, ids.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.per_node.is_empty()
    }
}

/// Compute the φ plan for a function body.
pub fn plan_phis(body: &FuncBody) -> PhiPlan {
    // Index space: 0 is the virtual root, reachable nodes follow in
    // reverse postorder.
    let rpo = body.reverse_postorder();
    if rpo.is_empty() {
        return PhiPlan::default();
    }
    let mut pos: BTreeMap<NodeId, usize> = BTreeMap::new();
    for (i, &node) in rpo.iter().enumerate() {
        pos.insert(node, i + 1);
    }

    let raw_preds = body.predecessors();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); rpo.len() + 1];
    preds[1].push(0); // virtual root -> entry
    for (node, node_preds) in &raw_preds {
        let Some(&n) = pos.get(node) else { continue };
        for pred in node_preds {
            // Unreachable predecessors contribute nothing to dominance.
            if let Some(&p) = pos.get(pred) {
                if !preds[n].contains(&p) {
                    preds[n].push(p);
                }
            }
        }
    }

    let idom = immediate_dominators(&preds);
    let frontiers = dominance_frontiers(&preds, &idom);

    // Definition sites per variable, in node order.
    let mut def_sites: BTreeMap<VarId, Vec<usize>> = BTreeMap::new();
    for (&node, block) in &body.blocks {
        let Some(&n) = pos.get(&node) else { continue };
        for id in block.defs() {
            def_sites.entry(id).or_default().push(n);
        }
    }

    // Classic worklist placement: a φ is itself a definition.
    let mut planned: BTreeMap<NodeId, BTreeSet<VarId>> = BTreeMap::new();
    for (&id, sites) in &def_sites {
        let mut has_phi: BTreeSet<usize> = BTreeSet::new();
        let mut worklist: Vec<usize> = sites.clone();
        while let Some(site) = worklist.pop() {
            for &target in &frontiers[site] {
                if has_phi.insert(target) {
                    planned
                        .entry(rpo[target - 1])
                        .or_default()
                        .insert(id);
                    if !sites.contains(&target) {
                        worklist.push(target);
                    }
                }
            }
        }
    }

    PhiPlan {
        per_node: planned
            .into_iter()
            .map(|(node, ids)| (node, ids.into_iter().collect()))
            .collect(),
    }
}

/// Cooper-Harvey-Kennedy immediate dominators. `preds` is indexed by the
/// virtual-root index space; index 0 is the root, which dominates itself.
fn immediate_dominators(preds: &[Vec<usize>]) -> Vec<usize> {
    let len = preds.len();
    let mut idom: Vec<Option<usize>> = vec![None; len];
    idom[0] = Some(0);

    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..len {
            let mut new_idom: Option<usize> = None;
            for &p in &preds[b] {
                if idom[p].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(&idom, p, current),
                });
            }
            if new_idom.is_some() && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }

    // Every node in the index space is reachable from the root, so the
    // fixed point assigns an idom everywhere.
    idom.into_iter().map(|d| d.unwrap_or(0)).collect()
}

fn intersect(idom: &[Option<usize>], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a].unwrap_or(0);
        }
        while b > a {
            b = idom[b].unwrap_or(0);
        }
    }
    a
}

/// Dominance frontier of every node, computed with the standard runner walk
/// over join points.
fn dominance_frontiers(preds: &[Vec<usize>], idom: &[usize]) -> Vec<BTreeSet<usize>> {
    let mut frontiers: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); preds.len()];
    for b in 0..preds.len() {
        if preds[b].len() < 2 {
            continue;
        }
        for &p in &preds[b] {
            let mut runner = p;
            while runner != idom[b] {
                frontiers[runner].insert(b);
                runner = idom[runner];
            }
        }
    }
    frontiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midir::{
        ConstExpr, FuncBodyBuilder, Operand, Rvalue, Statement, Terminator,
    };

    fn move_const(id: u32) -> Statement {
        Statement::Move(
            VarId::new(id),
            Rvalue::Use(Operand::Const(ConstExpr::Int(0, crate::midir::Type::i32()))),
        )
    }

    #[test]
    fn test_straight_line_needs_no_phis() {
        let mut b = FuncBodyBuilder::new();
        let next = b.new_node();
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(next));
        b.switch_to(next);
        b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

        let plan = plan_phis(&b.finish());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_diamond_merges_at_join() {
        let mut b = FuncBodyBuilder::new();
        let then_node = b.new_node();
        let else_node = b.new_node();
        let join = b.new_node();

        b.terminate(Terminator::Branch {
            cond: Operand::Var(VarId::new(0)),
            then_node,
            else_node,
        });
        b.switch_to(then_node);
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(join));
        b.switch_to(else_node);
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(join));
        b.switch_to(join);
        b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

        let plan = plan_phis(&b.finish());
        assert_eq!(plan.at(join), &[VarId::new(1)]);
        assert!(plan.at(then_node).is_empty());
        assert!(plan.at(else_node).is_empty());
    }

    #[test]
    fn test_loop_merges_at_header() {
        // entry -> header; header -> body | exit; body -> header
        let mut b = FuncBodyBuilder::new();
        let header = b.new_node();
        let body_node = b.new_node();
        let exit = b.new_node();

        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(header));
        b.switch_to(header);
        b.terminate(Terminator::Branch {
            cond: Operand::Var(VarId::new(0)),
            then_node: body_node,
            else_node: exit,
        });
        b.switch_to(body_node);
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(header));
        b.switch_to(exit);
        b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

        let plan = plan_phis(&b.finish());
        assert_eq!(plan.at(header), &[VarId::new(1)]);
        assert!(plan.at(exit).is_empty());
    }

    #[test]
    fn test_back_edge_to_entry_merges_at_entry() {
        // entry defines v and the loop re-enters the entry node itself; the
        // synthetic lowered entry block supplies the other incoming edge.
        let mut b = FuncBodyBuilder::new();
        let exit = b.new_node();
        let entry = b.current_node();
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Branch {
            cond: Operand::Var(VarId::new(0)),
            then_node: entry,
            else_node: exit,
        });
        b.switch_to(exit);
        b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

        let plan = plan_phis(&b.finish());
        assert_eq!(plan.at(entry), &[VarId::new(1)]);
    }

    #[test]
    fn test_phi_cascades_into_outer_join() {
        // Two nested diamonds: the φ inserted at the inner join is itself a
        // definition and forces one at the outer join.
        let mut b = FuncBodyBuilder::new();
        let left = b.new_node();
        let right = b.new_node();
        let inner_join = b.new_node();
        let outer_join = b.new_node();

        b.terminate(Terminator::Branch {
            cond: Operand::Var(VarId::new(0)),
            then_node: left,
            else_node: outer_join,
        });
        b.switch_to(left);
        b.terminate(Terminator::Branch {
            cond: Operand::Var(VarId::new(0)),
            then_node: right,
            else_node: inner_join,
        });
        b.switch_to(right);
        b.push_stmt(move_const(1));
        b.terminate(Terminator::Jump(inner_join));
        b.switch_to(inner_join);
        b.terminate(Terminator::Jump(outer_join));
        b.switch_to(outer_join);
        b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

        let plan = plan_phis(&b.finish());
        assert_eq!(plan.at(inner_join), &[VarId::new(1)]);
        assert_eq!(plan.at(outer_join), &[VarId::new(1)]);
    }
}
