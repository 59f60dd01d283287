//! # MidIR Function Bodies
//!
//! A function body is a control-flow graph: nodes identified by small
//! integers, each carrying a [`Block`] of statements and a terminator.
//! Variables are assigned with [`Statement::Move`] and may be reassigned
//! across blocks; the code generator is responsible for SSA construction.
//!
//! ## Structure
//!
//! ```text
//! FuncBody
//! └── Block (per node)
//!     ├── Vec<Statement>
//!     │   ├── Move(var, rvalue)
//!     │   ├── Store { addr, value, mutability }
//!     │   ├── Eval(rvalue)
//!     │   └── Nop
//!     └── Terminator
//!         ├── Jump(node)
//!         ├── Branch { cond, then_node, else_node }
//!         ├── Switch { discr, cases, default }
//!         ├── Return(operand?)
//!         └── Unreachable
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::types::{GlobalIdx, Mutability, NodeId, Type, VarId};

// ============================================================================
// Operands and constants
// ============================================================================

/// A constant expression. Lowered by the constant collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    /// Integer constant of the given integer type.
    Int(i128, Type),
    /// Float constant of the given float type.
    Float(f64, Type),
    Bool(bool),
    /// Null pointer of the given pointer type.
    Null(Type),
    /// Undefined value of the given type.
    Undef(Type),
    /// Address of a global (function or variable).
    GlobalAddr(GlobalIdx),
}

impl fmt::Display for ConstExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstExpr::Int(v, ty) => write!(f, "{}: {}", v, ty),
            ConstExpr::Float(v, ty) => write!(f, "{}: {}", v, ty),
            ConstExpr::Bool(b) => write!(f, "{}", b),
            ConstExpr::Null(ty) => write!(f, "null: {}", ty),
            ConstExpr::Undef(ty) => write!(f, "undef: {}", ty),
            ConstExpr::GlobalAddr(idx) => write!(f, "&{}", idx),
        }
    }
}

/// A statement or terminator operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(VarId),
    Const(ConstExpr),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(id) => write!(f, "{}", id),
            Operand::Const(c) => write!(f, "{}", c),
        }
    }
}

// ============================================================================
// Rvalues
// ============================================================================

/// Unary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Binary operation. Signedness and int/float selection come from the
/// operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Comparison operators produce a 1-bit integer instead of the operand
    /// type.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// The right-hand side of a `Move`.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Unary(UnOp, Operand),
    Binary(BinOp, Operand, Operand),
    /// Direct call of a function global.
    Call(GlobalIdx, Vec<Operand>),
    /// Load through a pointer operand.
    Load {
        addr: Operand,
        mutability: Mutability,
        ty: Type,
    },
    /// Build an aggregate of the given struct or array type from operands
    /// in field order.
    Aggregate(Type, Vec<Operand>),
    /// Project a field out of a struct-typed operand.
    Field(Operand, u32),
}

// ============================================================================
// Statements and terminators
// ============================================================================

/// A statement. Statements have exactly one successor: the next statement
/// or the block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Assign a variable. The single definition form the φ planner scans.
    Move(VarId, Rvalue),
    /// Store through a pointer operand.
    Store {
        addr: Operand,
        value: Operand,
        mutability: Mutability,
    },
    /// Evaluate for side effects and discard (e.g. a void call).
    Eval(Rvalue),
    Nop,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Move(id, _) => write!(f, "{} = <rvalue>", id),
            Statement::Store { addr, value, .. } => write!(f, "store {} <- {}", addr, value),
            Statement::Eval(_) => write!(f, "eval"),
            Statement::Nop => write!(f, "nop"),
        }
    }
}

/// The final instruction of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(NodeId),
    Branch {
        cond: Operand,
        then_node: NodeId,
        else_node: NodeId,
    },
    Switch {
        discr: Operand,
        cases: Vec<(u64, NodeId)>,
        default: NodeId,
    },
    Return(Option<Operand>),
    Unreachable,
}

impl Terminator {
    /// Successor nodes in terminator order. This order is also the DFS child
    /// order and the φ wiring order during lowering, so it must stay
    /// deterministic. A node may appear more than once (two switch cases to
    /// one target): each occurrence is a distinct CFG edge.
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_node,
                else_node,
                ..
            } => vec![*then_node, *else_node],
            Terminator::Switch { cases, default, .. } => {
                let mut succ: Vec<NodeId> = cases.iter().map(|(_, node)| *node).collect();
                succ.push(*default);
                succ
            }
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jump {}", target),
            Terminator::Branch {
                cond,
                then_node,
                else_node,
            } => write!(f, "branch {} {} {}", cond, then_node, else_node),
            Terminator::Switch { discr, default, .. } => {
                write!(f, "switch {} default {}", discr, default)
            }
            Terminator::Return(Some(op)) => write!(f, "return {}", op),
            Terminator::Return(None) => write!(f, "return"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

// ============================================================================
// Blocks and bodies
// ============================================================================

/// A basic block: statements followed by a terminator.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
    /// `None` only during construction; validation rejects unterminated
    /// blocks.
    pub terminator: Option<Terminator>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    /// Successor nodes, or empty for an unterminated block.
    pub fn successors(&self) -> Vec<NodeId> {
        match &self.terminator {
            Some(term) => term.successors(),
            None => Vec::new(),
        }
    }

    /// Variable ids assigned by this block, in first-assignment order,
    /// deduplicated.
    pub fn defs(&self) -> Vec<VarId> {
        let mut defs = Vec::new();
        for stmt in &self.statements {
            if let Statement::Move(id, _) = stmt {
                if !defs.contains(id) {
                    defs.push(*id);
                }
            }
        }
        defs
    }
}

/// A function body: an entry node and a block per node.
///
/// Blocks are stored in a `BTreeMap` so every traversal that iterates the
/// table is deterministic.
#[derive(Debug, Clone)]
pub struct FuncBody {
    pub entry: NodeId,
    pub blocks: BTreeMap<NodeId, Block>,
}

impl FuncBody {
    pub fn new(entry: NodeId) -> Self {
        Self {
            entry,
            blocks: BTreeMap::new(),
        }
    }

    pub fn get_block(&self, node: NodeId) -> Option<&Block> {
        self.blocks.get(&node)
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks.keys().copied()
    }

    pub fn is_complete(&self) -> bool {
        self.blocks.values().all(|b| b.is_terminated())
    }

    /// Predecessors of every node, one entry per CFG edge. Nodes with no
    /// predecessors map to an empty list.
    pub fn predecessors(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        let mut preds: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for node in self.node_ids() {
            preds.insert(node, Vec::new());
        }
        for (&node, block) in &self.blocks {
            for succ in block.successors() {
                preds.entry(succ).or_default().push(node);
            }
        }
        preds
    }

    /// Nodes in reverse postorder from the entry. Unreachable nodes are not
    /// included.
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        fn visit(
            body: &FuncBody,
            node: NodeId,
            visited: &mut std::collections::BTreeSet<NodeId>,
            postorder: &mut Vec<NodeId>,
        ) {
            if !visited.insert(node) {
                return;
            }
            if let Some(block) = body.get_block(node) {
                for succ in block.successors() {
                    visit(body, succ, visited, postorder);
                }
            }
            postorder.push(node);
        }

        let mut visited = std::collections::BTreeSet::new();
        let mut postorder = Vec::new();
        visit(self, self.entry, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for constructing function bodies.
pub struct FuncBodyBuilder {
    body: FuncBody,
    current: NodeId,
    next_node: u32,
}

impl FuncBodyBuilder {
    /// Create a builder whose entry node is `L0`.
    pub fn new() -> Self {
        let entry = NodeId::new(0);
        let mut body = FuncBody::new(entry);
        body.blocks.insert(entry, Block::new());
        Self {
            body,
            current: entry,
            next_node: 1,
        }
    }

    /// Allocate a new empty node.
    pub fn new_node(&mut self) -> NodeId {
        let node = NodeId::new(self.next_node);
        self.next_node += 1;
        self.body.blocks.insert(node, Block::new());
        node
    }

    pub fn current_node(&self) -> NodeId {
        self.current
    }

    /// Switch statement emission to a different node.
    pub fn switch_to(&mut self, node: NodeId) {
        self.current = node;
    }

    /// Push a statement onto the current node.
    pub fn push_stmt(&mut self, stmt: Statement) {
        if let Some(block) = self.body.blocks.get_mut(&self.current) {
            block.statements.push(stmt);
        }
    }

    /// Terminate the current node.
    pub fn terminate(&mut self, term: Terminator) {
        if let Some(block) = self.body.blocks.get_mut(&self.current) {
            block.terminator = Some(term);
        }
    }

    pub fn finish(self) -> FuncBody {
        self.body
    }
}

impl Default for FuncBodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
