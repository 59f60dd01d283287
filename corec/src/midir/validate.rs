//! Structural validation of a MidIR module.
//!
//! Code generation trusts its input; this pass is where that trust is
//! earned. It walks the three module tables and every function body, and
//! accumulates one diagnostic per defect. Lowering itself fails fast; this
//! is the only phase that keeps going after the first error.

use crate::diagnostics::{Diagnostic, Entity, ErrorCode};

use super::body::{ConstExpr, FuncBody, Operand, Rvalue, Statement, Terminator};
use super::types::{
    FuncDecl, GcHeaderIdx, Global, GlobalIdx, Module, NodeId, Pointee, Type, TypeIdx, VarId,
};

/// Validate a module. Returns every defect found, or `Ok` if the module is
/// structurally sound.
pub fn validate_module(module: &Module) -> Result<(), Vec<Diagnostic>> {
    let mut v = Validator {
        module,
        errors: Vec::new(),
    };
    v.check_types();
    v.check_gc_headers();
    v.check_globals();
    if v.errors.is_empty() {
        Ok(())
    } else {
        Err(v.errors)
    }
}

struct Validator<'a> {
    module: &'a Module,
    errors: Vec<Diagnostic>,
}

/// Colors for the unsized-cycle walk over the named-type table.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

impl<'a> Validator<'a> {
    fn check_types(&mut self) {
        for (i, entry) in self.module.types.iter().enumerate() {
            let entity = Entity::Type(TypeIdx::new(i as u32));
            if let Some(body) = &entry.body {
                self.check_type(body, entity);
            }
        }

        // Named types that contain each other by value never terminate
        // layout; only pointer indirection breaks the cycle.
        let mut marks = vec![Mark::White; self.module.types.len()];
        for i in 0..self.module.types.len() {
            self.walk_for_cycles(TypeIdx::new(i as u32), &mut marks);
        }
    }

    fn walk_for_cycles(&mut self, idx: TypeIdx, marks: &mut [Mark]) {
        let slot = idx.index();
        match marks.get(slot).copied() {
            None | Some(Mark::Black) => return,
            Some(Mark::Grey) => {
                self.errors.push(Diagnostic::from_error_code(
                    ErrorCode::UnsizedTypeCycle,
                    Entity::Type(idx),
                ));
                return;
            }
            Some(Mark::White) => {}
        }
        marks[slot] = Mark::Grey;
        if let Some(body) = self.module.types[slot].body.clone() {
            self.walk_value_refs(&body, marks);
        }
        marks[slot] = Mark::Black;
    }

    /// Visit named types reachable from `ty` without crossing a pointer.
    fn walk_value_refs(&mut self, ty: &Type, marks: &mut [Mark]) {
        match ty {
            Type::Named(idx) => self.walk_for_cycles(*idx, marks),
            Type::Array { element, .. } => self.walk_value_refs(element, marks),
            Type::Struct { fields, .. } => {
                for field in fields {
                    self.walk_value_refs(&field.ty, marks);
                }
            }
            Type::Int { .. } | Type::Float(_) | Type::Ptr(_) => {}
        }
    }

    fn check_type(&mut self, ty: &Type, entity: Entity) {
        match ty {
            Type::Int { width, .. } => {
                if *width == 0 {
                    self.errors.push(
                        Diagnostic::from_error_code(ErrorCode::UnsupportedIntWidth, entity)
                            .with_note("integer width must be at least 1"),
                    );
                }
            }
            Type::Float(width) => {
                if !matches!(width, 32 | 64 | 128) {
                    self.errors.push(
                        Diagnostic::from_error_code(ErrorCode::UnsupportedFloatWidth, entity)
                            .with_note(format!("found f{}", width)),
                    );
                }
            }
            Type::Ptr(Pointee::Basic(inner)) => self.check_type(inner, entity),
            Type::Ptr(Pointee::Gc(_, header)) => {
                if self.module.gc_header(*header).is_none() {
                    self.errors.push(Diagnostic::from_error_code(
                        ErrorCode::DanglingGcHeader,
                        entity,
                    ));
                }
            }
            Type::Array { element, .. } => self.check_type(element, entity),
            Type::Struct { fields, .. } => {
                for field in fields {
                    self.check_type(&field.ty, entity);
                }
            }
            Type::Named(idx) => {
                if self.module.named_type(*idx).is_none() {
                    self.errors.push(
                        Diagnostic::from_error_code(ErrorCode::DanglingTypeIndex, entity)
                            .with_note(format!("no entry for {}", idx)),
                    );
                }
            }
        }
    }

    fn check_gc_headers(&mut self) {
        for (i, header) in self.module.gc_headers.iter().enumerate() {
            let entity = Entity::GcHeader(GcHeaderIdx::new(i as u32));
            if self.module.named_type(header.ty).is_none() {
                self.errors.push(
                    Diagnostic::from_error_code(ErrorCode::DanglingTypeIndex, entity)
                        .with_note(format!("header targets {}", header.ty)),
                );
            }
        }
    }

    fn check_globals(&mut self) {
        for (i, global) in self.module.globals.iter().enumerate() {
            let entity = Entity::Global(GlobalIdx::new(i as u32));
            match global {
                Global::Var(var) => self.check_type(&var.ty, entity),
                Global::Func(func) => {
                    if let Some(ret) = &func.ret {
                        self.check_type(ret, entity);
                    }
                    for (_, ty) in func.vars.iter() {
                        self.check_type(ty, entity);
                    }
                    for &param in &func.params {
                        if func.vars.get(param).is_none() {
                            self.errors.push(
                                Diagnostic::from_error_code(ErrorCode::UndefinedVariable, entity)
                                    .with_note(format!("parameter {}", param)),
                            );
                        }
                    }
                    if let Some(body) = &func.body {
                        self.check_body(func, body);
                    }
                }
            }
        }
    }

    fn check_body(&mut self, func: &FuncDecl, body: &FuncBody) {
        if body.get_block(body.entry).is_none() {
            self.errors.push(Diagnostic::from_error_code(
                ErrorCode::MissingEntryBlock,
                Entity::Block(body.entry),
            ));
        }

        for (&node, block) in &body.blocks {
            let entity = Entity::Block(node);
            for stmt in &block.statements {
                self.check_statement(func, stmt, entity);
            }
            match &block.terminator {
                None => {
                    self.errors.push(Diagnostic::from_error_code(
                        ErrorCode::MissingTerminator,
                        entity,
                    ));
                }
                Some(term) => self.check_terminator(func, body, term, entity),
            }
        }
    }

    fn check_statement(&mut self, func: &FuncDecl, stmt: &Statement, entity: Entity) {
        match stmt {
            Statement::Move(id, rvalue) => {
                self.check_var(func, *id, entity);
                self.check_rvalue(func, rvalue, entity);
            }
            Statement::Store { addr, value, .. } => {
                self.check_operand(func, addr, entity);
                self.check_operand(func, value, entity);
            }
            Statement::Eval(rvalue) => self.check_rvalue(func, rvalue, entity),
            Statement::Nop => {}
        }
    }

    fn check_terminator(
        &mut self,
        func: &FuncDecl,
        body: &FuncBody,
        term: &Terminator,
        entity: Entity,
    ) {
        for target in term.successors() {
            if body.get_block(target).is_none() {
                self.errors.push(
                    Diagnostic::from_error_code(ErrorCode::UnknownJumpTarget, entity)
                        .with_note(format!("target {}", target)),
                );
            }
        }
        match term {
            Terminator::Branch { cond, .. } => self.check_operand(func, cond, entity),
            Terminator::Switch { discr, .. } => self.check_operand(func, discr, entity),
            Terminator::Return(Some(op)) => self.check_operand(func, op, entity),
            _ => {}
        }
    }

    fn check_rvalue(&mut self, func: &FuncDecl, rvalue: &Rvalue, entity: Entity) {
        match rvalue {
            Rvalue::Use(op) | Rvalue::Unary(_, op) => self.check_operand(func, op, entity),
            Rvalue::Binary(_, lhs, rhs) => {
                self.check_operand(func, lhs, entity);
                self.check_operand(func, rhs, entity);
            }
            Rvalue::Call(target, args) => {
                match self.module.global(*target) {
                    None => {
                        self.errors.push(Diagnostic::from_error_code(
                            ErrorCode::DanglingGlobalIndex,
                            entity,
                        ));
                    }
                    Some(Global::Var(_)) => {
                        self.errors.push(
                            Diagnostic::from_error_code(ErrorCode::NotAFunction, entity)
                                .with_note(format!("call target {}", target)),
                        );
                    }
                    Some(Global::Func(_)) => {}
                }
                for arg in args {
                    self.check_operand(func, arg, entity);
                }
            }
            Rvalue::Load { addr, ty, .. } => {
                self.check_operand(func, addr, entity);
                self.check_type(ty, entity);
            }
            Rvalue::Aggregate(ty, ops) => {
                self.check_type(ty, entity);
                for op in ops {
                    self.check_operand(func, op, entity);
                }
            }
            Rvalue::Field(op, index) => {
                self.check_operand(func, op, entity);
                // Only variable operands can have their struct shape checked
                // here; constants carry their own type.
                if let Operand::Var(id) = op {
                    if let Some(ty) = func.vars.get(*id) {
                        if let Some(Type::Struct { fields, .. }) = self.module.resolve(ty) {
                            if *index as usize >= fields.len() {
                                self.errors.push(
                                    Diagnostic::from_error_code(
                                        ErrorCode::FieldIndexOutOfRange,
                                        entity,
                                    )
                                    .with_note(format!(
                                        "index {} on struct with {} fields",
                                        index,
                                        fields.len()
                                    )),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn check_operand(&mut self, func: &FuncDecl, op: &Operand, entity: Entity) {
        match op {
            Operand::Var(id) => self.check_var(func, *id, entity),
            Operand::Const(c) => self.check_const(c, entity),
        }
    }

    fn check_var(&mut self, func: &FuncDecl, id: VarId, entity: Entity) {
        if func.vars.get(id).is_none() {
            self.errors.push(
                Diagnostic::from_error_code(ErrorCode::UndefinedVariable, entity)
                    .with_note(format!("variable {}", id)),
            );
        }
    }

    fn check_const(&mut self, c: &ConstExpr, entity: Entity) {
        match c {
            ConstExpr::Int(_, ty)
            | ConstExpr::Float(_, ty)
            | ConstExpr::Null(ty)
            | ConstExpr::Undef(ty) => self.check_type(ty, entity),
            ConstExpr::Bool(_) => {}
            ConstExpr::GlobalAddr(idx) => {
                if self.module.global(*idx).is_none() {
                    self.errors.push(Diagnostic::from_error_code(
                        ErrorCode::DanglingGlobalIndex,
                        entity,
                    ));
                }
            }
        }
    }
}
