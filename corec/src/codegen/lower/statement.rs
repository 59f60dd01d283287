//! Statement lowering.

use inkwell::values::{AggregateValueEnum, BasicMetadataValueEnum, BasicValue, BasicValueEnum};
use inkwell::{FloatPredicate, IntPredicate};

use crate::diagnostics::{Diagnostic, Entity, LowerError};
use crate::midir::{BinOp, NodeId, Operand, Rvalue, Statement, Type, UnOp};

use super::super::consts::ConstLowering;
use super::super::context::{CodegenContext, DeclValue};
use super::super::memory::MemAccess;
use super::super::types::TypeLowering;
use super::super::value_map::{Location, ValMap, ValueTracking};

/// Extension trait for statement lowering.
pub trait StatementLowering<'ctx> {
    /// Lower one statement, threading the value map.
    fn lower_statement(
        &mut self,
        stmt: &Statement,
        vmap: &mut ValMap<'ctx>,
        node: NodeId,
    ) -> Result<(), Vec<Diagnostic>>;

    /// Lower an rvalue. `None` means the rvalue produced no value (a call
    /// to a void function).
    fn eval_rvalue(
        &mut self,
        rvalue: &Rvalue,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>, Vec<Diagnostic>>;

    /// Lower an operand to a single SSA value.
    fn eval_operand(
        &mut self,
        op: &Operand,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>>;

    /// The MidIR type of an operand.
    fn operand_type(
        &self,
        op: &Operand,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<Type, Vec<Diagnostic>>;
}

impl<'ctx, 'a> StatementLowering<'ctx> for CodegenContext<'ctx, 'a> {
    fn lower_statement(
        &mut self,
        stmt: &Statement,
        vmap: &mut ValMap<'ctx>,
        node: NodeId,
    ) -> Result<(), Vec<Diagnostic>> {
        match stmt {
            Statement::Move(id, rvalue) => {
                let entity = Entity::BlockVar(node, *id);
                let value = self.eval_rvalue(rvalue, vmap, node)?.ok_or_else(|| {
                    vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "move from a void call",
                        entity,
                    })]
                })?;
                let ty = vmap.lookup_type(*id).cloned().ok_or_else(|| {
                    vec![Diagnostic::from(LowerError::UndefinedVariable {
                        var: *id,
                        entity,
                    })]
                })?;

                // A memory-resident variable keeps its slot: assignment is
                // a store, not a rebinding.
                let mem = match vmap.lookup(*id) {
                    Some(Location::Mem {
                        mutability, addr, ..
                    }) => Some((*addr, mutability.clone())),
                    _ => None,
                };
                if let Some((addr, mutability)) = mem {
                    self.gen_store(value, addr, &mutability)?;
                    return Ok(());
                }

                if matches!(self.midir.resolve(&ty), Some(Type::Struct { .. })) {
                    self.bind_expanded(vmap, *id, &ty, value)?;
                } else {
                    vmap.bind(*id, Location::Bind(value));
                }
                Ok(())
            }

            Statement::Store {
                addr,
                value,
                mutability,
            } => {
                let addr_value = self.eval_operand(addr, vmap, node)?;
                if !addr_value.is_pointer_value() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "store address",
                        entity: Entity::Block(node),
                    })]);
                }
                let value = self.eval_operand(value, vmap, node)?;
                self.gen_store(value, addr_value.into_pointer_value(), mutability)
            }

            Statement::Eval(rvalue) => {
                self.eval_rvalue(rvalue, vmap, node)?;
                Ok(())
            }

            Statement::Nop => Ok(()),
        }
    }

    fn eval_rvalue(
        &mut self,
        rvalue: &Rvalue,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>, Vec<Diagnostic>> {
        let entity = Entity::Block(node);
        match rvalue {
            Rvalue::Use(op) => Ok(Some(self.eval_operand(op, vmap, node)?)),

            Rvalue::Unary(op, operand) => {
                let value = self.eval_operand(operand, vmap, node)?;
                let result: BasicValueEnum = match (op, value) {
                    (UnOp::Neg, BasicValueEnum::IntValue(v)) => self
                        .builder
                        .build_int_neg(v, "neg")
                        .map_err(|e| llvm_err(e, entity))?
                        .into(),
                    (UnOp::Neg, BasicValueEnum::FloatValue(v)) => self
                        .builder
                        .build_float_neg(v, "neg")
                        .map_err(|e| llvm_err(e, entity))?
                        .into(),
                    (UnOp::Not, BasicValueEnum::IntValue(v)) => self
                        .builder
                        .build_not(v, "not")
                        .map_err(|e| llvm_err(e, entity))?
                        .into(),
                    _ => {
                        return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                            context: "unary operand",
                            entity,
                        })])
                    }
                };
                Ok(Some(result))
            }

            Rvalue::Binary(op, lhs, rhs) => {
                let lhs_ty = self.operand_type(lhs, vmap, node)?;
                let resolved = self.midir.resolve(&lhs_ty).cloned();
                let lhs_value = self.eval_operand(lhs, vmap, node)?;
                let rhs_value = self.eval_operand(rhs, vmap, node)?;
                match resolved {
                    Some(Type::Int { signed, .. }) => {
                        if !lhs_value.is_int_value() || !rhs_value.is_int_value() {
                            return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                                context: "integer binary operand",
                                entity,
                            })]);
                        }
                        self.int_binary(
                            *op,
                            signed,
                            lhs_value.into_int_value(),
                            rhs_value.into_int_value(),
                            entity,
                        )
                        .map(Some)
                    }
                    Some(Type::Float(_)) => {
                        if !lhs_value.is_float_value() || !rhs_value.is_float_value() {
                            return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                                context: "float binary operand",
                                entity,
                            })]);
                        }
                        self.float_binary(
                            *op,
                            lhs_value.into_float_value(),
                            rhs_value.into_float_value(),
                            entity,
                        )
                        .map(Some)
                    }
                    _ => Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "binary operand",
                        entity,
                    })]),
                }
            }

            Rvalue::Call(target, args) => {
                let callee = match self.decl(*target, entity)? {
                    DeclValue::Func(fn_value) => fn_value,
                    DeclValue::Var(_) => {
                        return Err(vec![Diagnostic::from_error_code(
                            crate::diagnostics::ErrorCode::NotAFunction,
                            entity,
                        )])
                    }
                };
                let mut arg_values: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_operand(arg, vmap, node)?.into());
                }
                let call = self
                    .builder
                    .build_call(callee, &arg_values, "")
                    .map_err(|e| llvm_err(e, entity))?;
                Ok(call.try_as_basic_value().left())
            }

            Rvalue::Load {
                addr,
                mutability,
                ty,
            } => {
                let addr_value = self.eval_operand(addr, vmap, node)?;
                if !addr_value.is_pointer_value() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "load address",
                        entity,
                    })]);
                }
                self.gen_load(addr_value.into_pointer_value(), mutability, ty)
                    .map(Some)
            }

            Rvalue::Aggregate(ty, ops) => {
                let llvm_ty = self.llvm_type(ty, entity)?;
                let mut agg: AggregateValueEnum = match llvm_ty {
                    inkwell::types::BasicTypeEnum::StructType(st) => st.get_undef().into(),
                    inkwell::types::BasicTypeEnum::ArrayType(at) => at.get_undef().into(),
                    _ => {
                        return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                            context: "aggregate type",
                            entity,
                        })])
                    }
                };
                for (i, op) in ops.iter().enumerate() {
                    let value = self.eval_operand(op, vmap, node)?;
                    agg = self
                        .builder
                        .build_insert_value(agg, value, i as u32, "agg")
                        .map_err(|e| llvm_err(e, entity))?;
                }
                Ok(Some(agg.as_basic_value_enum()))
            }

            Rvalue::Field(op, index) => {
                // An expanded variable resolves its field without touching
                // the aggregate value at all.
                if let Operand::Var(id) = op {
                    if let Some(Location::Struct(field_ids)) = vmap.lookup(*id) {
                        let field_id =
                            *field_ids.get(*index as usize).ok_or_else(|| {
                                vec![Diagnostic::from(LowerError::FieldIndexOutOfRange {
                                    index: *index,
                                    entity,
                                })]
                            })?;
                        return self.resolve_ssa(vmap, field_id).map(Some);
                    }
                }
                let value = self.eval_operand(op, vmap, node)?;
                if !value.is_struct_value() {
                    return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                        context: "field projection",
                        entity,
                    })]);
                }
                let extracted = self
                    .builder
                    .build_extract_value(value.into_struct_value(), *index, "field")
                    .map_err(|e| llvm_err(e, entity))?;
                Ok(Some(extracted))
            }
        }
    }

    fn eval_operand(
        &mut self,
        op: &Operand,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>> {
        match op {
            Operand::Var(id) => self.resolve_ssa(vmap, *id),
            Operand::Const(c) => Ok(self.gen_const(c, Entity::Block(node))?.0),
        }
    }

    fn operand_type(
        &self,
        op: &Operand,
        vmap: &ValMap<'ctx>,
        node: NodeId,
    ) -> Result<Type, Vec<Diagnostic>> {
        match op {
            Operand::Var(id) => vmap.lookup_type(*id).cloned().ok_or_else(|| {
                vec![Diagnostic::from(LowerError::UndefinedVariable {
                    var: *id,
                    entity: Entity::BlockVar(node, *id),
                })]
            }),
            Operand::Const(c) => self.const_type(c, Entity::Block(node)),
        }
    }
}

fn llvm_err(e: impl std::fmt::Display, entity: Entity) -> Vec<Diagnostic> {
    vec![Diagnostic::error(format!("LLVM builder error: {}", e), entity)]
}

impl<'ctx, 'a> CodegenContext<'ctx, 'a> {
    fn int_binary(
        &mut self,
        op: BinOp,
        signed: bool,
        lhs: inkwell::values::IntValue<'ctx>,
        rhs: inkwell::values::IntValue<'ctx>,
        entity: Entity,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>> {
        if op.is_comparison() {
            let pred = match (op, signed) {
                (BinOp::Eq, _) => IntPredicate::EQ,
                (BinOp::Ne, _) => IntPredicate::NE,
                (BinOp::Lt, true) => IntPredicate::SLT,
                (BinOp::Lt, false) => IntPredicate::ULT,
                (BinOp::Le, true) => IntPredicate::SLE,
                (BinOp::Le, false) => IntPredicate::ULE,
                (BinOp::Gt, true) => IntPredicate::SGT,
                (BinOp::Gt, false) => IntPredicate::UGT,
                (BinOp::Ge, true) => IntPredicate::SGE,
                (BinOp::Ge, false) => IntPredicate::UGE,
                _ => unreachable!("non-comparison handled below"),
            };
            return Ok(self
                .builder
                .build_int_compare(pred, lhs, rhs, "cmp")
                .map_err(|e| llvm_err(e, entity))?
                .into());
        }

        let b = self.builder;
        let result = match op {
            BinOp::Add => b.build_int_add(lhs, rhs, "add"),
            BinOp::Sub => b.build_int_sub(lhs, rhs, "sub"),
            BinOp::Mul => b.build_int_mul(lhs, rhs, "mul"),
            BinOp::Div if signed => b.build_int_signed_div(lhs, rhs, "div"),
            BinOp::Div => b.build_int_unsigned_div(lhs, rhs, "div"),
            BinOp::Rem if signed => b.build_int_signed_rem(lhs, rhs, "rem"),
            BinOp::Rem => b.build_int_unsigned_rem(lhs, rhs, "rem"),
            BinOp::And => b.build_and(lhs, rhs, "and"),
            BinOp::Or => b.build_or(lhs, rhs, "or"),
            BinOp::Xor => b.build_xor(lhs, rhs, "xor"),
            BinOp::Shl => b.build_left_shift(lhs, rhs, "shl"),
            BinOp::Shr => b.build_right_shift(lhs, rhs, signed, "shr"),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                unreachable!("comparisons handled above")
            }
        };
        Ok(result.map_err(|e| llvm_err(e, entity))?.into())
    }

    fn float_binary(
        &mut self,
        op: BinOp,
        lhs: inkwell::values::FloatValue<'ctx>,
        rhs: inkwell::values::FloatValue<'ctx>,
        entity: Entity,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>> {
        if op.is_comparison() {
            let pred = match op {
                BinOp::Eq => FloatPredicate::OEQ,
                BinOp::Ne => FloatPredicate::ONE,
                BinOp::Lt => FloatPredicate::OLT,
                BinOp::Le => FloatPredicate::OLE,
                BinOp::Gt => FloatPredicate::OGT,
                BinOp::Ge => FloatPredicate::OGE,
                _ => unreachable!("non-comparison handled below"),
            };
            return Ok(self
                .builder
                .build_float_compare(pred, lhs, rhs, "fcmp")
                .map_err(|e| llvm_err(e, entity))?
                .into());
        }

        let b = self.builder;
        let result = match op {
            BinOp::Add => b.build_float_add(lhs, rhs, "fadd"),
            BinOp::Sub => b.build_float_sub(lhs, rhs, "fsub"),
            BinOp::Mul => b.build_float_mul(lhs, rhs, "fmul"),
            BinOp::Div => b.build_float_div(lhs, rhs, "fdiv"),
            BinOp::Rem => b.build_float_rem(lhs, rhs, "frem"),
            _ => {
                return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                    context: "bitwise operation on float",
                    entity,
                })])
            }
        };
        Ok(result.map_err(|e| llvm_err(e, entity))?.into())
    }
}
