//! Variable locations and the value map.
//!
//! During function lowering every MidIR variable has a [`Location`]: an SSA
//! value, a memory slot, or, for struct-typed variables, a tuple of field
//! variables minted during aggregate expansion. The [`ValMap`] snapshot a
//! block observes is independent of its siblings': the DFS clones the map
//! at every branch point, so rebinding in one arm never leaks into another.
//!
//! Synthetic ids minted for aggregate fields start past the declared
//! variable range and are never reused within a function.

use std::collections::HashMap;

use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, PointerValue};

use crate::diagnostics::{Diagnostic, Entity, ErrorCode, LowerError};
use crate::midir::{FuncDecl, Mutability, Type, VarId};

use super::context::CodegenContext;
use super::memory::MemAccess;
use super::types::TypeLowering;

/// The representation of one variable at one program point.
#[derive(Debug, Clone)]
pub enum Location<'ctx> {
    /// The variable currently is the given SSA value.
    Bind(BasicValueEnum<'ctx>),
    /// The variable lives in memory; loads and stores go through the
    /// memory-access collaborator with the recorded mutability.
    Mem {
        ty: Type,
        mutability: Mutability,
        addr: PointerValue<'ctx>,
    },
    /// A struct-typed variable expanded into per-field variables, in field
    /// order. The leaves of the expansion are always non-struct locations.
    Struct(Vec<VarId>),
}

/// Mapping from variable id to location, plus the synthetic-id counter.
#[derive(Debug, Clone)]
pub struct ValMap<'ctx> {
    locations: HashMap<VarId, Location<'ctx>>,
    types: HashMap<VarId, Type>,
    next_id: u32,
}

impl<'ctx> ValMap<'ctx> {
    /// Create an empty map whose synthetic ids start at `next_free`.
    pub fn new(next_free: VarId) -> Self {
        Self {
            locations: HashMap::new(),
            types: HashMap::new(),
            next_id: next_free.0,
        }
    }

    pub fn lookup(&self, id: VarId) -> Option<&Location<'ctx>> {
        self.locations.get(&id)
    }

    pub fn lookup_type(&self, id: VarId) -> Option<&Type> {
        self.types.get(&id)
    }

    /// Record a variable's type without binding a location yet.
    pub fn declare(&mut self, id: VarId, ty: Type) {
        self.types.insert(id, ty);
    }

    /// (Re)bind a variable.
    pub fn bind(&mut self, id: VarId, loc: Location<'ctx>) {
        self.locations.insert(id, loc);
    }

    /// Mint a fresh synthetic id of the given type.
    pub fn fresh(&mut self, ty: Type) -> VarId {
        let id = VarId::new(self.next_id);
        self.next_id += 1;
        self.types.insert(id, ty);
        id
    }
}

/// Extension trait for seeding and resolving the value map.
pub trait ValueTracking<'ctx> {
    /// Build the entry-block value map of a function: parameters bound (and
    /// expanded when struct-typed), every other declared variable seeded to
    /// `undef` of its type.
    fn seed_value_map(
        &mut self,
        fn_value: FunctionValue<'ctx>,
        func: &FuncDecl,
    ) -> Result<ValMap<'ctx>, Vec<Diagnostic>>;

    /// Bind `value` to `id`, expanding struct-typed values into per-field
    /// synthetic variables.
    fn bind_expanded(
        &mut self,
        vmap: &mut ValMap<'ctx>,
        id: VarId,
        ty: &Type,
        value: BasicValueEnum<'ctx>,
    ) -> Result<(), Vec<Diagnostic>>;

    /// Bind `id` to `undef` of its type, expanding structs.
    fn bind_undef(
        &mut self,
        vmap: &mut ValMap<'ctx>,
        id: VarId,
        ty: &Type,
    ) -> Result<(), Vec<Diagnostic>>;

    /// Resolve a variable to a single SSA value: binds are returned as-is,
    /// memory locations are loaded, expanded structs are recomposed.
    fn resolve_ssa(
        &mut self,
        vmap: &ValMap<'ctx>,
        id: VarId,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>>;
}

impl<'ctx, 'a> ValueTracking<'ctx> for CodegenContext<'ctx, 'a> {
    fn seed_value_map(
        &mut self,
        fn_value: FunctionValue<'ctx>,
        func: &FuncDecl,
    ) -> Result<ValMap<'ctx>, Vec<Diagnostic>> {
        let mut vmap = ValMap::new(func.vars.next_free());
        for (id, ty) in func.vars.iter() {
            vmap.declare(id, ty.clone());
        }

        // Parameters first, in declaration order.
        for (i, &param) in func.params.iter().enumerate() {
            let value = fn_value.get_nth_param(i as u32).ok_or_else(|| {
                vec![Diagnostic::error(
                    format!("function has no parameter {}", i),
                    Entity::Var(param),
                )]
            })?;
            let ty = func
                .vars
                .get(param)
                .cloned()
                .ok_or_else(|| {
                    vec![Diagnostic::from(LowerError::UndefinedVariable {
                        var: param,
                        entity: Entity::Var(param),
                    })]
                })?;
            self.bind_expanded(&mut vmap, param, &ty, value)?;
        }

        // Everything else starts undefined.
        for (id, ty) in func.vars.iter() {
            if vmap.lookup(id).is_none() {
                self.bind_undef(&mut vmap, id, ty)?;
            }
        }
        Ok(vmap)
    }

    fn bind_expanded(
        &mut self,
        vmap: &mut ValMap<'ctx>,
        id: VarId,
        ty: &Type,
        value: BasicValueEnum<'ctx>,
    ) -> Result<(), Vec<Diagnostic>> {
        let resolved = match self.midir.resolve(ty) {
            Some(resolved) => resolved.clone(),
            // Opaque named types carry no structure to expand.
            None => {
                vmap.bind(id, Location::Bind(value));
                return Ok(());
            }
        };

        if let Type::Struct { fields, .. } = resolved {
            if !value.is_struct_value() {
                return Err(vec![Diagnostic::from(LowerError::TypeMismatch {
                    context: "aggregate expansion",
                    entity: Entity::Var(id),
                })]);
            }
            let struct_value = value.into_struct_value();
            let mut field_ids = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                let extracted = self
                    .builder
                    .build_extract_value(struct_value, i as u32, &field.name)
                    .map_err(|e| {
                        vec![Diagnostic::error(
                            format!("LLVM extractvalue error: {}", e),
                            Entity::Var(id),
                        )]
                    })?;
                let field_id = vmap.fresh(field.ty.clone());
                self.bind_expanded(vmap, field_id, &field.ty, extracted)?;
                field_ids.push(field_id);
            }
            vmap.bind(id, Location::Struct(field_ids));
        } else {
            vmap.bind(id, Location::Bind(value));
        }
        Ok(())
    }

    fn bind_undef(
        &mut self,
        vmap: &mut ValMap<'ctx>,
        id: VarId,
        ty: &Type,
    ) -> Result<(), Vec<Diagnostic>> {
        let resolved = match self.midir.resolve(ty) {
            Some(resolved) => resolved.clone(),
            None => {
                let llvm_ty = self.llvm_type(ty, Entity::Var(id))?;
                vmap.bind(id, Location::Bind(self.undef_of(llvm_ty)));
                return Ok(());
            }
        };

        if let Type::Struct { fields, .. } = resolved {
            let mut field_ids = Vec::with_capacity(fields.len());
            for field in &fields {
                let field_id = vmap.fresh(field.ty.clone());
                self.bind_undef(vmap, field_id, &field.ty)?;
                field_ids.push(field_id);
            }
            vmap.bind(id, Location::Struct(field_ids));
        } else {
            let llvm_ty = self.llvm_type(ty, Entity::Var(id))?;
            vmap.bind(id, Location::Bind(self.undef_of(llvm_ty)));
        }
        Ok(())
    }

    fn resolve_ssa(
        &mut self,
        vmap: &ValMap<'ctx>,
        id: VarId,
    ) -> Result<BasicValueEnum<'ctx>, Vec<Diagnostic>> {
        let loc = vmap
            .lookup(id)
            .ok_or_else(|| {
                vec![Diagnostic::from(LowerError::ValueMapMiss {
                    var: id,
                    entity: Entity::Var(id),
                })]
            })?
            .clone();

        match loc {
            Location::Bind(value) => Ok(value),
            Location::Mem {
                ty,
                mutability,
                addr,
            } => self.gen_load(addr, &mutability, &ty),
            Location::Struct(field_ids) => {
                let ty = vmap.lookup_type(id).cloned().ok_or_else(|| {
                    vec![Diagnostic::from(LowerError::ValueMapMiss {
                        var: id,
                        entity: Entity::Var(id),
                    })]
                })?;
                let resolved = self.midir.resolve(&ty).cloned();
                let fields = match resolved {
                    Some(Type::Struct { fields, .. }) if fields.len() == field_ids.len() => fields,
                    // A struct location for a variable whose type is not a
                    // struct of matching arity means expansion went wrong.
                    _ => {
                        return Err(vec![Diagnostic::from_error_code(
                            ErrorCode::AggregateLeafExpected,
                            Entity::Var(id),
                        )])
                    }
                };

                let llvm_ty = self.llvm_type(&ty, Entity::Var(id))?;
                let mut agg = self.undef_of(llvm_ty);
                for (i, &field_id) in field_ids.iter().enumerate() {
                    let field_value = self.resolve_ssa(vmap, field_id)?;
                    let inserted = self
                        .builder
                        .build_insert_value(
                            agg.into_struct_value(),
                            field_value,
                            i as u32,
                            &fields[i].name,
                        )
                        .map_err(|e| {
                            vec![Diagnostic::error(
                                format!("LLVM insertvalue error: {}", e),
                                Entity::Var(id),
                            )]
                        })?;
                    agg = inserted.as_basic_value_enum();
                }
                Ok(agg)
            }
        }
    }
}
