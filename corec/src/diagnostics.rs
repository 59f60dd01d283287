//! Diagnostic reporting infrastructure.
//!
//! MidIR carries no source spans; it is produced by a front-end that has
//! already reported anything user-facing. Diagnostics from this crate locate
//! problems by *entity* instead: a type table index, a global index, a CFG
//! node, or a variable id. All lowering errors are fatal; the module is
//! abandoned on the first one. Only structural validation accumulates more
//! than one diagnostic per run.
//!
//! # Error Codes
//!
//! - **E0500-E0599**: Malformed types (bad widths, dangling indices)
//! - **E0600-E0699**: Malformed IR (undefined variables, broken CFG edges)
//! - **E0700-E0799**: Internal invariant violations

use std::fmt;

use thiserror::Error;

use crate::midir::{GcHeaderIdx, GlobalIdx, NodeId, TypeIdx, VarId};

/// Compiler error codes.
///
/// - E0500-E0599: Malformed types
/// - E0600-E0699: Malformed IR
/// - E0700-E0799: Invariant violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // ============================================================
    // Malformed types (E0500-E0599)
    // ============================================================
    /// Integer width that cannot be materialised.
    UnsupportedIntWidth = 500,
    /// Float width outside {32, 64, 128}.
    UnsupportedFloatWidth = 501,
    /// Named type index past the end of the type table.
    DanglingTypeIndex = 502,
    /// GC header index past the end of the header table.
    DanglingGcHeader = 503,
    /// Named types that contain each other without pointer indirection.
    UnsizedTypeCycle = 504,

    // ============================================================
    // Malformed IR (E0600-E0699)
    // ============================================================
    /// Statement or terminator references a variable with no declared type.
    UndefinedVariable = 600,
    /// CFG entry node has no block.
    MissingEntryBlock = 601,
    /// Terminator targets a node with no block.
    UnknownJumpTarget = 602,
    /// Field projection index past the end of the struct.
    FieldIndexOutOfRange = 603,
    /// Global index past the end of the global table.
    DanglingGlobalIndex = 604,
    /// Block without a terminator.
    MissingTerminator = 605,
    /// Operand type does not fit the operation.
    TypeMismatch = 606,
    /// Call target is not a function global.
    NotAFunction = 607,

    // ============================================================
    // Invariant violations (E0700-E0799)
    // ============================================================
    /// Value map lookup miss after seeding.
    ValueMapMiss = 700,
    /// φ plan names a variable never defined in the body.
    PhiWithoutDef = 701,
    /// Aggregate expansion produced a struct location for a scalar variable.
    AggregateLeafExpected = 702,
}

impl ErrorCode {
    /// Get the formatted error code string (e.g., "E0502").
    pub fn as_str(&self) -> String {
        format!("E{:04}", *self as u16)
    }

    /// Get a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedIntWidth => "unsupported integer width",
            ErrorCode::UnsupportedFloatWidth => "float width must be 32, 64 or 128",
            ErrorCode::DanglingTypeIndex => "named type index out of range",
            ErrorCode::DanglingGcHeader => "GC header index out of range",
            ErrorCode::UnsizedTypeCycle => "named types form a cycle without indirection",
            ErrorCode::UndefinedVariable => "variable is not declared by the function",
            ErrorCode::MissingEntryBlock => "function body has no entry block",
            ErrorCode::UnknownJumpTarget => "terminator targets an unknown block",
            ErrorCode::FieldIndexOutOfRange => "field index out of range for struct",
            ErrorCode::DanglingGlobalIndex => "global index out of range",
            ErrorCode::MissingTerminator => "basic block has no terminator",
            ErrorCode::TypeMismatch => "operand type does not fit the operation",
            ErrorCode::NotAFunction => "call target is not a function",
            ErrorCode::ValueMapMiss => "value map has no binding for variable",
            ErrorCode::PhiWithoutDef => "phi planned for a variable with no definition",
            ErrorCode::AggregateLeafExpected => "aggregate expansion did not bottom out",
        }
    }
}

/// The entity a diagnostic is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// The module as a whole.
    Module,
    /// An entry in the named-type table.
    Type(TypeIdx),
    /// An entry in the global table.
    Global(GlobalIdx),
    /// An entry in the GC header table.
    GcHeader(GcHeaderIdx),
    /// A CFG node of the function currently being lowered.
    Block(NodeId),
    /// A variable of the function currently being lowered.
    Var(VarId),
    /// A variable at a specific CFG node.
    BlockVar(NodeId, VarId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Module => write!(f, "module"),
            Entity::Type(idx) => write!(f, "type {}", idx),
            Entity::Global(idx) => write!(f, "global {}", idx),
            Entity::GcHeader(idx) => write!(f, "gc header {}", idx),
            Entity::Block(node) => write!(f, "block {}", node),
            Entity::Var(var) => write!(f, "variable {}", var),
            Entity::BlockVar(node, var) => write!(f, "variable {} in block {}", var, node),
        }
    }
}

/// The kind of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An error that aborts lowering of the module.
    Error,
    /// A warning. Lowering trusts its input, so none are currently emitted.
    Warning,
}

/// A compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The kind of diagnostic.
    pub kind: DiagnosticKind,
    /// The error code (e.g., "E0502").
    pub code: Option<String>,
    /// The main message.
    pub message: String,
    /// The entity the diagnostic is attached to.
    pub entity: Entity,
    /// Additional context lines.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>, entity: Entity) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code: None,
            message: message.into(),
            entity,
            notes: Vec::new(),
        }
    }

    /// Set the error code from an ErrorCode enum.
    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code.as_str());
        self
    }

    /// Create an error diagnostic from an ErrorCode with its standard message.
    pub fn from_error_code(code: ErrorCode, entity: Entity) -> Self {
        Self::error(code.description(), entity).with_error_code(code)
    }

    /// Add a note to help explain the error.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {} ({})", code, self.message, self.entity)?,
            None => write!(f, "{} ({})", self.message, self.entity)?,
        }
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        Ok(())
    }
}

/// Common lowering errors with a fixed shape.
///
/// Ad-hoc failures (LLVM builder errors and the like) construct a
/// [`Diagnostic`] directly; these variants cover the places where the same
/// error is raised from more than one site.
#[derive(Debug, Clone, Error)]
pub enum LowerError {
    #[error("named type index {idx} out of range")]
    DanglingTypeIndex { idx: TypeIdx, entity: Entity },

    #[error("GC header index {idx} out of range")]
    DanglingGcHeader { idx: GcHeaderIdx, entity: Entity },

    #[error("global index {idx} out of range")]
    DanglingGlobalIndex { idx: GlobalIdx, entity: Entity },

    #[error("variable {var} is not declared by the function")]
    UndefinedVariable { var: VarId, entity: Entity },

    #[error("no binding for variable {var}")]
    ValueMapMiss { var: VarId, entity: Entity },

    #[error("terminator targets unknown block {target}")]
    UnknownJumpTarget { target: NodeId, entity: Entity },

    #[error("field index {index} out of range")]
    FieldIndexOutOfRange { index: u32, entity: Entity },

    #[error("{context}: operand type does not fit the operation")]
    TypeMismatch { context: &'static str, entity: Entity },
}

impl LowerError {
    fn code(&self) -> ErrorCode {
        match self {
            LowerError::DanglingTypeIndex { .. } => ErrorCode::DanglingTypeIndex,
            LowerError::DanglingGcHeader { .. } => ErrorCode::DanglingGcHeader,
            LowerError::DanglingGlobalIndex { .. } => ErrorCode::DanglingGlobalIndex,
            LowerError::UndefinedVariable { .. } => ErrorCode::UndefinedVariable,
            LowerError::ValueMapMiss { .. } => ErrorCode::ValueMapMiss,
            LowerError::UnknownJumpTarget { .. } => ErrorCode::UnknownJumpTarget,
            LowerError::FieldIndexOutOfRange { .. } => ErrorCode::FieldIndexOutOfRange,
            LowerError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
        }
    }

    fn entity(&self) -> Entity {
        match self {
            LowerError::DanglingTypeIndex { entity, .. }
            | LowerError::DanglingGcHeader { entity, .. }
            | LowerError::DanglingGlobalIndex { entity, .. }
            | LowerError::UndefinedVariable { entity, .. }
            | LowerError::ValueMapMiss { entity, .. }
            | LowerError::UnknownJumpTarget { entity, .. }
            | LowerError::FieldIndexOutOfRange { entity, .. }
            | LowerError::TypeMismatch { entity, .. } => *entity,
        }
    }
}

impl From<LowerError> for Diagnostic {
    fn from(error: LowerError) -> Self {
        let entity = error.entity();
        let code = error.code();
        Diagnostic::error(error.to_string(), entity).with_error_code(code)
    }
}
