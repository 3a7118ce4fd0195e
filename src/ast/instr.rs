//! Instructions in flat form.
//!
//! Folded syntax is flattened by the parser, so a body is a plain sequence in
//! which `block`, `loop` and `if` are closed by explicit `Else`/`End` markers.
//! The implicit `end` that terminates a whole function body or constant
//! expression is not stored.

use super::ops::{LoadOp, NumOp, StoreOp};
use super::types::{RefType, ValType};
use super::{Id, Index, TypeUse};
use crate::wat::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    pub span: Span,
}

impl Instr {
    pub fn new(kind: InstrKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Memory immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub offset: u32,
    /// Log2 of the alignment in bytes.
    pub align: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    // Control
    Unreachable,
    Nop,
    Block { label: Option<Id>, ty: TypeUse },
    Loop { label: Option<Id>, ty: TypeUse },
    If { label: Option<Id>, ty: TypeUse },
    Else,
    End,
    Br(Index),
    BrIf(Index),
    BrTable { targets: Vec<Index>, default: Index },
    Return,
    Call(Index),
    CallIndirect { table: Index, ty: TypeUse },

    // Parametric
    Drop,
    /// `select`, or `select (result t)` when typed.
    Select(Option<Vec<ValType>>),

    // Variables
    LocalGet(Index),
    LocalSet(Index),
    LocalTee(Index),
    GlobalGet(Index),
    GlobalSet(Index),

    // Tables
    TableGet(Index),
    TableSet(Index),
    TableSize(Index),
    TableGrow(Index),
    TableFill(Index),
    TableCopy { dst: Index, src: Index },
    TableInit { table: Index, elem: Index },
    ElemDrop(Index),

    // Memory
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,
    MemoryFill,
    MemoryCopy,
    MemoryInit(Index),
    DataDrop(Index),

    // Constants, floats stored as raw bits
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),

    // References
    RefNull(RefType),
    RefIsNull,
    RefFunc(Index),

    Numeric(NumOp),
}

impl InstrKind {
    /// The instruction's mnemonic, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            InstrKind::Unreachable => "unreachable",
            InstrKind::Nop => "nop",
            InstrKind::Block { .. } => "block",
            InstrKind::Loop { .. } => "loop",
            InstrKind::If { .. } => "if",
            InstrKind::Else => "else",
            InstrKind::End => "end",
            InstrKind::Br(_) => "br",
            InstrKind::BrIf(_) => "br_if",
            InstrKind::BrTable { .. } => "br_table",
            InstrKind::Return => "return",
            InstrKind::Call(_) => "call",
            InstrKind::CallIndirect { .. } => "call_indirect",
            InstrKind::Drop => "drop",
            InstrKind::Select(_) => "select",
            InstrKind::LocalGet(_) => "local.get",
            InstrKind::LocalSet(_) => "local.set",
            InstrKind::LocalTee(_) => "local.tee",
            InstrKind::GlobalGet(_) => "global.get",
            InstrKind::GlobalSet(_) => "global.set",
            InstrKind::TableGet(_) => "table.get",
            InstrKind::TableSet(_) => "table.set",
            InstrKind::TableSize(_) => "table.size",
            InstrKind::TableGrow(_) => "table.grow",
            InstrKind::TableFill(_) => "table.fill",
            InstrKind::TableCopy { .. } => "table.copy",
            InstrKind::TableInit { .. } => "table.init",
            InstrKind::ElemDrop(_) => "elem.drop",
            InstrKind::Load(op, _) => op.mnemonic(),
            InstrKind::Store(op, _) => op.mnemonic(),
            InstrKind::MemorySize => "memory.size",
            InstrKind::MemoryGrow => "memory.grow",
            InstrKind::MemoryFill => "memory.fill",
            InstrKind::MemoryCopy => "memory.copy",
            InstrKind::MemoryInit(_) => "memory.init",
            InstrKind::DataDrop(_) => "data.drop",
            InstrKind::I32Const(_) => "i32.const",
            InstrKind::I64Const(_) => "i64.const",
            InstrKind::F32Const(_) => "f32.const",
            InstrKind::F64Const(_) => "f64.const",
            InstrKind::RefNull(_) => "ref.null",
            InstrKind::RefIsNull => "ref.is_null",
            InstrKind::RefFunc(_) => "ref.func",
            InstrKind::Numeric(op) => op.mnemonic(),
        }
    }

    /// True for `block`, `loop` and `if`, which open a label scope.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            InstrKind::Block { .. } | InstrKind::Loop { .. } | InstrKind::If { .. }
        )
    }
}
