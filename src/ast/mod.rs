//! Syntax tree for a WAT module.
//!
//! The parser produces this tree with inline abbreviations already expanded.
//! References may still be symbolic ([`Index::Id`]); the resolver returns a
//! copy in which every reference is numeric.

pub mod instr;
pub mod ops;
pub mod types;

pub use instr::{Instr, InstrKind, MemArg};
pub use types::{GlobalType, Limits, MemoryType, RefType, TableType, TypeSignature, ValType};

use crate::wat::Span;
use std::fmt;

/// A symbolic name, written `$name` and stored without the `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id(pub String);

impl Id {
    pub fn new(name: impl Into<String>) -> Self {
        Id(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A reference into an index space, by number or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Num(u32, Span),
    Id(Id, Span),
}

impl Index {
    pub fn span(&self) -> Span {
        match self {
            Index::Num(_, span) | Index::Id(_, span) => *span,
        }
    }

    /// The numeric index, if already resolved.
    pub fn as_num(&self) -> Option<u32> {
        match self {
            Index::Num(n, _) => Some(*n),
            Index::Id(..) => None,
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Num(n, _) => write!(f, "{n}"),
            Index::Id(id, _) => write!(f, "{id}"),
        }
    }
}

pub type Expr = Vec<Instr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: Option<Id>,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Type(TypeDef),
    Import(Import),
    Func(Func),
    Table(Table),
    Memory(Memory),
    Global(Global),
    Export(Export),
    Start(Start),
    Elem(Elem),
    Data(Data),
}

impl Field {
    pub fn span(&self) -> Span {
        match self {
            Field::Type(f) => f.span,
            Field::Import(f) => f.span,
            Field::Func(f) => f.span,
            Field::Table(f) => f.span,
            Field::Memory(f) => f.span,
            Field::Global(f) => f.span,
            Field::Export(f) => f.span,
            Field::Start(f) => f.span,
            Field::Elem(f) => f.span,
            Field::Data(f) => f.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub id: Option<Id>,
    pub ty: ValType,
}

/// A function signature as written, with optional parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncSig {
    pub params: Vec<Param>,
    pub results: Vec<ValType>,
}

impl FuncSig {
    /// The signature without names.
    pub fn signature(&self) -> TypeSignature {
        TypeSignature::new(self.params.iter().map(|p| p.ty).collect(), self.results.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub id: Option<Id>,
    pub sig: FuncSig,
    /// Added for a type use that named no existing type.
    pub implicit: bool,
    pub span: Span,
}

/// A reference to a function type: `(type $t)`, inline params and results,
/// or both.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeUse {
    pub index: Option<Index>,
    pub inline: Option<FuncSig>,
    pub span: Span,
}

impl TypeUse {
    pub fn empty(span: Span) -> Self {
        Self {
            index: None,
            inline: None,
            span,
        }
    }

    /// Block types with no parameters and at most one result are encoded
    /// without a type index.
    pub fn is_short_block_type(&self) -> bool {
        self.index.is_none()
            && self
                .inline
                .as_ref()
                .map_or(true, |sig| sig.params.is_empty() && sig.results.len() <= 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func { id: Option<Id>, ty: TypeUse },
    Table { id: Option<Id>, ty: TableType },
    Memory { id: Option<Id>, ty: MemoryType },
    Global { id: Option<Id>, ty: GlobalType },
}

impl ImportDesc {
    pub fn kind(&self) -> ExternKind {
        match self {
            ImportDesc::Func { .. } => ExternKind::Func,
            ImportDesc::Table { .. } => ExternKind::Table,
            ImportDesc::Memory { .. } => ExternKind::Memory,
            ImportDesc::Global { .. } => ExternKind::Global,
        }
    }

    pub fn id(&self) -> Option<&Id> {
        match self {
            ImportDesc::Func { id, .. }
            | ImportDesc::Table { id, .. }
            | ImportDesc::Memory { id, .. }
            | ImportDesc::Global { id, .. } => id.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub id: Option<Id>,
    pub ty: ValType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub id: Option<Id>,
    pub ty: TypeUse,
    pub locals: Vec<Local>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: Option<Id>,
    pub ty: TableType,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub id: Option<Id>,
    pub ty: MemoryType,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub id: Option<Id>,
    pub ty: GlobalType,
    pub init: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
}

impl ExternKind {
    pub fn name(self) -> &'static str {
        match self {
            ExternKind::Func => "func",
            ExternKind::Table => "table",
            ExternKind::Memory => "memory",
            ExternKind::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: Index,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    pub func: Index,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Elem {
    pub id: Option<Id>,
    pub mode: ElemMode,
    pub ty: RefType,
    pub items: ElemItems,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemMode {
    Passive,
    Declarative,
    Active { table: Index, offset: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemItems {
    /// Function indices, the `func $f $g` form.
    Funcs(Vec<Index>),
    /// One constant expression per element.
    Exprs(Vec<Expr>),
}

impl ElemItems {
    pub fn len(&self) -> usize {
        match self {
            ElemItems::Funcs(funcs) => funcs.len(),
            ElemItems::Exprs(exprs) => exprs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub id: Option<Id>,
    pub mode: DataMode,
    pub bytes: Vec<u8>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Passive,
    Active { memory: Index, offset: Expr },
}
