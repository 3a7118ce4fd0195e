//! Name resolution: every symbolic reference becomes a numeric index.
//!
//! The first pass numbers each index space in declaration order (imports
//! first, which the parser guarantees by rejecting late imports) and binds
//! names. The second pass builds a new module in which every [`Index::Id`]
//! that refers to something has been replaced by [`Index::Num`]. Labels
//! become relative depths.
//!
//! Definitions keep their names so the encoder can emit a `name` section.
//! Resolving an already resolved module returns an identical module.
//!
//! ```
//! use watc::{parser, resolve, Config};
//!
//! let module = parser::parse("(module (func $a call $b) (func $b))", &Config::default()).unwrap();
//! let resolved = resolve::resolve(&module).unwrap();
//! assert_eq!(resolve::resolve(&resolved).unwrap(), resolved);
//! ```

pub mod scope;

use crate::ast::{
    Data, DataMode, Elem, ElemItems, ElemMode, Export, Expr, ExternKind, Field, Func, Global,
    Import, ImportDesc, Index, Instr, InstrKind, Module, Start, TypeDef, TypeUse,
};
use crate::error::Diagnostic;
use log::{debug, trace};
use scope::{LabelStack, SymbolTable};

/// Resolve every reference in `module`, returning a new module.
pub fn resolve(module: &Module) -> Result<Module, Diagnostic> {
    let spaces = Spaces::collect(module)?;
    debug!(
        "resolving {} types, {} functions, {} tables, {} memories, {} globals",
        spaces.types.len(),
        spaces.funcs.len(),
        spaces.tables.len(),
        spaces.memories.len(),
        spaces.globals.len()
    );

    let resolver = Resolver {
        spaces: &spaces,
        type_defs: module
            .fields
            .iter()
            .filter_map(|field| match field {
                Field::Type(def) => Some(def),
                _ => None,
            })
            .collect(),
    };
    let fields = module
        .fields
        .iter()
        .map(|field| resolver.field(field))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Module {
        id: module.id.clone(),
        fields,
        span: module.span,
    })
}

/// The module-level index spaces.
struct Spaces {
    types: SymbolTable,
    funcs: SymbolTable,
    tables: SymbolTable,
    memories: SymbolTable,
    globals: SymbolTable,
    elems: SymbolTable,
    datas: SymbolTable,
}

impl Spaces {
    fn collect(module: &Module) -> Result<Self, Diagnostic> {
        let mut spaces = Spaces {
            types: SymbolTable::new("type"),
            funcs: SymbolTable::new("function"),
            tables: SymbolTable::new("table"),
            memories: SymbolTable::new("memory"),
            globals: SymbolTable::new("global"),
            elems: SymbolTable::new("element segment"),
            datas: SymbolTable::new("data segment"),
        };

        for field in &module.fields {
            let span = field.span();
            match field {
                Field::Type(def) => spaces.types.push(def.id.as_ref(), span)?,
                Field::Import(import) => {
                    let id = import.desc.id();
                    match import.desc.kind() {
                        ExternKind::Func => spaces.funcs.push(id, span)?,
                        ExternKind::Table => spaces.tables.push(id, span)?,
                        ExternKind::Memory => spaces.memories.push(id, span)?,
                        ExternKind::Global => spaces.globals.push(id, span)?,
                    }
                }
                Field::Func(func) => spaces.funcs.push(func.id.as_ref(), span)?,
                Field::Table(table) => spaces.tables.push(table.id.as_ref(), span)?,
                Field::Memory(memory) => spaces.memories.push(memory.id.as_ref(), span)?,
                Field::Global(global) => spaces.globals.push(global.id.as_ref(), span)?,
                Field::Elem(elem) => spaces.elems.push(elem.id.as_ref(), span)?,
                Field::Data(data) => spaces.datas.push(data.id.as_ref(), span)?,
                Field::Export(_) | Field::Start(_) => continue,
            };
        }
        Ok(spaces)
    }

    fn for_kind(&self, kind: ExternKind) -> &SymbolTable {
        match kind {
            ExternKind::Func => &self.funcs,
            ExternKind::Table => &self.tables,
            ExternKind::Memory => &self.memories,
            ExternKind::Global => &self.globals,
        }
    }
}

struct Resolver<'m> {
    spaces: &'m Spaces,
    /// Type definitions by index, for counting the parameters of functions
    /// that only name their type.
    type_defs: Vec<&'m TypeDef>,
}

impl Resolver<'_> {
    fn field(&self, field: &Field) -> Result<Field, Diagnostic> {
        Ok(match field {
            Field::Type(def) => Field::Type(def.clone()),
            Field::Import(import) => Field::Import(Import {
                desc: match &import.desc {
                    ImportDesc::Func { id, ty } => ImportDesc::Func {
                        id: id.clone(),
                        ty: self.typeuse(ty)?,
                    },
                    other => other.clone(),
                },
                ..import.clone()
            }),
            Field::Func(func) => Field::Func(self.func(func)?),
            Field::Table(table) => Field::Table(table.clone()),
            Field::Memory(memory) => Field::Memory(memory.clone()),
            Field::Global(global) => Field::Global(Global {
                init: self.const_expr(&global.init)?,
                ..global.clone()
            }),
            Field::Export(export) => Field::Export(Export {
                index: self.spaces.for_kind(export.kind).resolve(&export.index)?,
                ..export.clone()
            }),
            Field::Start(start) => Field::Start(Start {
                func: self.spaces.funcs.resolve(&start.func)?,
                span: start.span,
            }),
            Field::Elem(elem) => Field::Elem(self.elem(elem)?),
            Field::Data(data) => Field::Data(Data {
                mode: match &data.mode {
                    DataMode::Passive => DataMode::Passive,
                    DataMode::Active { memory, offset } => DataMode::Active {
                        memory: self.spaces.memories.resolve(memory)?,
                        offset: self.const_expr(offset)?,
                    },
                },
                ..data.clone()
            }),
        })
    }

    fn typeuse(&self, ty: &TypeUse) -> Result<TypeUse, Diagnostic> {
        Ok(TypeUse {
            index: ty.index.as_ref().map(|i| self.spaces.types.resolve(i)).transpose()?,
            inline: ty.inline.clone(),
            span: ty.span,
        })
    }

    fn func(&self, func: &Func) -> Result<Func, Diagnostic> {
        trace!("resolving function {}", func.id.as_ref().map_or_else(|| "<anon>".to_string(), ToString::to_string));
        let ty = self.typeuse(&func.ty)?;

        let mut locals = SymbolTable::new("local");
        match &ty.inline {
            Some(sig) => {
                for param in &sig.params {
                    locals.push(param.id.as_ref(), func.span)?;
                }
            }
            None => {
                // Unnamed parameters from the referenced type. An index out
                // of range is reported by the validator.
                let count = ty
                    .index
                    .as_ref()
                    .and_then(Index::as_num)
                    .and_then(|n| self.type_defs.get(n as usize))
                    .map_or(0, |def| def.sig.params.len());
                for _ in 0..count {
                    locals.push(None, func.span)?;
                }
            }
        }
        for local in &func.locals {
            locals.push(local.id.as_ref(), func.span)?;
        }

        let mut labels = LabelStack::for_function();
        let body = self.body(&func.body, Some(&locals), &mut labels)?;
        Ok(Func {
            id: func.id.clone(),
            ty,
            locals: func.locals.clone(),
            body,
            span: func.span,
        })
    }

    fn elem(&self, elem: &Elem) -> Result<Elem, Diagnostic> {
        let mode = match &elem.mode {
            ElemMode::Active { table, offset } => ElemMode::Active {
                table: self.spaces.tables.resolve(table)?,
                offset: self.const_expr(offset)?,
            },
            other => other.clone(),
        };
        let items = match &elem.items {
            ElemItems::Funcs(funcs) => ElemItems::Funcs(
                funcs
                    .iter()
                    .map(|f| self.spaces.funcs.resolve(f))
                    .collect::<Result<_, _>>()?,
            ),
            ElemItems::Exprs(exprs) => ElemItems::Exprs(
                exprs
                    .iter()
                    .map(|e| self.const_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(Elem {
            id: elem.id.clone(),
            mode,
            ty: elem.ty,
            items,
            span: elem.span,
        })
    }

    /// Constant expressions see no locals and no labels.
    fn const_expr(&self, expr: &Expr) -> Result<Expr, Diagnostic> {
        self.body(expr, None, &mut LabelStack::empty())
    }

    fn body(&self, instrs: &[Instr], locals: Option<&SymbolTable>, labels: &mut LabelStack) -> Result<Expr, Diagnostic> {
        let mut out = Vec::with_capacity(instrs.len());
        let mut scope = labels.scope();
        for instr in instrs {
            match &instr.kind {
                InstrKind::Block { label, ty } | InstrKind::Loop { label, ty } | InstrKind::If { label, ty } => {
                    let ty = self.typeuse(ty)?;
                    let kind = match &instr.kind {
                        InstrKind::Block { .. } => InstrKind::Block { label: label.clone(), ty },
                        InstrKind::Loop { .. } => InstrKind::Loop { label: label.clone(), ty },
                        _ => InstrKind::If { label: label.clone(), ty },
                    };
                    out.push(Instr::new(kind, instr.span));
                    scope.push(label.clone());
                }
                // A stray `end` pops nothing and is left for the validator
                // to report.
                InstrKind::End => {
                    scope.pop();
                    out.push(instr.clone());
                }
                _ => out.push(Instr::new(self.instr(&instr.kind, locals, &scope)?, instr.span)),
            }
        }
        Ok(out)
    }

    fn instr(&self, kind: &InstrKind, locals: Option<&SymbolTable>, labels: &LabelStack) -> Result<InstrKind, Diagnostic> {
        use InstrKind as I;

        let spaces = self.spaces;
        let local = |index: &Index| match locals {
            Some(locals) => locals.resolve(index),
            None => match index {
                Index::Num(..) => Ok(index.clone()),
                Index::Id(id, span) => Err(Diagnostic::unresolved(format!("unknown local {id}"), *span)),
            },
        };

        Ok(match kind {
            I::Br(label) => I::Br(labels.resolve(label)?),
            I::BrIf(label) => I::BrIf(labels.resolve(label)?),
            I::BrTable { targets, default } => I::BrTable {
                targets: targets.iter().map(|t| labels.resolve(t)).collect::<Result<_, _>>()?,
                default: labels.resolve(default)?,
            },
            I::Call(func) => I::Call(spaces.funcs.resolve(func)?),
            I::CallIndirect { table, ty } => I::CallIndirect {
                table: spaces.tables.resolve(table)?,
                ty: self.typeuse(ty)?,
            },

            I::LocalGet(index) => I::LocalGet(local(index)?),
            I::LocalSet(index) => I::LocalSet(local(index)?),
            I::LocalTee(index) => I::LocalTee(local(index)?),
            I::GlobalGet(index) => I::GlobalGet(spaces.globals.resolve(index)?),
            I::GlobalSet(index) => I::GlobalSet(spaces.globals.resolve(index)?),

            I::TableGet(table) => I::TableGet(spaces.tables.resolve(table)?),
            I::TableSet(table) => I::TableSet(spaces.tables.resolve(table)?),
            I::TableSize(table) => I::TableSize(spaces.tables.resolve(table)?),
            I::TableGrow(table) => I::TableGrow(spaces.tables.resolve(table)?),
            I::TableFill(table) => I::TableFill(spaces.tables.resolve(table)?),
            I::TableCopy { dst, src } => I::TableCopy {
                dst: spaces.tables.resolve(dst)?,
                src: spaces.tables.resolve(src)?,
            },
            I::TableInit { table, elem } => I::TableInit {
                table: spaces.tables.resolve(table)?,
                elem: spaces.elems.resolve(elem)?,
            },
            I::ElemDrop(elem) => I::ElemDrop(spaces.elems.resolve(elem)?),

            I::MemoryInit(data) => I::MemoryInit(spaces.datas.resolve(data)?),
            I::DataDrop(data) => I::DataDrop(spaces.datas.resolve(data)?),
            I::RefFunc(func) => I::RefFunc(spaces.funcs.resolve(func)?),

            other => other.clone(),
        })
    }
}
