//! Module-level facts every check needs: the types of everything in each
//! index space.

use crate::ast::{
    ElemItems, ExternKind, Field, GlobalType, ImportDesc, Index, InstrKind, MemoryType, Module,
    RefType, TableType, TypeSignature, TypeUse,
};
use crate::config::Features;
use crate::error::Diagnostic;
use crate::wat::Span;
use std::collections::HashSet;

#[derive(Debug)]
pub(super) struct Context {
    pub features: Features,
    pub types: Vec<TypeSignature>,
    /// Type index of every function, imports first.
    pub funcs: Vec<u32>,
    pub imported_funcs: usize,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalType>,
    pub imported_globals: usize,
    pub elems: Vec<RefType>,
    pub data_count: u32,
    /// Functions that `ref.func` may name inside a function body.
    pub refs: HashSet<u32>,
}

/// The number behind a resolved index.
pub(super) fn num(index: &Index) -> Result<u32, Diagnostic> {
    match index {
        Index::Num(n, _) => Ok(*n),
        Index::Id(id, span) => Err(Diagnostic::internal(format!("unresolved reference {id} at {span}"))),
    }
}

fn lookup<'a, T>(items: &'a [T], index: &Index, what: &str) -> Result<&'a T, Diagnostic> {
    let n = num(index)?;
    items
        .get(n as usize)
        .ok_or_else(|| Diagnostic::out_of_range(format!("unknown {what} {n}"), index.span()))
}

impl Context {
    pub fn build(module: &Module, features: Features) -> Result<Self, Diagnostic> {
        let mut ctx = Context {
            features,
            types: module
                .fields
                .iter()
                .filter_map(|field| match field {
                    Field::Type(def) => Some(def.sig.signature()),
                    _ => None,
                })
                .collect(),
            funcs: Vec::new(),
            imported_funcs: 0,
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            imported_globals: 0,
            elems: Vec::new(),
            data_count: 0,
            refs: HashSet::new(),
        };

        for field in &module.fields {
            match field {
                Field::Import(import) => match &import.desc {
                    ImportDesc::Func { ty, .. } => {
                        let (index, _) = ctx.typeuse(ty)?;
                        ctx.funcs.push(index);
                        ctx.imported_funcs += 1;
                    }
                    ImportDesc::Table { ty, .. } => ctx.tables.push(*ty),
                    ImportDesc::Memory { ty, .. } => ctx.memories.push(*ty),
                    ImportDesc::Global { ty, .. } => {
                        ctx.globals.push(*ty);
                        ctx.imported_globals += 1;
                    }
                },
                Field::Func(func) => {
                    let (index, _) = ctx.typeuse(&func.ty)?;
                    ctx.funcs.push(index);
                }
                Field::Table(table) => ctx.tables.push(table.ty),
                Field::Memory(memory) => ctx.memories.push(memory.ty),
                Field::Global(global) => {
                    ctx.globals.push(global.ty);
                    ctx.collect_refs(&global.init)?;
                }
                Field::Elem(elem) => {
                    ctx.elems.push(elem.ty);
                    match &elem.items {
                        ElemItems::Funcs(funcs) => {
                            for func in funcs {
                                ctx.refs.insert(num(func)?);
                            }
                        }
                        ElemItems::Exprs(exprs) => {
                            for expr in exprs {
                                ctx.collect_refs(expr)?;
                            }
                        }
                    }
                }
                Field::Data(_) => ctx.data_count += 1,
                Field::Export(export) if export.kind == ExternKind::Func => {
                    ctx.refs.insert(num(&export.index)?);
                }
                Field::Type(_) | Field::Export(_) | Field::Start(_) => {}
            }
        }
        Ok(ctx)
    }

    fn collect_refs(&mut self, expr: &[crate::ast::Instr]) -> Result<(), Diagnostic> {
        for instr in expr {
            if let InstrKind::RefFunc(func) = &instr.kind {
                self.refs.insert(num(func)?);
            }
        }
        Ok(())
    }

    pub fn type_at(&self, index: &Index) -> Result<&TypeSignature, Diagnostic> {
        lookup(&self.types, index, "type")
    }

    /// The index and signature a type use refers to. An inline signature
    /// written next to `(type ...)` must agree with it.
    pub fn typeuse(&self, ty: &TypeUse) -> Result<(u32, TypeSignature), Diagnostic> {
        let Some(index) = &ty.index else {
            return Err(Diagnostic::internal(format!("type use at {} has no index", ty.span)));
        };
        let sig = self.type_at(index)?;
        if let Some(inline) = &ty.inline {
            let written = inline.signature();
            if written != *sig {
                return Err(Diagnostic::type_mismatch(
                    format!("inline signature {written} does not match type {index}: {sig}"),
                    ty.span,
                ));
            }
        }
        Ok((num(index)?, sig.clone()))
    }

    pub fn func_type(&self, index: &Index) -> Result<&TypeSignature, Diagnostic> {
        let type_index = lookup(&self.funcs, index, "function")?;
        self.types
            .get(*type_index as usize)
            .ok_or_else(|| Diagnostic::internal(format!("function {index} has unknown type {type_index}")))
    }

    pub fn table(&self, index: &Index) -> Result<&TableType, Diagnostic> {
        lookup(&self.tables, index, "table")
    }

    /// Memory 0, the only one there can be.
    pub fn memory(&self, span: Span) -> Result<&MemoryType, Diagnostic> {
        self.memories
            .first()
            .ok_or_else(|| Diagnostic::out_of_range("unknown memory 0", span))
    }

    pub fn memory_at(&self, index: &Index) -> Result<&MemoryType, Diagnostic> {
        lookup(&self.memories, index, "memory")
    }

    pub fn global(&self, index: &Index) -> Result<&GlobalType, Diagnostic> {
        lookup(&self.globals, index, "global")
    }

    pub fn elem(&self, index: &Index) -> Result<RefType, Diagnostic> {
        lookup(&self.elems, index, "element segment").copied()
    }

    pub fn data(&self, index: &Index) -> Result<(), Diagnostic> {
        let n = num(index)?;
        if n < self.data_count {
            Ok(())
        } else {
            Err(Diagnostic::out_of_range(format!("unknown data segment {n}"), index.span()))
        }
    }
}
