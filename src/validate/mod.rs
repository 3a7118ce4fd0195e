//! Validation of a resolved module.
//!
//! Module-level checks (limits, exports, segments, constant expressions)
//! run first, then every function body is type-checked with an abstract
//! operand stack. The result is a [`ValidatedModule`], the only thing the
//! encoder accepts.

mod code;
mod const_expr;
mod context;

use crate::ast::{
    DataMode, ElemItems, ElemMode, ExternKind, Field, ImportDesc, InstrKind, Limits, Module, RefType, ValType,
};
use crate::config::Config;
use crate::error::Diagnostic;
use crate::wat::Span;
use context::Context;
use log::{debug, trace};
use std::collections::HashSet;

/// Largest memory, in 64KiB pages.
const MAX_PAGES: u32 = 65536;

/// A module that passed validation, with the facts the encoder needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedModule {
    module: Module,
    func_types: Vec<u32>,
    uses_data_count: bool,
}

impl ValidatedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Type index of each defined (not imported) function, in order.
    pub fn func_types(&self) -> &[u32] {
        &self.func_types
    }

    /// True when some body uses `memory.init` or `data.drop`, which requires
    /// a data count section.
    pub fn needs_data_count(&self) -> bool {
        self.uses_data_count
    }
}

pub fn validate(module: &Module, config: &Config) -> Result<ValidatedModule, Diagnostic> {
    let features = config.features;
    let ctx = Context::build(module, features)?;
    debug!(
        "validating {} types, {} functions, {} globals",
        ctx.types.len(),
        ctx.funcs.len(),
        ctx.globals.len()
    );

    if ctx.memories.len() > 1 {
        return Err(Diagnostic::out_of_range(
            "multiple memories are not supported",
            second_span(module, ExternKind::Memory),
        ));
    }
    if ctx.tables.len() > 1 && !features.reference_types {
        return Err(Diagnostic::out_of_range(
            "multiple tables require the reference-types feature",
            second_span(module, ExternKind::Table),
        ));
    }

    let mut export_names = HashSet::new();
    let mut func_types = Vec::new();
    let mut uses_data_count = false;

    for field in &module.fields {
        match field {
            Field::Type(def) => {
                if def.sig.results.len() > 1 && !features.multi_value {
                    return Err(Diagnostic::type_mismatch(
                        format!("{} results require the multi-value feature", def.sig.results.len()),
                        def.span,
                    ));
                }
            }
            Field::Import(import) => match &import.desc {
                ImportDesc::Table { ty, .. } => check_limits(&ty.limits, u32::MAX, "table", import.span)?,
                ImportDesc::Memory { ty, .. } => check_limits(&ty.limits, MAX_PAGES, "memory", import.span)?,
                ImportDesc::Func { .. } | ImportDesc::Global { .. } => {}
            },
            Field::Func(func) => {
                let (index, sig) = ctx.typeuse(&func.ty)?;
                trace!(
                    "function {}: {sig}, {} locals, {} instructions",
                    ctx.imported_funcs + func_types.len(),
                    func.locals.len(),
                    func.body.len()
                );
                code::validate_func(&ctx, func, &sig)?;
                uses_data_count |= func
                    .body
                    .iter()
                    .any(|instr| matches!(instr.kind, InstrKind::MemoryInit(_) | InstrKind::DataDrop(_)));
                func_types.push(index);
            }
            Field::Table(table) => check_limits(&table.ty.limits, u32::MAX, "table", table.span)?,
            Field::Memory(memory) => check_limits(&memory.ty.limits, MAX_PAGES, "memory", memory.span)?,
            Field::Global(global) => {
                const_expr::check(&ctx, &global.init, global.ty.ty, "global initialiser", global.span)?;
            }
            Field::Export(export) => {
                if !export_names.insert(export.name.as_str()) {
                    return Err(Diagnostic::duplicate(
                        format!("duplicate export name {:?}", export.name),
                        export.span,
                    ));
                }
                match export.kind {
                    ExternKind::Func => {
                        ctx.func_type(&export.index)?;
                    }
                    ExternKind::Table => {
                        ctx.table(&export.index)?;
                    }
                    ExternKind::Memory => {
                        ctx.memory_at(&export.index)?;
                    }
                    ExternKind::Global => {
                        ctx.global(&export.index)?;
                    }
                }
            }
            Field::Start(start) => {
                let sig = ctx.func_type(&start.func)?;
                if !sig.params.is_empty() || !sig.results.is_empty() {
                    return Err(Diagnostic::type_mismatch(
                        format!("start function must have type [] -> [], found {sig}"),
                        start.span,
                    ));
                }
            }
            Field::Elem(elem) => {
                if let ElemMode::Active { table, offset } = &elem.mode {
                    let table_ty = ctx.table(table)?;
                    if table_ty.elem != elem.ty {
                        return Err(Diagnostic::type_mismatch(
                            format!("table {table} holds {}, segment holds {}", table_ty.elem, elem.ty),
                            elem.span,
                        ));
                    }
                    const_expr::check(&ctx, offset, ValType::I32, "element offset", elem.span)?;
                }
                match &elem.items {
                    ElemItems::Funcs(funcs) => {
                        if elem.ty != RefType::Func {
                            return Err(Diagnostic::type_mismatch(
                                format!("function indices in a {} segment", elem.ty),
                                elem.span,
                            ));
                        }
                        for func in funcs {
                            ctx.func_type(func)?;
                        }
                    }
                    ElemItems::Exprs(exprs) => {
                        for expr in exprs {
                            const_expr::check(&ctx, expr, elem.ty.val_type(), "element item", elem.span)?;
                        }
                    }
                }
            }
            Field::Data(data) => {
                if let DataMode::Active { memory, offset } = &data.mode {
                    ctx.memory_at(memory)?;
                    const_expr::check(&ctx, offset, ValType::I32, "data offset", data.span)?;
                }
            }
        }
    }

    debug!("validated {} function bodies", func_types.len());
    Ok(ValidatedModule {
        module: module.clone(),
        func_types,
        uses_data_count,
    })
}

fn check_limits(limits: &Limits, bound: u32, what: &str, span: Span) -> Result<(), Diagnostic> {
    if let Some(max) = limits.max {
        if limits.min > max {
            return Err(Diagnostic::out_of_range(
                format!("{what} minimum {} is larger than maximum {max}", limits.min),
                span,
            ));
        }
        if max > bound {
            return Err(Diagnostic::out_of_range(
                format!("{what} maximum {max} exceeds the limit of {bound}"),
                span,
            ));
        }
    }
    if limits.min > bound {
        return Err(Diagnostic::out_of_range(
            format!("{what} minimum {} exceeds the limit of {bound}", limits.min),
            span,
        ));
    }
    Ok(())
}

/// Where the second table or memory is declared, for the "too many" errors.
fn second_span(module: &Module, kind: ExternKind) -> Span {
    module
        .fields
        .iter()
        .filter(|field| match field {
            Field::Import(import) => import.desc.kind() == kind,
            Field::Table(_) => kind == ExternKind::Table,
            Field::Memory(_) => kind == ExternKind::Memory,
            _ => false,
        })
        .nth(1)
        .map_or(module.span, Field::span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::error::ErrorKind;
    use crate::parser::parse;
    use crate::resolve::resolve;
    use rstest::rstest;

    fn run(source: &str, config: &Config) -> Result<ValidatedModule, Diagnostic> {
        validate(&resolve(&parse(source, config)?)?, config)
    }

    #[test]
    fn side_tables() {
        let validated = run(
            r#"(module
                 (import "e" "f" (func (param i32)))
                 (func (param i32))
                 (func (result i64) (i64.const 0))
                 (memory 1) (data $d "abc")
                 (func (data.drop $d)))"#,
            &Config::default(),
        )
        .unwrap();
        assert_eq!(validated.func_types(), &[0, 1, 2]);
        assert!(validated.needs_data_count());
        assert!(matches!(validated.module().fields[0], Field::Import(_)));
    }

    #[test]
    fn no_data_count_without_bulk_instructions() {
        let validated = run(r#"(module (memory 1) (data (i32.const 0) "x"))"#, &Config::default()).unwrap();
        assert!(!validated.needs_data_count());
    }

    #[rstest]
    #[case("(memory 2 1)", ErrorKind::IndexOutOfRange)]
    #[case("(memory 65537)", ErrorKind::IndexOutOfRange)]
    #[case("(memory 0 65537)", ErrorKind::IndexOutOfRange)]
    #[case("(table 3 2 funcref)", ErrorKind::IndexOutOfRange)]
    #[case("(memory 1) (memory 1)", ErrorKind::IndexOutOfRange)]
    #[case("(import \"e\" \"m\" (memory 1)) (memory 1)", ErrorKind::IndexOutOfRange)]
    #[case("(func) (export \"a\" (func 0)) (export \"a\" (func 0))", ErrorKind::DuplicateSymbol)]
    #[case("(export \"a\" (func 0))", ErrorKind::IndexOutOfRange)]
    #[case("(export \"m\" (memory 0))", ErrorKind::IndexOutOfRange)]
    #[case("(func (param i32)) (start 0)", ErrorKind::TypeMismatch)]
    #[case("(start 0)", ErrorKind::IndexOutOfRange)]
    #[case("(elem (i32.const 0) func 0)", ErrorKind::IndexOutOfRange)]
    #[case("(table 1 funcref) (elem (i32.const 0) func 3)", ErrorKind::IndexOutOfRange)]
    #[case("(data (i32.const 0) \"x\")", ErrorKind::IndexOutOfRange)]
    fn module_errors(#[case] fields: &str, #[case] kind: ErrorKind) {
        let err = run(&format!("(module {fields})"), &Config::default()).unwrap_err();
        assert_eq!(err.kind, kind, "{fields}: {err}");
    }

    #[rstest]
    #[case("(memory 0 65536)")]
    #[case("(table 0 funcref) (table 0 externref)")]
    #[case("(func) (start 0) (export \"f\" (func 0)) (export \"g\" (func 0))")]
    #[case("(table 2 funcref) (func $f) (elem (i32.const 1) $f)")]
    #[case("(table $t 1 externref) (elem (table $t) (i32.const 0) externref (ref.null extern))")]
    fn module_accepted(#[case] fields: &str) {
        if let Err(err) = run(&format!("(module {fields})"), &Config::default()) {
            panic!("{fields}: {err}");
        }
    }

    #[test]
    fn multiple_tables_need_reference_types() {
        let config = Config {
            features: Features {
                reference_types: false,
                ..Features::all()
            },
            ..Config::default()
        };
        let err = run("(module (table 1 funcref) (table 1 funcref))", &config).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn duplicate_export_names_the_export() {
        let err = run(
            r#"(module (func $a (export "x")) (func $b (export "x")))"#,
            &Config::default(),
        )
        .unwrap_err();
        assert_eq!(err.message, "duplicate export name \"x\"");
    }
}
