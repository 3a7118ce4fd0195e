//! WAT parser: S-expressions to the [`ast`](crate::ast) syntax tree.
//!
//! Fields are parsed by recursive descent over the tree produced by
//! [`read_all`](crate::wat::sexpr::read_all); instruction nesting is walked
//! with an explicit stack and capped at [`MAX_BLOCK_DEPTH`]. Every
//! abbreviation the text format allows is expanded here, so later stages
//! see a single canonical shape:
//!
//! - folded instructions are flattened, with `block`/`loop`/`if` closed by
//!   explicit `else`/`end` markers;
//! - inline `(export ...)` and `(import ...)` become separate fields;
//! - `(table funcref (elem ...))` and `(memory (data ...))` become a
//!   definition plus an active segment;
//! - type uses without `(type ...)` get the index of a matching type,
//!   appending an implicit one if none matches.
//!
//! ```
//! use watc::{parser, Config};
//!
//! let module = parser::parse("(module (func (export \"f\") nop))", &Config::default()).unwrap();
//! // func, export and the implicit `[] -> []` type
//! assert_eq!(module.fields.len(), 3);
//! ```

mod fields;
mod instr;
mod items;
mod literal;
mod typeuse;

pub use instr::MAX_BLOCK_DEPTH;

use crate::ast::{Export, ExternKind, Field, Id, Index, Module};
use crate::config::{Config, Feature};
use crate::error::{Diagnostic, SyntaxErrorKind};
use crate::wat::sexpr::{read_all, SExpr};
use crate::wat::Span;
use items::Items;
use log::debug;

/// Parse WAT source into a module.
///
/// The source holds either one `(module ...)` form or a bare sequence of
/// module fields.
pub fn parse(source: &str, config: &Config) -> Result<Module, Diagnostic> {
    let forms = read_all(source)?;
    debug!("read {} top-level forms", forms.len());

    let mut parser = Parser::new(config);
    let (id, span) = parser.parse_forms(&forms)?;
    let mut module = Module {
        id,
        fields: parser.fields,
        span,
    };
    typeuse::assign_type_indices(&mut module);
    debug!("parsed {} module fields", module.fields.len());
    Ok(module)
}

/// Entities defined so far in each index space that inline exports and
/// inline segments refer to.
#[derive(Debug, Default)]
struct Counts {
    funcs: u32,
    tables: u32,
    memories: u32,
    globals: u32,
}

struct Parser<'c> {
    config: &'c Config,
    fields: Vec<Field>,
    counts: Counts,
    /// The first function, table, memory or global definition. Imports
    /// after it are rejected.
    first_definition: Option<Span>,
    start: Option<Span>,
}

impl<'c> Parser<'c> {
    fn new(config: &'c Config) -> Self {
        Self {
            config,
            fields: Vec::new(),
            counts: Counts::default(),
            first_definition: None,
            start: None,
        }
    }

    // ========================================================================
    // Module
    // ========================================================================

    /// `(module $id? field*)` or `field*`
    fn parse_forms(&mut self, forms: &[SExpr]) -> Result<(Option<Id>, Span), Diagnostic> {
        let (first, last) = match (forms.first(), forms.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Diagnostic::unexpected("missing module form", Span::ZERO)),
        };

        if first.is_list_headed_by("module") {
            if let Some(extra) = forms.get(1) {
                return Err(Diagnostic::unexpected(
                    format!("unexpected {} after module", extra.describe()),
                    extra.span(),
                ));
            }
            let Some(list) = first.as_list() else {
                return Err(Diagnostic::internal("module form is not a list"));
            };
            let mut items = Items::tail_of(list);
            let id = items.take_id();
            if matches!(items.peek_keyword(), Some("binary" | "quote")) {
                return Err(Diagnostic::syntax(
                    SyntaxErrorKind::UnknownKeyword,
                    "binary and quoted modules are not supported",
                    items.here(),
                ));
            }
            while let Some(field) = items.next() {
                self.parse_field(field)?;
            }
            return Ok((id, list.span));
        }

        for form in forms {
            self.parse_field(form)?;
        }
        Ok((None, first.span().to(last.span())))
    }

    fn parse_field(&mut self, form: &SExpr) -> Result<(), Diagnostic> {
        let Some(list) = form.as_list() else {
            return Err(Diagnostic::unexpected(
                format!("expected module field, found {}", form.describe()),
                form.span(),
            ));
        };
        match list.head_keyword() {
            Some("type") => self.parse_type(list),
            Some("import") => self.parse_import(list),
            Some("func") => self.parse_func(list),
            Some("table") => self.parse_table(list),
            Some("memory") => self.parse_memory(list),
            Some("global") => self.parse_global(list),
            Some("export") => self.parse_export(list),
            Some("start") => self.parse_start(list),
            Some("elem") => self.parse_elem(list),
            Some("data") => self.parse_data(list),
            Some("module") => Err(Diagnostic::unexpected("modules cannot be nested", list.span)),
            Some(other) => Err(Diagnostic::syntax(
                SyntaxErrorKind::UnknownKeyword,
                format!("unknown module field '{other}'"),
                list.span,
            )),
            None => Err(Diagnostic::unexpected(
                format!("expected module field, found {}", form.describe()),
                form.span(),
            )),
        }
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Reject an instruction or type whose proposal is switched off.
    fn require(&self, feature: Feature, what: &str, span: Span) -> Result<(), Diagnostic> {
        if self.config.features.is_enabled(feature) {
            Ok(())
        } else {
            Err(Diagnostic::syntax(
                SyntaxErrorKind::UnknownKeyword,
                format!("'{what}' requires the {} feature", feature.name()),
                span,
            ))
        }
    }

    /// Reject a form (rather than a keyword) whose proposal is switched off.
    fn require_form(&self, feature: Feature, what: &str, span: Span) -> Result<(), Diagnostic> {
        if self.config.features.is_enabled(feature) {
            Ok(())
        } else {
            Err(Diagnostic::unexpected(
                format!("{what} requires the {} feature", feature.name()),
                span,
            ))
        }
    }

    fn check_import_order(&self, span: Span) -> Result<(), Diagnostic> {
        match self.first_definition {
            Some(def) => Err(Diagnostic::unexpected(
                format!("import after a definition at {def}"),
                span,
            )),
            None => Ok(()),
        }
    }

    fn note_definition(&mut self, span: Span) {
        self.first_definition.get_or_insert(span);
    }

    /// `(export "name")*` inside a definition.
    fn take_inline_exports(&mut self, items: &mut Items<'_>) -> Result<Vec<(String, Span)>, Diagnostic> {
        let mut names = Vec::new();
        while let Some(list) = items.take_list("export") {
            let mut inner = Items::tail_of(list);
            names.push((inner.expect_name()?, list.span));
            inner.finish()?;
        }
        Ok(names)
    }

    /// `(import "module" "name")?` inside a definition.
    fn take_inline_import(&mut self, items: &mut Items<'_>) -> Result<Option<(String, String)>, Diagnostic> {
        let Some(list) = items.take_list("import") else {
            return Ok(None);
        };
        let mut inner = Items::tail_of(list);
        let module = inner.expect_name()?;
        let name = inner.expect_name()?;
        inner.finish()?;
        Ok(Some((module, name)))
    }

    fn push_exports(&mut self, names: Vec<(String, Span)>, kind: ExternKind, index: u32) {
        for (name, span) in names {
            self.fields.push(Field::Export(Export {
                name,
                kind,
                index: Index::Num(index, span),
                span,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DataMode, ElemItems, ElemMode, ImportDesc, InstrKind, Limits};
    use crate::config::Features;
    use crate::error::ErrorKind;
    use rstest::rstest;

    fn parse_ok(source: &str) -> Module {
        parse(source, &Config::default()).unwrap()
    }

    fn parse_err(source: &str) -> Diagnostic {
        parse(source, &Config::default()).unwrap_err()
    }

    fn syntax(kind: SyntaxErrorKind) -> ErrorKind {
        ErrorKind::Syntax(kind)
    }

    #[test]
    fn empty_module() {
        let module = parse_ok("(module)");
        assert!(module.fields.is_empty());
        assert_eq!(module.id, None);
    }

    #[test]
    fn named_module() {
        let module = parse_ok("(module $m)");
        assert_eq!(module.id, Some(Id::new("m")));
    }

    #[test]
    fn bare_fields_are_a_module() {
        let module = parse_ok("(memory 1) (global i32 (i32.const 0))");
        assert_eq!(module.fields.len(), 2);
        assert!(matches!(module.fields[0], Field::Memory(_)));
    }

    #[rstest]
    #[case("")]
    #[case("  ;; nothing here\n (; or here ;)")]
    fn missing_module_form(#[case] source: &str) {
        let err = parse_err(source);
        assert_eq!(err.kind, syntax(SyntaxErrorKind::UnexpectedToken));
        assert_eq!(err.message, "missing module form");
    }

    #[rstest]
    #[case("(module) (module)", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (module))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (frob))", SyntaxErrorKind::UnknownKeyword)]
    #[case("(module nop)", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (func)", SyntaxErrorKind::UnbalancedParens)]
    #[case("(module binary \"\\00asm\")", SyntaxErrorKind::UnknownKeyword)]
    fn malformed_modules(#[case] source: &str, #[case] kind: SyntaxErrorKind) {
        assert_eq!(parse_err(source).kind, syntax(kind));
    }

    #[test]
    fn inline_export_uses_numeric_index() {
        let module = parse_ok(
            r#"(module
                 (import "env" "f" (func))
                 (func $g (export "g") (export "h")))"#,
        );
        let exports: Vec<_> = module
            .fields
            .iter()
            .filter_map(|f| match f {
                Field::Export(e) => Some((e.name.as_str(), e.kind, e.index.as_num())),
                _ => None,
            })
            .collect();
        assert_eq!(
            exports,
            vec![("g", ExternKind::Func, Some(1)), ("h", ExternKind::Func, Some(1))]
        );
    }

    #[test]
    fn inline_import_becomes_import_field() {
        let module = parse_ok(r#"(module (global $g (import "env" "g") (mut i32)))"#);
        match &module.fields[0] {
            Field::Import(import) => {
                assert_eq!((import.module.as_str(), import.name.as_str()), ("env", "g"));
                assert!(matches!(import.desc, ImportDesc::Global { .. }));
                assert_eq!(import.desc.id(), Some(&Id::new("g")));
            }
            other => panic!("expected import, got {other:?}"),
        }
    }

    #[test]
    fn import_after_definition_is_rejected() {
        let err = parse_err(r#"(module (memory 1) (import "env" "f" (func)))"#);
        assert_eq!(err.kind, syntax(SyntaxErrorKind::UnexpectedToken));
        assert!(err.message.starts_with("import after a definition"));

        let err = parse_err(r#"(module (func) (func (import "env" "f")))"#);
        assert!(err.message.starts_with("import after a definition"));
    }

    #[test]
    fn imports_may_follow_types_and_exports() {
        parse_ok(r#"(module (type (func)) (export "m" (memory 0)) (import "env" "m" (memory 1)))"#);
    }

    #[test]
    fn table_with_inline_elements() {
        let module = parse_ok("(module (func $f) (table $t funcref (elem $f $f)))");
        match &module.fields[1] {
            Field::Table(table) => {
                assert_eq!(table.ty.limits, Limits { min: 2, max: Some(2) });
            }
            other => panic!("expected table, got {other:?}"),
        }
        match &module.fields[2] {
            Field::Elem(elem) => {
                assert!(matches!(&elem.mode, ElemMode::Active { table, .. } if table.as_num() == Some(0)));
                assert!(matches!(&elem.items, ElemItems::Funcs(funcs) if funcs.len() == 2));
            }
            other => panic!("expected elem, got {other:?}"),
        }
    }

    #[test]
    fn memory_with_inline_data() {
        let module = parse_ok(r#"(module (memory (data "hello" " world")))"#);
        match (&module.fields[0], &module.fields[1]) {
            (Field::Memory(memory), Field::Data(data)) => {
                assert_eq!(memory.ty.limits, Limits { min: 1, max: Some(1) });
                assert_eq!(data.bytes, b"hello world");
                assert!(matches!(&data.mode, DataMode::Active { offset, .. }
                    if offset.len() == 1 && offset[0].kind == InstrKind::I32Const(0)));
            }
            other => panic!("unexpected fields {other:?}"),
        }
    }

    #[test]
    fn empty_inline_data_has_zero_pages() {
        let module = parse_ok("(module (memory (data)))");
        assert!(matches!(&module.fields[0], Field::Memory(m) if m.ty.limits.min == 0));
    }

    #[test]
    fn second_start_is_rejected() {
        let err = parse_err("(module (func $f) (start $f) (start $f))");
        assert_eq!(err.kind, syntax(SyntaxErrorKind::UnexpectedToken));
    }

    #[rstest]
    #[case("(module (elem funcref))", Feature::BulkMemory)]
    #[case("(module (data \"x\"))", Feature::BulkMemory)]
    #[case("(module (elem declare func))", Feature::ReferenceTypes)]
    fn segments_need_features(#[case] source: &str, #[case] feature: Feature) {
        let mut config = Config::default();
        assert!(parse(source, &config).is_ok());
        config.features = Features::all();
        match feature {
            Feature::BulkMemory => config.features.bulk_memory = false,
            Feature::ReferenceTypes => config.features.reference_types = false,
            _ => unreachable!(),
        }
        let err = parse(source, &config).unwrap_err();
        assert_eq!(err.kind, syntax(SyntaxErrorKind::UnexpectedToken));
        assert!(err.message.contains(feature.name()));
    }

    #[test]
    fn non_utf8_names_are_malformed() {
        let err = parse_err(r#"(module (export "\ff" (func 0)))"#);
        assert_eq!(err.kind, syntax(SyntaxErrorKind::MalformedLiteral));
    }
}
