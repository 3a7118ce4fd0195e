//! Module fields: everything that can appear directly inside `(module ...)`.

use super::items::Items;
use super::Parser;
use crate::ast::{
    Data, DataMode, Elem, ElemItems, ElemMode, Export, Expr, ExternKind, Field, Func, Global,
    GlobalType, Import, ImportDesc, Index, Instr, InstrKind, Limits, Local, Memory, MemoryType,
    RefType, Start, Table, TableType, TypeDef,
};
use crate::config::Feature;
use crate::error::Diagnostic;
use crate::wat::sexpr::SExprList;
use crate::wat::Span;

/// Bytes per WebAssembly page.
const PAGE_SIZE: usize = 65536;

impl Parser<'_> {
    /// `(type $id? (func param* result*))`
    pub(super) fn parse_type(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();
        let func = items.expect_list_headed("func")?;
        items.finish()?;

        let mut inner = Items::tail_of(func);
        let sig = self.parse_func_sig(&mut inner, true)?;
        inner.finish()?;

        self.fields.push(Field::Type(TypeDef {
            id,
            sig,
            implicit: false,
            span: list.span,
        }));
        Ok(())
    }

    /// `(import "module" "name" (func|table|memory|global $id? ...))`
    pub(super) fn parse_import(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        self.check_import_order(list.span)?;
        let mut items = Items::tail_of(list);
        let module = items.expect_name()?;
        let name = items.expect_name()?;
        let desc_list = items.expect_list("import description")?;
        items.finish()?;

        let mut desc_items = Items::tail_of(desc_list);
        let id = desc_items.take_id();
        let desc = match desc_list.head_keyword() {
            Some("func") => {
                self.counts.funcs += 1;
                ImportDesc::Func {
                    id,
                    ty: self.parse_typeuse(&mut desc_items, true)?,
                }
            }
            Some("table") => {
                self.counts.tables += 1;
                ImportDesc::Table {
                    id,
                    ty: self.parse_table_type(&mut desc_items)?,
                }
            }
            Some("memory") => {
                self.counts.memories += 1;
                ImportDesc::Memory {
                    id,
                    ty: self.parse_memory_type(&mut desc_items)?,
                }
            }
            Some("global") => {
                self.counts.globals += 1;
                ImportDesc::Global {
                    id,
                    ty: self.parse_global_type(&mut desc_items)?,
                }
            }
            _ => {
                return Err(Diagnostic::unexpected(
                    "expected '(func ...)', '(table ...)', '(memory ...)' or '(global ...)'",
                    desc_list.span,
                ))
            }
        };
        desc_items.finish()?;

        self.fields.push(Field::Import(Import {
            module,
            name,
            desc,
            span: list.span,
        }));
        Ok(())
    }

    /// `(func $id? (export "name")* (import "module" "name")? typeuse local* instr*)`
    pub(super) fn parse_func(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();
        let exports = self.take_inline_exports(&mut items)?;
        let index = self.counts.funcs;
        self.counts.funcs += 1;

        if let Some((module, name)) = self.take_inline_import(&mut items)? {
            self.check_import_order(list.span)?;
            let ty = self.parse_typeuse(&mut items, true)?;
            items.finish()?;
            self.fields.push(Field::Import(Import {
                module,
                name,
                desc: ImportDesc::Func { id, ty },
                span: list.span,
            }));
        } else {
            self.note_definition(list.span);
            let ty = self.parse_typeuse(&mut items, true)?;
            let locals = self.parse_locals(&mut items)?;
            let body = self.parse_instr_seq(&mut items)?;
            self.fields.push(Field::Func(Func {
                id,
                ty,
                locals,
                body,
                span: list.span,
            }));
        }

        self.push_exports(exports, ExternKind::Func, index);
        Ok(())
    }

    /// `(local $id valtype)` or `(local valtype*)`, repeated.
    fn parse_locals(&mut self, items: &mut Items<'_>) -> Result<Vec<Local>, Diagnostic> {
        let mut locals = Vec::new();
        while let Some(list) = items.take_list("local") {
            let mut inner = Items::tail_of(list);
            if let Some(id) = inner.take_id() {
                let ty = self.parse_valtype(&mut inner)?;
                inner.finish()?;
                locals.push(Local { id: Some(id), ty });
            } else {
                while !inner.is_empty() {
                    let ty = self.parse_valtype(&mut inner)?;
                    locals.push(Local { id: None, ty });
                }
            }
        }
        Ok(locals)
    }

    /// `(table $id? (export "name")* (import "module" "name")? tabletype)`
    /// or `(table $id? (export "name")* reftype (elem ...))`
    pub(super) fn parse_table(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();
        let exports = self.take_inline_exports(&mut items)?;
        let index = self.counts.tables;
        self.counts.tables += 1;

        if let Some((module, name)) = self.take_inline_import(&mut items)? {
            self.check_import_order(list.span)?;
            let ty = self.parse_table_type(&mut items)?;
            items.finish()?;
            self.fields.push(Field::Import(Import {
                module,
                name,
                desc: ImportDesc::Table { id, ty },
                span: list.span,
            }));
        } else if items.peek_keyword().is_some() {
            // Abbreviated form: the element type comes first and the size is
            // the number of elements.
            self.note_definition(list.span);
            let (keyword, span) = items.expect_keyword("reference type")?;
            let elem_ty = self.reftype(keyword, span)?;
            let elem_list = items.expect_list_headed("elem")?;
            items.finish()?;

            let mut elem_items = Items::tail_of(elem_list);
            let elems = if elem_items.peek().map_or(false, |item| item.as_list().is_some()) {
                ElemItems::Exprs(self.parse_elem_exprs(&mut elem_items)?)
            } else {
                ElemItems::Funcs(self.parse_func_indices(&mut elem_items)?)
            };
            let size = u32::try_from(elems.len())
                .map_err(|_| Diagnostic::out_of_range("too many table elements", elem_list.span))?;

            self.fields.push(Field::Table(Table {
                id,
                ty: TableType {
                    limits: Limits {
                        min: size,
                        max: Some(size),
                    },
                    elem: elem_ty,
                },
                span: list.span,
            }));
            self.fields.push(Field::Elem(Elem {
                id: None,
                mode: ElemMode::Active {
                    table: Index::Num(index, elem_list.span),
                    offset: zero_offset(elem_list.span),
                },
                ty: elem_ty,
                items: elems,
                span: elem_list.span,
            }));
        } else {
            self.note_definition(list.span);
            let ty = self.parse_table_type(&mut items)?;
            items.finish()?;
            self.fields.push(Field::Table(Table {
                id,
                ty,
                span: list.span,
            }));
        }

        self.push_exports(exports, ExternKind::Table, index);
        Ok(())
    }

    /// `(memory $id? (export "name")* (import "module" "name")? memtype)`
    /// or `(memory $id? (export "name")* (data string*))`
    pub(super) fn parse_memory(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();
        let exports = self.take_inline_exports(&mut items)?;
        let index = self.counts.memories;
        self.counts.memories += 1;

        if let Some((module, name)) = self.take_inline_import(&mut items)? {
            self.check_import_order(list.span)?;
            let ty = self.parse_memory_type(&mut items)?;
            items.finish()?;
            self.fields.push(Field::Import(Import {
                module,
                name,
                desc: ImportDesc::Memory { id, ty },
                span: list.span,
            }));
        } else if let Some(data_list) = items.take_list("data") {
            self.note_definition(list.span);
            items.finish()?;
            let bytes = parse_data_strings(&mut Items::tail_of(data_list))?;
            let pages = u32::try_from(bytes.len().div_ceil(PAGE_SIZE))
                .map_err(|_| Diagnostic::out_of_range("inline data is too large", data_list.span))?;

            self.fields.push(Field::Memory(Memory {
                id,
                ty: MemoryType {
                    limits: Limits {
                        min: pages,
                        max: Some(pages),
                    },
                },
                span: list.span,
            }));
            self.fields.push(Field::Data(Data {
                id: None,
                mode: DataMode::Active {
                    memory: Index::Num(index, data_list.span),
                    offset: zero_offset(data_list.span),
                },
                bytes,
                span: data_list.span,
            }));
        } else {
            self.note_definition(list.span);
            let ty = self.parse_memory_type(&mut items)?;
            items.finish()?;
            self.fields.push(Field::Memory(Memory {
                id,
                ty,
                span: list.span,
            }));
        }

        self.push_exports(exports, ExternKind::Memory, index);
        Ok(())
    }

    /// `(global $id? (export "name")* (import "module" "name")? globaltype expr?)`
    pub(super) fn parse_global(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();
        let exports = self.take_inline_exports(&mut items)?;
        let index = self.counts.globals;
        self.counts.globals += 1;

        if let Some((module, name)) = self.take_inline_import(&mut items)? {
            self.check_import_order(list.span)?;
            let ty = self.parse_global_type(&mut items)?;
            items.finish()?;
            self.fields.push(Field::Import(Import {
                module,
                name,
                desc: ImportDesc::Global { id, ty },
                span: list.span,
            }));
        } else {
            self.note_definition(list.span);
            let ty = self.parse_global_type(&mut items)?;
            let init = self.parse_instr_seq(&mut items)?;
            self.fields.push(Field::Global(Global {
                id,
                ty,
                init,
                span: list.span,
            }));
        }

        self.push_exports(exports, ExternKind::Global, index);
        Ok(())
    }

    /// `(export "name" (func|table|memory|global index))`
    pub(super) fn parse_export(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let name = items.expect_name()?;
        let desc = items.expect_list("export description")?;
        items.finish()?;

        let kind = match desc.head_keyword() {
            Some("func") => ExternKind::Func,
            Some("table") => ExternKind::Table,
            Some("memory") => ExternKind::Memory,
            Some("global") => ExternKind::Global,
            _ => {
                return Err(Diagnostic::unexpected(
                    "expected '(func ...)', '(table ...)', '(memory ...)' or '(global ...)'",
                    desc.span,
                ))
            }
        };
        let mut inner = Items::tail_of(desc);
        let index = inner.expect_index(&format!("{} index", kind.name()))?;
        inner.finish()?;

        self.fields.push(Field::Export(Export {
            name,
            kind,
            index,
            span: list.span,
        }));
        Ok(())
    }

    /// `(start funcidx)`
    pub(super) fn parse_start(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        if let Some(previous) = self.start {
            return Err(Diagnostic::unexpected(
                format!("multiple start functions, first at {previous}"),
                list.span,
            ));
        }
        self.start = Some(list.span);

        let mut items = Items::tail_of(list);
        let func = items.expect_index("function index")?;
        items.finish()?;
        self.fields.push(Field::Start(Start {
            func,
            span: list.span,
        }));
        Ok(())
    }

    /// ```text
    /// (elem $id? (table tableidx)? offset elemlist)   active
    /// (elem $id? offset funcidx*)                     active, legacy
    /// (elem $id? declare elemlist)                    declarative
    /// (elem $id? elemlist)                            passive
    ///
    /// elemlist := func funcidx* | reftype elemexpr*
    /// elemexpr := (item instr*) | foldedinstr
    /// ```
    pub(super) fn parse_elem(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();

        let mode = if items.take_keyword("declare") {
            self.require_form(Feature::ReferenceTypes, "declarative element segment", list.span)?;
            ElemMode::Declarative
        } else if items.peek().map_or(false, |item| item.as_list().is_some()) {
            let table = match items.take_list("table") {
                Some(table_list) => {
                    let mut inner = Items::tail_of(table_list);
                    let index = inner.expect_index("table index")?;
                    inner.finish()?;
                    index
                }
                None => Index::Num(0, items.here()),
            };
            let offset = self.parse_offset(&mut items)?;
            ElemMode::Active { table, offset }
        } else {
            self.require_form(Feature::BulkMemory, "passive element segment", list.span)?;
            ElemMode::Passive
        };

        let (ty, elems) = if items.take_keyword("func") {
            (RefType::Func, ElemItems::Funcs(self.parse_func_indices(&mut items)?))
        } else if let Some(keyword) = items.peek_keyword() {
            let span = items.here();
            items.next();
            let ty = self.reftype(keyword, span)?;
            (ty, ElemItems::Exprs(self.parse_elem_exprs(&mut items)?))
        } else if matches!(mode, ElemMode::Active { .. }) {
            (RefType::Func, ElemItems::Funcs(self.parse_func_indices(&mut items)?))
        } else {
            return Err(items.expected("'func' or reference type"));
        };

        self.fields.push(Field::Elem(Elem {
            id,
            mode,
            ty,
            items: elems,
            span: list.span,
        }));
        Ok(())
    }

    /// `funcidx*` up to the end of the list.
    fn parse_func_indices(&mut self, items: &mut Items<'_>) -> Result<Vec<Index>, Diagnostic> {
        let mut funcs = Vec::new();
        while let Some(index) = items.take_index()? {
            funcs.push(index);
        }
        items.finish()?;
        Ok(funcs)
    }

    /// `elemexpr*` up to the end of the list.
    fn parse_elem_exprs(&mut self, items: &mut Items<'_>) -> Result<Vec<Expr>, Diagnostic> {
        let mut exprs = Vec::new();
        while !items.is_empty() {
            let list = items.expect_list("element expression")?;
            if list.head_keyword() == Some("item") {
                exprs.push(self.parse_instr_seq(&mut Items::tail_of(list))?);
            } else {
                let mut expr = Vec::new();
                self.parse_folded(list, &mut expr)?;
                exprs.push(expr);
            }
        }
        Ok(exprs)
    }

    /// ```text
    /// (data $id? (memory memidx)? offset string*)   active
    /// (data $id? string*)                           passive
    /// ```
    pub(super) fn parse_data(&mut self, list: SExprList<'_>) -> Result<(), Diagnostic> {
        let mut items = Items::tail_of(list);
        let id = items.take_id();

        let mode = if items.peek().map_or(false, |item| item.as_list().is_some()) {
            let memory = match items.take_list("memory") {
                Some(memory_list) => {
                    let mut inner = Items::tail_of(memory_list);
                    let index = inner.expect_index("memory index")?;
                    inner.finish()?;
                    index
                }
                None => Index::Num(0, items.here()),
            };
            let offset = self.parse_offset(&mut items)?;
            DataMode::Active { memory, offset }
        } else {
            self.require_form(Feature::BulkMemory, "passive data segment", list.span)?;
            DataMode::Passive
        };
        let bytes = parse_data_strings(&mut items)?;

        self.fields.push(Field::Data(Data {
            id,
            mode,
            bytes,
            span: list.span,
        }));
        Ok(())
    }

    /// `(offset instr*)` or a single folded instruction.
    fn parse_offset(&mut self, items: &mut Items<'_>) -> Result<Expr, Diagnostic> {
        if let Some(list) = items.take_list("offset") {
            return self.parse_instr_seq(&mut Items::tail_of(list));
        }
        let list = items.expect_list("offset expression")?;
        let mut offset = Vec::new();
        self.parse_folded(list, &mut offset)?;
        Ok(offset)
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// `min max?`
    fn parse_limits(&mut self, items: &mut Items<'_>) -> Result<Limits, Diagnostic> {
        let min = items.expect_u32("minimum size")?;
        let max = items.take_u32()?;
        Ok(Limits { min, max })
    }

    /// `limits reftype`
    pub(super) fn parse_table_type(&mut self, items: &mut Items<'_>) -> Result<TableType, Diagnostic> {
        let limits = self.parse_limits(items)?;
        let (keyword, span) = items.expect_keyword("reference type")?;
        let elem = self.reftype(keyword, span)?;
        Ok(TableType { limits, elem })
    }

    /// `limits`
    pub(super) fn parse_memory_type(&mut self, items: &mut Items<'_>) -> Result<MemoryType, Diagnostic> {
        Ok(MemoryType {
            limits: self.parse_limits(items)?,
        })
    }

    /// `valtype` or `(mut valtype)`
    pub(super) fn parse_global_type(&mut self, items: &mut Items<'_>) -> Result<GlobalType, Diagnostic> {
        if let Some(list) = items.take_list("mut") {
            let mut inner = Items::tail_of(list);
            let ty = self.parse_valtype(&mut inner)?;
            inner.finish()?;
            return Ok(GlobalType { ty, mutable: true });
        }
        Ok(GlobalType {
            ty: self.parse_valtype(items)?,
            mutable: false,
        })
    }
}

/// `string*` concatenated.
fn parse_data_strings(items: &mut Items<'_>) -> Result<Vec<u8>, Diagnostic> {
    let mut bytes = Vec::new();
    while !items.is_empty() {
        let (chunk, _) = items.expect_string("data string")?;
        bytes.extend_from_slice(chunk);
    }
    Ok(bytes)
}

/// `(i32.const 0)`, the offset of an abbreviated segment.
fn zero_offset(span: Span) -> Expr {
    vec![Instr::new(InstrKind::I32Const(0), span)]
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::*;
    use crate::config::Config;
    use crate::error::{ErrorKind, SyntaxErrorKind};
    use rstest::rstest;

    fn fields(source: &str) -> Vec<Field> {
        parse(source, &Config::default()).unwrap().fields
    }

    #[test]
    fn type_with_named_params() {
        let fields = fields("(module (type $t (func (param $a i32) (param f32 f64) (result i64))))");
        let Field::Type(def) = &fields[0] else {
            panic!("expected type");
        };
        assert_eq!(def.id, Some(Id::new("t")));
        assert!(!def.implicit);
        assert_eq!(def.sig.params.len(), 3);
        assert_eq!(def.sig.params[0].id, Some(Id::new("a")));
        assert_eq!(
            def.sig.signature(),
            TypeSignature::new(vec![ValType::I32, ValType::F32, ValType::F64], vec![ValType::I64])
        );
    }

    #[test]
    fn locals_named_and_grouped() {
        let fields = fields("(module (func (local $x i32) (local f32 f64)))");
        let Field::Func(func) = &fields[0] else {
            panic!("expected func");
        };
        let types: Vec<_> = func.locals.iter().map(|l| l.ty).collect();
        assert_eq!(types, vec![ValType::I32, ValType::F32, ValType::F64]);
        assert_eq!(func.locals[0].id, Some(Id::new("x")));
    }

    #[test]
    fn global_types() {
        let fields = fields("(module (global (mut i64) (i64.const 1)) (global f32 (f32.const 0)))");
        let types: Vec<_> = fields
            .iter()
            .filter_map(|f| match f {
                Field::Global(g) => Some(g.ty),
                _ => None,
            })
            .collect();
        assert_eq!(
            types,
            vec![
                GlobalType { ty: ValType::I64, mutable: true },
                GlobalType { ty: ValType::F32, mutable: false },
            ]
        );
    }

    #[rstest]
    #[case("(elem (i32.const 0) 0 1)", 2, RefType::Func)]
    #[case("(elem (table 0) (offset (i32.const 1)) func 0)", 1, RefType::Func)]
    #[case("(elem funcref (ref.func 0) (item ref.null func))", 2, RefType::Func)]
    #[case("(elem externref (ref.null extern))", 1, RefType::Extern)]
    #[case("(elem declare func 0 1)", 2, RefType::Func)]
    fn elem_forms(#[case] elem: &str, #[case] len: usize, #[case] ty: RefType) {
        let source = format!("(module (table 2 funcref) (func) (func) {elem})");
        let fields = fields(&source);
        let Some(Field::Elem(segment)) = fields.iter().find(|f| matches!(f, Field::Elem(_))) else {
            panic!("expected elem");
        };
        assert_eq!(segment.items.len(), len);
        assert_eq!(segment.ty, ty);
    }

    #[test]
    fn data_forms() {
        let fields = fields(
            r#"(module (memory $m 1)
                 (data (i32.const 8) "ab" "c")
                 (data (memory $m) (offset (i32.const 0)))
                 (data $p "passive"))"#,
        );
        let segments: Vec<_> = fields
            .iter()
            .filter_map(|f| match f {
                Field::Data(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].bytes, b"abc");
        assert!(matches!(&segments[1].mode, DataMode::Active { memory: Index::Id(id, _), .. } if id.as_str() == "m"));
        assert_eq!(segments[2].mode, DataMode::Passive);
        assert_eq!(segments[2].id, Some(Id::new("p")));
    }

    #[test]
    fn export_kinds() {
        let fields = fields(
            r#"(module (func $f) (table 1 funcref) (memory 1) (global i32 (i32.const 0))
                 (export "f" (func $f)) (export "t" (table 0))
                 (export "m" (memory 0)) (export "g" (global 0)))"#,
        );
        let kinds: Vec<_> = fields
            .iter()
            .filter_map(|f| match f {
                Field::Export(e) => Some(e.kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![ExternKind::Func, ExternKind::Table, ExternKind::Memory, ExternKind::Global]
        );
    }

    #[rstest]
    #[case("(module (memory))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (memory 1 2 3))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (table 1 anyfunc))", SyntaxErrorKind::UnknownKeyword)]
    #[case("(module (global v128 (i32.const 0)))", SyntaxErrorKind::UnknownKeyword)]
    #[case("(module (export \"x\" (thing 0)))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (import \"a\" \"b\" (tag)))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (type (func (result i32) (param i32))))", SyntaxErrorKind::UnexpectedToken)]
    #[case("(module (memory -1))", SyntaxErrorKind::MalformedLiteral)]
    fn malformed_fields(#[case] source: &str, #[case] kind: SyntaxErrorKind) {
        let err = parse(source, &Config::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax(kind), "{err}");
    }
}
