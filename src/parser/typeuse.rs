//! Value types, function signatures and type uses.
//!
//! A type use names a function type with `(type $t)`, spells it out with
//! `(param ...)`/`(result ...)`, or both. Those that only spell it out are
//! given an index by [`assign_type_indices`] once the whole module is known:
//! the first type with the same signature, or a new implicit one appended
//! after every explicit type.

use super::items::Items;
use super::Parser;
use crate::ast::{Field, FuncSig, ImportDesc, Index, InstrKind, Module, Param, RefType, TypeDef, TypeSignature, TypeUse, ValType};
use crate::config::Feature;
use crate::error::{Diagnostic, SyntaxErrorKind};
use crate::wat::Span;
use log::trace;

impl Parser<'_> {
    pub(super) fn valtype(&self, keyword: &str, span: Span) -> Result<ValType, Diagnostic> {
        match ValType::from_keyword(keyword) {
            Some(ty) if ty.is_ref() => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                Ok(ty)
            }
            Some(ty) => Ok(ty),
            None if keyword == "v128" => Err(Diagnostic::syntax(
                SyntaxErrorKind::UnknownKeyword,
                "v128 is not supported",
                span,
            )),
            None => Err(Diagnostic::syntax(
                SyntaxErrorKind::UnknownKeyword,
                format!("unknown value type '{keyword}'"),
                span,
            )),
        }
    }

    pub(super) fn reftype(&self, keyword: &str, span: Span) -> Result<RefType, Diagnostic> {
        match RefType::from_keyword(keyword) {
            Some(RefType::Extern) => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                Ok(RefType::Extern)
            }
            Some(ty) => Ok(ty),
            None => Err(Diagnostic::syntax(
                SyntaxErrorKind::UnknownKeyword,
                format!("unknown reference type '{keyword}'"),
                span,
            )),
        }
    }

    pub(super) fn parse_valtype(&self, items: &mut Items<'_>) -> Result<ValType, Diagnostic> {
        let (keyword, span) = items.expect_keyword("value type")?;
        self.valtype(keyword, span)
    }

    /// `(param $id valtype)`, `(param valtype*)` and `(result valtype*)`,
    /// params first.
    ///
    /// Parameter names are only meaningful on functions and type
    /// definitions; elsewhere they are rejected.
    pub(super) fn parse_func_sig(&self, items: &mut Items<'_>, allow_names: bool) -> Result<FuncSig, Diagnostic> {
        let mut sig = FuncSig::default();
        loop {
            if let Some(list) = items.take_list("param") {
                if !sig.results.is_empty() {
                    return Err(Diagnostic::unexpected("'param' after 'result'", list.span));
                }
                let mut inner = Items::tail_of(list);
                if let Some(id) = inner.take_id() {
                    if !allow_names {
                        return Err(Diagnostic::unexpected(
                            format!("parameter name {id} is not allowed here"),
                            list.span,
                        ));
                    }
                    let ty = self.parse_valtype(&mut inner)?;
                    inner.finish()?;
                    sig.params.push(Param { id: Some(id), ty });
                } else {
                    while !inner.is_empty() {
                        let ty = self.parse_valtype(&mut inner)?;
                        sig.params.push(Param { id: None, ty });
                    }
                }
            } else if let Some(list) = items.take_list("result") {
                let mut inner = Items::tail_of(list);
                while !inner.is_empty() {
                    sig.results.push(self.parse_valtype(&mut inner)?);
                }
            } else {
                return Ok(sig);
            }
        }
    }

    /// `(type typeidx)? param* result*`
    pub(super) fn parse_typeuse(&self, items: &mut Items<'_>, allow_names: bool) -> Result<TypeUse, Diagnostic> {
        let span = items.here();
        let index = match items.take_list("type") {
            Some(list) => {
                let mut inner = Items::tail_of(list);
                let index = inner.expect_index("type index")?;
                inner.finish()?;
                Some(index)
            }
            None => None,
        };
        let inline = if items.peek_list("param") || items.peek_list("result") {
            Some(self.parse_func_sig(items, allow_names)?)
        } else {
            None
        };
        Ok(TypeUse { index, inline, span })
    }
}

/// Give every type use without an explicit `(type ...)` a type index.
///
/// Block types that fit in a single value type are left alone; the encoder
/// writes those inline.
pub(super) fn assign_type_indices(module: &mut Module) {
    let mut known: Vec<TypeSignature> = module
        .fields
        .iter()
        .filter_map(|field| match field {
            Field::Type(def) => Some(def.sig.signature()),
            _ => None,
        })
        .collect();
    let mut implicit = Vec::new();

    let mut assign = |use_: &mut TypeUse| {
        if use_.index.is_some() {
            return;
        }
        let sig = use_.inline.clone().unwrap_or_default();
        let signature = sig.signature();
        let position = match known.iter().position(|t| *t == signature) {
            Some(position) => position,
            None => {
                trace!("implicit type {signature} for use at {}", use_.span);
                known.push(signature);
                implicit.push(TypeDef {
                    id: None,
                    sig: FuncSig {
                        params: sig.params.iter().map(|p| Param { id: None, ty: p.ty }).collect(),
                        results: sig.results,
                    },
                    implicit: true,
                    span: use_.span,
                });
                known.len() - 1
            }
        };
        // Index spaces are bounded by u32 in the binary format.
        use_.index = Some(Index::Num(position as u32, use_.span));
    };

    for field in &mut module.fields {
        match field {
            Field::Import(import) => {
                if let ImportDesc::Func { ty, .. } = &mut import.desc {
                    assign(ty);
                }
            }
            Field::Func(func) => {
                assign(&mut func.ty);
                for instr in &mut func.body {
                    match &mut instr.kind {
                        InstrKind::CallIndirect { ty, .. } => assign(ty),
                        InstrKind::Block { ty, .. } | InstrKind::Loop { ty, .. } | InstrKind::If { ty, .. } => {
                            if !ty.is_short_block_type() {
                                assign(ty);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    module.fields.extend(implicit.into_iter().map(Field::Type));
}
