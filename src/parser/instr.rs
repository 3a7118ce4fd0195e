//! Instruction sequences, flat and folded.
//!
//! Both forms are flattened into the same output: folded `(i32.add a b)`
//! emits `a`, `b`, then `i32.add`, and every block form emits its opening
//! instruction, body, optional `Else` and a closing `End`.
//!
//! Nested lists and flat blocks are walked with an explicit stack of
//! [`Frame`]s rather than by recursion.

use super::items::Items;
use super::literal::{parse_f32, parse_f64, parse_int, parse_memarg};
use super::Parser;
use crate::ast::ops::{self, TableOp};
use crate::ast::{Expr, Id, Index, Instr, InstrKind, RefType, TypeUse};
use crate::config::Feature;
use crate::error::{Diagnostic, SyntaxErrorKind};
use crate::wat::sexpr::SExprList;
use crate::wat::Span;

/// Deepest `block`/`loop`/`if` nesting accepted in one expression.
pub const MAX_BLOCK_DEPTH: usize = 1000;

/// Instructions still to be read from one list, and what to emit once they
/// run out.
struct Frame<'a> {
    items: Items<'a>,
    /// Flat blocks opened in this list and not yet closed by `end`.
    open: Vec<FlatBlock<'a>>,
    close: Option<Instr>,
}

struct FlatBlock<'a> {
    keyword: &'a str,
    label: Option<Id>,
    span: Span,
    seen_else: bool,
}

impl<'a> Frame<'a> {
    fn new(items: Items<'a>, close: Option<Instr>) -> Self {
        Self {
            items,
            open: Vec::new(),
            close,
        }
    }
}

impl Parser<'_> {
    /// `instr*` up to the end of the list.
    pub(super) fn parse_instr_seq(&mut self, items: &mut Items<'_>) -> Result<Expr, Diagnostic> {
        let mut out = Vec::new();
        self.parse_frames(vec![Frame::new(items.take_rest(), None)], 0, &mut out)?;
        Ok(out)
    }

    /// A single folded instruction, such as an abbreviated segment offset.
    pub(super) fn parse_folded(&mut self, list: SExprList<'_>, out: &mut Expr) -> Result<(), Diagnostic> {
        let mut frames = Vec::new();
        let mut depth = 0;
        self.open_folded(list, &mut frames, &mut depth, out)?;
        self.parse_frames(frames, depth, out)
    }

    /// Read frames until the stack is empty. `depth` counts the blocks
    /// already open in `frames`.
    fn parse_frames<'a>(
        &mut self,
        mut frames: Vec<Frame<'a>>,
        mut depth: usize,
        out: &mut Expr,
    ) -> Result<(), Diagnostic> {
        while let Some(frame) = frames.last_mut() {
            let Some(item) = frame.items.next() else {
                if let Some(block) = frame.open.last() {
                    return Err(Diagnostic::unexpected(
                        format!("missing 'end' for '{}'", block.keyword),
                        block.span,
                    ));
                }
                if let Some(close) = frame.close.take() {
                    if matches!(close.kind, InstrKind::End) {
                        depth -= 1;
                    }
                    out.push(close);
                }
                frames.pop();
                continue;
            };

            if let Some(list) = item.as_list() {
                self.open_folded(list, &mut frames, &mut depth, out)?;
                continue;
            }
            match item.as_keyword() {
                Some(keyword) => self.parse_flat(frame, keyword, item.span(), &mut depth, out)?,
                None => {
                    return Err(Diagnostic::unexpected(
                        format!("expected instruction, found {}", item.describe()),
                        item.span(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// ```text
    /// block $label? blocktype instr* end $label?
    /// loop  $label? blocktype instr* end $label?
    /// if    $label? blocktype instr* (else $label? instr*)? end $label?
    /// ```
    fn parse_flat<'a>(
        &mut self,
        frame: &mut Frame<'a>,
        keyword: &'a str,
        span: Span,
        depth: &mut usize,
        out: &mut Expr,
    ) -> Result<(), Diagnostic> {
        match keyword {
            "block" | "loop" | "if" => {
                enter_block(depth, span)?;
                let label = frame.items.take_id();
                let ty = self.parse_typeuse(&mut frame.items, false)?;
                out.push(Instr::new(block_kind(keyword, label.clone(), ty), span));
                frame.open.push(FlatBlock {
                    keyword,
                    label,
                    span,
                    seen_else: false,
                });
            }
            "else" => match frame.open.last_mut() {
                Some(block) if block.keyword == "if" && !block.seen_else => {
                    check_end_label(&mut frame.items, &block.label)?;
                    block.seen_else = true;
                    out.push(Instr::new(InstrKind::Else, span));
                }
                _ => return Err(Diagnostic::unexpected("'else' outside of 'if'", span)),
            },
            "end" => match frame.open.pop() {
                Some(block) => {
                    check_end_label(&mut frame.items, &block.label)?;
                    *depth -= 1;
                    out.push(Instr::new(InstrKind::End, span));
                }
                None => return Err(Diagnostic::unexpected("'end' without an open block", span)),
            },
            _ => {
                let kind = self.parse_plain(keyword, span, &mut frame.items)?;
                out.push(Instr::new(kind, span));
            }
        }
        Ok(())
    }

    /// Start a folded instruction, pushing frames for its operands and
    /// bodies.
    ///
    /// ```text
    /// (plaininstr foldedinstr*)
    /// (block $label? blocktype instr*)
    /// (loop $label? blocktype instr*)
    /// (if $label? blocktype foldedinstr* (then instr*) (else instr*)?)
    /// ```
    fn open_folded<'a>(
        &mut self,
        list: SExprList<'a>,
        frames: &mut Vec<Frame<'a>>,
        depth: &mut usize,
        out: &mut Expr,
    ) -> Result<(), Diagnostic> {
        let (keyword, span) = match list.head() {
            Some(head) => match head.as_keyword() {
                Some(keyword) => (keyword, head.span()),
                None => {
                    return Err(Diagnostic::unexpected(
                        format!("expected instruction, found {}", head.describe()),
                        head.span(),
                    ))
                }
            },
            None => return Err(Diagnostic::unexpected("expected instruction, found empty list", list.span)),
        };
        let mut items = Items::tail_of(list);
        let end = Instr::new(InstrKind::End, list.span);

        match keyword {
            "block" | "loop" => {
                enter_block(depth, span)?;
                let label = items.take_id();
                let ty = self.parse_typeuse(&mut items, false)?;
                out.push(Instr::new(block_kind(keyword, label, ty), span));
                frames.push(Frame::new(items, Some(end)));
            }
            "if" => {
                enter_block(depth, span)?;
                let label = items.take_id();
                let ty = self.parse_typeuse(&mut items, false)?;
                // The condition is evaluated before the `if`.
                let condition = items.take_lists_until("then")?;
                let then = items.expect_list_headed("then")?;
                let otherwise = items.take_list("else");
                items.finish()?;

                match otherwise {
                    Some(else_list) => {
                        frames.push(Frame::new(Items::tail_of(else_list), Some(end)));
                        let else_marker = Instr::new(InstrKind::Else, else_list.span);
                        frames.push(Frame::new(Items::tail_of(then), Some(else_marker)));
                    }
                    None => frames.push(Frame::new(Items::tail_of(then), Some(end))),
                }
                let if_instr = Instr::new(InstrKind::If { label, ty }, span);
                frames.push(Frame::new(condition, Some(if_instr)));
            }
            "else" | "end" | "then" => {
                return Err(Diagnostic::unexpected(format!("unexpected '{keyword}'"), span));
            }
            _ => {
                let kind = self.parse_plain(keyword, span, &mut items)?;
                // Operands, evaluated before the instruction itself.
                if let Some(item) = items.remaining().iter().find(|item| item.as_list().is_none()) {
                    return Err(Diagnostic::unexpected(
                        format!("unexpected {} in folded '{keyword}'", item.describe()),
                        item.span(),
                    ));
                }
                frames.push(Frame::new(items, Some(Instr::new(kind, span))));
            }
        }
        Ok(())
    }

    /// Everything except the block instructions: the mnemonic plus its
    /// immediates.
    fn parse_plain(&mut self, keyword: &str, span: Span, items: &mut Items<'_>) -> Result<InstrKind, Diagnostic> {
        use InstrKind as I;

        let kind = match keyword {
            "unreachable" => I::Unreachable,
            "nop" => I::Nop,
            "return" => I::Return,
            "drop" => I::Drop,
            "br" => I::Br(items.expect_index("label")?),
            "br_if" => I::BrIf(items.expect_index("label")?),
            "br_table" => {
                let mut targets = Vec::new();
                while let Some(index) = items.take_index()? {
                    targets.push(index);
                }
                let Some(default) = targets.pop() else {
                    return Err(items.expected("label"));
                };
                I::BrTable { targets, default }
            }
            "call" => I::Call(items.expect_index("function index")?),
            "call_indirect" => {
                let table = items.take_index()?.unwrap_or(Index::Num(0, span));
                let ty = self.parse_typeuse(items, false)?;
                I::CallIndirect { table, ty }
            }
            "select" => {
                let mut types: Option<Vec<_>> = None;
                while let Some(list) = items.take_list("result") {
                    self.require(Feature::ReferenceTypes, "select (result ...)", list.span)?;
                    let mut inner = Items::tail_of(list);
                    let types = types.get_or_insert_with(Vec::new);
                    while !inner.is_empty() {
                        types.push(self.parse_valtype(&mut inner)?);
                    }
                }
                I::Select(types)
            }

            "local.get" => I::LocalGet(items.expect_index("local index")?),
            "local.set" => I::LocalSet(items.expect_index("local index")?),
            "local.tee" => I::LocalTee(items.expect_index("local index")?),
            "global.get" => I::GlobalGet(items.expect_index("global index")?),
            "global.set" => I::GlobalSet(items.expect_index("global index")?),

            "table.get" | "table.set" | "table.size" | "table.grow" | "table.fill" => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                let table = items.take_index()?.unwrap_or(Index::Num(0, span));
                match keyword {
                    "table.get" => I::TableGet(table),
                    "table.set" => I::TableSet(table),
                    "table.size" => I::TableSize(table),
                    "table.grow" => I::TableGrow(table),
                    _ => I::TableFill(table),
                }
            }
            "table.copy" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                match items.take_index()? {
                    Some(dst) => I::TableCopy {
                        dst,
                        src: items.expect_index("source table index")?,
                    },
                    None => I::TableCopy {
                        dst: Index::Num(0, span),
                        src: Index::Num(0, span),
                    },
                }
            }
            "table.init" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                let first = items.expect_index("element segment index")?;
                match items.take_index()? {
                    Some(elem) => I::TableInit { table: first, elem },
                    None => I::TableInit {
                        table: Index::Num(0, span),
                        elem: first,
                    },
                }
            }
            "elem.drop" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                I::ElemDrop(items.expect_index("element segment index")?)
            }

            "memory.size" => I::MemorySize,
            "memory.grow" => I::MemoryGrow,
            "memory.fill" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                I::MemoryFill
            }
            "memory.copy" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                I::MemoryCopy
            }
            "memory.init" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                I::MemoryInit(items.expect_index("data segment index")?)
            }
            "data.drop" => {
                self.require(Feature::BulkMemory, keyword, span)?;
                I::DataDrop(items.expect_index("data segment index")?)
            }

            // The value fits: parse_int range-checks against 32 bits.
            "i32.const" => I::I32Const(parse_int(items, 32)? as i32),
            "i64.const" => I::I64Const(parse_int(items, 64)?),
            "f32.const" => I::F32Const(parse_f32(items)?),
            "f64.const" => I::F64Const(parse_f64(items)?),

            "ref.null" => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                let (heap, heap_span) = items.expect_keyword("heap type")?;
                let ty = RefType::from_heap_keyword(heap).ok_or_else(|| {
                    Diagnostic::syntax(
                        SyntaxErrorKind::UnknownKeyword,
                        format!("unknown heap type '{heap}'"),
                        heap_span,
                    )
                })?;
                I::RefNull(ty)
            }
            "ref.is_null" => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                I::RefIsNull
            }
            "ref.func" => {
                self.require(Feature::ReferenceTypes, keyword, span)?;
                I::RefFunc(items.expect_index("function index")?)
            }

            _ => match ops::lookup(keyword) {
                Some(TableOp::Num(op)) => {
                    if let Some(feature) = op.feature() {
                        self.require(feature, keyword, span)?;
                    }
                    I::Numeric(op)
                }
                Some(TableOp::Load(op)) => I::Load(op, parse_memarg(items, op.natural_align())?),
                Some(TableOp::Store(op)) => I::Store(op, parse_memarg(items, op.natural_align())?),
                None if keyword.starts_with("v128.") || is_simd_shape(keyword) => {
                    return Err(Diagnostic::syntax(
                        SyntaxErrorKind::UnknownKeyword,
                        format!("SIMD instruction '{keyword}' is not supported"),
                        span,
                    ))
                }
                None => {
                    return Err(Diagnostic::syntax(
                        SyntaxErrorKind::UnknownKeyword,
                        format!("unknown instruction '{keyword}'"),
                        span,
                    ))
                }
            },
        };
        Ok(kind)
    }
}

/// Count one more open block, failing past [`MAX_BLOCK_DEPTH`].
fn enter_block(depth: &mut usize, span: Span) -> Result<(), Diagnostic> {
    if *depth == MAX_BLOCK_DEPTH {
        return Err(Diagnostic::syntax(
            SyntaxErrorKind::NestingTooDeep,
            format!("blocks nested more than {MAX_BLOCK_DEPTH} deep"),
            span,
        ));
    }
    *depth += 1;
    Ok(())
}

fn block_kind(keyword: &str, label: Option<Id>, ty: TypeUse) -> InstrKind {
    match keyword {
        "loop" => InstrKind::Loop { label, ty },
        "if" => InstrKind::If { label, ty },
        _ => InstrKind::Block { label, ty },
    }
}

/// `i8x16.add` and friends.
fn is_simd_shape(keyword: &str) -> bool {
    matches!(
        keyword.split('.').next(),
        Some("i8x16" | "i16x8" | "i32x4" | "i64x2" | "f32x4" | "f64x2")
    )
}

/// After `end` or `else`, an optional label that must repeat the block's.
fn check_end_label(items: &mut Items<'_>, label: &Option<Id>) -> Result<(), Diagnostic> {
    let span = items.here();
    let Some(closing) = items.take_id() else {
        return Ok(());
    };
    if label.as_ref() == Some(&closing) {
        Ok(())
    } else {
        Err(Diagnostic::unexpected(format!("mismatching label {closing}"), span))
    }
}
