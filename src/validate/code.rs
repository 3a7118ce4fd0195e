//! Function bodies: operand stack typing.
//!
//! Each instruction pops its operand types and pushes its result types onto
//! an abstract stack. `block`, `loop` and `if` push control frames recording
//! the stack height and their declared types; at `end` the stack above the
//! frame must hold exactly the result types. After an unconditional branch
//! the rest of the block is unreachable and the stack is polymorphic: pops
//! below the frame's height yield an unknown type that matches anything.

use super::context::{num, Context};
use crate::ast::{types, Func, Index, Instr, InstrKind, Local, RefType, TypeSignature, TypeUse, ValType};
use crate::error::Diagnostic;
use crate::wat::Span;

/// `None` is a value of unknown type, produced by a polymorphic stack.
type Operand = Option<ValType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    params: Vec<ValType>,
    results: Vec<ValType>,
    height: usize,
    unreachable: bool,
}

impl Frame {
    /// What a branch to this frame must supply.
    fn label_types(&self) -> &[ValType] {
        if self.kind == FrameKind::Loop {
            &self.params
        } else {
            &self.results
        }
    }
}

pub(super) struct CodeValidator<'a> {
    ctx: &'a Context,
    locals: Vec<ValType>,
    operands: Vec<Operand>,
    frames: Vec<Frame>,
    /// Mnemonic and position of the instruction being checked.
    current: (&'static str, Span),
}

/// Type-check one function body against its signature.
pub(super) fn validate_func(ctx: &Context, func: &Func, sig: &TypeSignature) -> Result<(), Diagnostic> {
    let mut validator = CodeValidator::new(ctx, sig, &func.locals, func.span);
    for instr in &func.body {
        validator.instr(instr)?;
    }
    validator.current = ("end", func.span);
    validator.pop_frame()?;
    if !validator.frames.is_empty() {
        return Err(Diagnostic::type_mismatch("block is missing its 'end'", func.span));
    }
    Ok(())
}

impl<'a> CodeValidator<'a> {
    fn new(ctx: &'a Context, sig: &TypeSignature, locals: &[Local], span: Span) -> Self {
        let mut all_locals = sig.params.clone();
        all_locals.extend(locals.iter().map(|local| local.ty));
        Self {
            ctx,
            locals: all_locals,
            operands: Vec::new(),
            frames: vec![Frame {
                kind: FrameKind::Function,
                params: Vec::new(),
                results: sig.results.clone(),
                height: 0,
                unreachable: false,
            }],
            current: ("func", span),
        }
    }

    // ========================================================================
    // Stack primitives
    // ========================================================================

    fn mismatch(&self, detail: impl std::fmt::Display) -> Diagnostic {
        let (name, span) = self.current;
        Diagnostic::type_mismatch(format!("{name}: {detail}"), span)
    }

    fn frame(&self) -> Result<&Frame, Diagnostic> {
        self.frames
            .last()
            .ok_or_else(|| self.mismatch("instruction after the end of the function"))
    }

    fn push(&mut self, ty: ValType) {
        self.operands.push(Some(ty));
    }

    fn push_all(&mut self, types: &[ValType]) {
        self.operands.extend(types.iter().copied().map(Some));
    }

    fn pop(&mut self) -> Result<Operand, Diagnostic> {
        let frame = self.frame()?;
        if self.operands.len() == frame.height {
            if frame.unreachable {
                return Ok(None);
            }
            return Err(self.mismatch("expected a value, found empty stack"));
        }
        Ok(self.operands.pop().flatten())
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<Operand, Diagnostic> {
        let frame = self.frame()?;
        if self.operands.len() == frame.height && !frame.unreachable {
            return Err(self.mismatch(format!("expected {expected}, found empty stack")));
        }
        match self.pop()? {
            Some(actual) if actual != expected => Err(self.mismatch(format!("expected {expected}, found {actual}"))),
            _ => Ok(Some(expected)),
        }
    }

    /// Pop `types`, last first.
    fn pop_all(&mut self, types: &[ValType]) -> Result<Vec<Operand>, Diagnostic> {
        let mut popped = vec![None; types.len()];
        for (slot, &ty) in popped.iter_mut().zip(types).rev() {
            *slot = self.pop_expect(ty)?;
        }
        Ok(popped)
    }

    /// Pop a reference of either kind.
    fn pop_ref(&mut self) -> Result<Operand, Diagnostic> {
        match self.pop()? {
            Some(ty) if !ty.is_ref() => Err(self.mismatch(format!("expected reference, found {ty}"))),
            other => Ok(other),
        }
    }

    fn push_frame(&mut self, kind: FrameKind, params: Vec<ValType>, results: Vec<ValType>) {
        let height = self.operands.len();
        self.push_all(&params);
        self.frames.push(Frame {
            kind,
            params,
            results,
            height,
            unreachable: false,
        });
    }

    fn pop_frame(&mut self) -> Result<Frame, Diagnostic> {
        let results = self.frame()?.results.clone();
        self.pop_all(&results)?;
        let frame = self.frame()?;
        if self.operands.len() != frame.height {
            let extra: Vec<String> = self.operands[frame.height..]
                .iter()
                .map(|ty| ty.map_or_else(|| "unknown".to_string(), |t| t.to_string()))
                .collect();
            return Err(self.mismatch(format!(
                "expected [{}] at end of block, found extra values [{}]",
                types::join(&results),
                extra.join(" ")
            )));
        }
        self.frames
            .pop()
            .ok_or_else(|| Diagnostic::internal("control frame stack is empty"))
    }

    fn set_unreachable(&mut self) -> Result<(), Diagnostic> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Diagnostic::internal("control frame stack is empty"))?;
        self.operands.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }

    fn label(&self, index: &Index) -> Result<&Frame, Diagnostic> {
        let depth = num(index)? as usize;
        self.frames
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.frames.get(i))
            .ok_or_else(|| Diagnostic::invalid_label(format!("label depth {depth} out of range"), index.span()))
    }

    fn label_types(&self, index: &Index) -> Result<Vec<ValType>, Diagnostic> {
        Ok(self.label(index)?.label_types().to_vec())
    }

    fn local(&self, index: &Index) -> Result<ValType, Diagnostic> {
        let n = num(index)?;
        self.locals
            .get(n as usize)
            .copied()
            .ok_or_else(|| Diagnostic::out_of_range(format!("unknown local {n}"), index.span()))
    }

    /// Parameters and results of a block type.
    fn block_type(&self, ty: &TypeUse) -> Result<(Vec<ValType>, Vec<ValType>), Diagnostic> {
        if ty.is_short_block_type() {
            let results = ty.inline.as_ref().map(|sig| sig.results.clone()).unwrap_or_default();
            return Ok((Vec::new(), results));
        }
        if !self.ctx.features.multi_value {
            return Err(self.mismatch("block parameters and multiple results require the multi-value feature"));
        }
        let (_, sig) = self.ctx.typeuse(ty)?;
        Ok((sig.params, sig.results))
    }

    fn check_alignment(&self, align: u32, natural: u32) -> Result<(), Diagnostic> {
        self.ctx.memory(self.current.1)?;
        if align > natural {
            let (name, span) = self.current;
            return Err(Diagnostic::out_of_range(
                format!(
                    "{name}: alignment {} is larger than natural alignment {}",
                    1u64 << align,
                    1u64 << natural
                ),
                span,
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn instr(&mut self, instr: &Instr) -> Result<(), Diagnostic> {
        use InstrKind as I;
        use ValType::{F32, F64, I32, I64};

        self.current = (instr.kind.name(), instr.span);
        match &instr.kind {
            I::Unreachable => self.set_unreachable()?,
            I::Nop => {}
            I::Block { ty, .. } => {
                let (params, results) = self.block_type(ty)?;
                self.pop_all(&params)?;
                self.push_frame(FrameKind::Block, params, results);
            }
            I::Loop { ty, .. } => {
                let (params, results) = self.block_type(ty)?;
                self.pop_all(&params)?;
                self.push_frame(FrameKind::Loop, params, results);
            }
            I::If { ty, .. } => {
                let (params, results) = self.block_type(ty)?;
                self.pop_expect(I32)?;
                self.pop_all(&params)?;
                self.push_frame(FrameKind::If, params, results);
            }
            I::Else => {
                let frame = self.pop_frame()?;
                if frame.kind != FrameKind::If {
                    return Err(self.mismatch("'else' without a matching 'if'"));
                }
                self.push_frame(FrameKind::Else, frame.params, frame.results);
            }
            I::End => {
                if self.frames.len() <= 1 {
                    return Err(self.mismatch("'end' without an open block"));
                }
                let frame = self.pop_frame()?;
                if frame.kind == FrameKind::If && frame.params != frame.results {
                    return Err(self.mismatch(format!(
                        "'if' without 'else' must leave its parameters unchanged, [{}] -> [{}]",
                        types::join(&frame.params),
                        types::join(&frame.results)
                    )));
                }
                self.push_all(&frame.results);
            }
            I::Br(label) => {
                let expected = self.label_types(label)?;
                self.pop_all(&expected)?;
                self.set_unreachable()?;
            }
            I::BrIf(label) => {
                self.pop_expect(I32)?;
                let expected = self.label_types(label)?;
                self.pop_all(&expected)?;
                self.push_all(&expected);
            }
            I::BrTable { targets, default } => {
                self.pop_expect(I32)?;
                let default_types = self.label_types(default)?;
                for target in targets {
                    let expected = self.label_types(target)?;
                    if expected.len() != default_types.len() {
                        return Err(self.mismatch(format!(
                            "target {target} expects [{}] but the default expects [{}]",
                            types::join(&expected),
                            types::join(&default_types)
                        )));
                    }
                    let popped = self.pop_all(&expected)?;
                    self.operands.extend(popped);
                }
                self.pop_all(&default_types)?;
                self.set_unreachable()?;
            }
            I::Return => {
                let results = self
                    .frames
                    .first()
                    .map(|frame| frame.results.clone())
                    .unwrap_or_default();
                self.pop_all(&results)?;
                self.set_unreachable()?;
            }
            I::Call(func) => {
                let sig = self.ctx.func_type(func)?.clone();
                self.pop_all(&sig.params)?;
                self.push_all(&sig.results);
            }
            I::CallIndirect { table, ty } => {
                if self.ctx.table(table)?.elem != RefType::Func {
                    return Err(self.mismatch(format!("table {table} does not hold funcref")));
                }
                let (_, sig) = self.ctx.typeuse(ty)?;
                self.pop_expect(I32)?;
                self.pop_all(&sig.params)?;
                self.push_all(&sig.results);
            }

            I::Drop => {
                self.pop()?;
            }
            I::Select(None) => {
                self.pop_expect(I32)?;
                let first = self.pop()?;
                let second = self.pop()?;
                for ty in [first, second].into_iter().flatten() {
                    if !ty.is_num() {
                        return Err(self.mismatch(format!("untyped select needs numeric operands, found {ty}")));
                    }
                }
                match (first, second) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(self.mismatch(format!("operands differ, {b} and {a}")));
                    }
                    _ => self.operands.push(first.or(second)),
                }
            }
            I::Select(Some(annotated)) => {
                let [ty] = annotated.as_slice() else {
                    return Err(self.mismatch(format!("expected one result type, found [{}]", types::join(annotated))));
                };
                let ty = *ty;
                self.pop_expect(I32)?;
                self.pop_expect(ty)?;
                self.pop_expect(ty)?;
                self.push(ty);
            }

            I::LocalGet(index) => {
                let ty = self.local(index)?;
                self.push(ty);
            }
            I::LocalSet(index) => {
                let ty = self.local(index)?;
                self.pop_expect(ty)?;
            }
            I::LocalTee(index) => {
                let ty = self.local(index)?;
                self.pop_expect(ty)?;
                self.push(ty);
            }
            I::GlobalGet(index) => {
                let ty = self.ctx.global(index)?.ty;
                self.push(ty);
            }
            I::GlobalSet(index) => {
                let global = *self.ctx.global(index)?;
                if !global.mutable {
                    return Err(self.mismatch(format!("global {index} is immutable")));
                }
                self.pop_expect(global.ty)?;
            }

            I::TableGet(table) => {
                let elem = self.ctx.table(table)?.elem.val_type();
                self.pop_expect(I32)?;
                self.push(elem);
            }
            I::TableSet(table) => {
                let elem = self.ctx.table(table)?.elem.val_type();
                self.pop_expect(elem)?;
                self.pop_expect(I32)?;
            }
            I::TableSize(table) => {
                self.ctx.table(table)?;
                self.push(I32);
            }
            I::TableGrow(table) => {
                let elem = self.ctx.table(table)?.elem.val_type();
                self.pop_expect(I32)?;
                self.pop_expect(elem)?;
                self.push(I32);
            }
            I::TableFill(table) => {
                let elem = self.ctx.table(table)?.elem.val_type();
                self.pop_expect(I32)?;
                self.pop_expect(elem)?;
                self.pop_expect(I32)?;
            }
            I::TableCopy { dst, src } => {
                let dst_ty = self.ctx.table(dst)?.elem;
                let src_ty = self.ctx.table(src)?.elem;
                if dst_ty != src_ty {
                    return Err(self.mismatch(format!("cannot copy {src_ty} elements into a {dst_ty} table")));
                }
                self.pop_all(&[I32, I32, I32])?;
            }
            I::TableInit { table, elem } => {
                let table_ty = self.ctx.table(table)?.elem;
                let elem_ty = self.ctx.elem(elem)?;
                if table_ty != elem_ty {
                    return Err(self.mismatch(format!("cannot initialise a {table_ty} table from {elem_ty} elements")));
                }
                self.pop_all(&[I32, I32, I32])?;
            }
            I::ElemDrop(elem) => {
                self.ctx.elem(elem)?;
            }

            I::Load(op, memarg) => {
                self.check_alignment(memarg.align, op.natural_align())?;
                self.pop_expect(I32)?;
                self.push(op.ty());
            }
            I::Store(op, memarg) => {
                self.check_alignment(memarg.align, op.natural_align())?;
                self.pop_expect(op.ty())?;
                self.pop_expect(I32)?;
            }
            I::MemorySize => {
                self.ctx.memory(instr.span)?;
                self.push(I32);
            }
            I::MemoryGrow => {
                self.ctx.memory(instr.span)?;
                self.pop_expect(I32)?;
                self.push(I32);
            }
            I::MemoryFill | I::MemoryCopy => {
                self.ctx.memory(instr.span)?;
                self.pop_all(&[I32, I32, I32])?;
            }
            I::MemoryInit(data) => {
                self.ctx.memory(instr.span)?;
                self.ctx.data(data)?;
                self.pop_all(&[I32, I32, I32])?;
            }
            I::DataDrop(data) => {
                self.ctx.data(data)?;
            }

            I::I32Const(_) => self.push(I32),
            I::I64Const(_) => self.push(I64),
            I::F32Const(_) => self.push(F32),
            I::F64Const(_) => self.push(F64),

            I::RefNull(ty) => self.push(ty.val_type()),
            I::RefIsNull => {
                self.pop_ref()?;
                self.push(I32);
            }
            I::RefFunc(func) => {
                self.ctx.func_type(func)?;
                let n = num(func)?;
                if !self.ctx.refs.contains(&n) {
                    return Err(Diagnostic::unresolved(
                        format!("function {n} is not declared in an element segment, export or global initialiser"),
                        func.span(),
                    ));
                }
                self.push(ValType::FuncRef);
            }

            I::Numeric(op) => {
                self.pop_all(op.params())?;
                self.push_all(op.results());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::validate;
    use crate::config::{Config, Features};
    use crate::error::{Diagnostic, ErrorKind};
    use crate::parser::parse;
    use crate::resolve::resolve;
    use rstest::rstest;

    fn check_with(source: &str, config: &Config) -> Result<(), Diagnostic> {
        validate(&resolve(&parse(source, config)?)?, config).map(|_| ())
    }

    fn check(source: &str) -> Result<(), Diagnostic> {
        check_with(source, &Config::default())
    }

    #[rstest]
    #[case("(func (result i32) (i32.add (i32.const 1) (i32.const 2)))")]
    #[case("(func (param i64) (result i64) local.get 0 i64.const 1 i64.shl)")]
    #[case("(func (result i32) (block (result i32) (br 0 (i32.const 1))))")]
    #[case("(func (result i32) (loop (result i32) (i32.const 1)))")]
    #[case("(func (result i32) unreachable)")]
    #[case("(func (result i32) (return (i32.const 0)) drop)")]
    #[case("(func (result f32) unreachable f32.neg)")]
    #[case("(func (param i32) (result i32) (if (result i32) (local.get 0) (then (i32.const 1)) (else (i32.const 2))))")]
    #[case("(func (param i32) (if (local.get 0) (then nop)))")]
    #[case("(func (result i32) (select (i32.const 1) (i32.const 2) (i32.const 0)))")]
    #[case("(func (result externref) (select (result externref) (ref.null extern) (ref.null extern) (i32.const 0)))")]
    #[case("(func (param i32) (result i32) (block $a (result i32) (block (br_table $a 1 (i32.const 7) (local.get 0))) (i32.const 0)))")]
    #[case("(func (result i32 i64) (i32.const 1) (i64.const 2))")]
    #[case("(func (result i32) (i32.const 1) (block (param i32) (result i32) (i32.const 1) i32.add))")]
    #[case("(func (local i32) (local.set 0 (i32.const 5)) (drop (local.tee 0 (i32.const 6))))")]
    #[case("(global $g (mut i32) (i32.const 0)) (func (global.set $g (i32.const 1)))")]
    #[case("(memory 1) (func (i32.store offset=4 align=4 (i32.const 0) (i32.const 1)))")]
    #[case("(memory 1) (func (result i64) (i64.load8_s (i32.const 0)))")]
    #[case("(memory 1) (func (memory.fill (i32.const 0) (i32.const 0) (i32.const 0)))")]
    #[case("(memory 1) (data $d \"x\") (func (memory.init $d (i32.const 0) (i32.const 0) (i32.const 1)) (data.drop $d))")]
    #[case("(table 1 funcref) (func (result i32) (table.grow (ref.null func) (i32.const 1)))")]
    #[case("(table 1 funcref) (elem $e func) (func (table.init $e (i32.const 0) (i32.const 0) (i32.const 0)) (elem.drop $e))")]
    #[case("(func $f (result funcref) (ref.func $f)) (elem declare func $f)")]
    #[case("(func (result i32) (ref.is_null (ref.null extern)))")]
    #[case("(type $t (func (param i32) (result i32))) (table 1 funcref) (func (result i32) (call_indirect (type $t) (i32.const 1) (i32.const 0)))")]
    #[case("(func (result i32) (i32.trunc_sat_f32_s (f32.const 1.5)))")]
    #[case("(func (result i32) (block $l (result i32) (br_if $l (i32.const 1) (i32.const 0))))")]
    fn valid_bodies(#[case] fields: &str) {
        if let Err(err) = check(&format!("(module {fields})")) {
            panic!("{fields}: {err}");
        }
    }

    #[rstest]
    #[case("(func (result i32) (f64.const 1))", ErrorKind::TypeMismatch)]
    #[case("(func (result i32))", ErrorKind::TypeMismatch)]
    #[case("(func (i32.const 1))", ErrorKind::TypeMismatch)]
    #[case("(func (i32.add (i32.const 1) (i64.const 2)) drop)", ErrorKind::TypeMismatch)]
    #[case("(func i32.add drop)", ErrorKind::TypeMismatch)]
    #[case("(func (param i32) (result i32) (if (result i32) (local.get 0) (then (i32.const 1))))", ErrorKind::TypeMismatch)]
    #[case("(func (block (result i32) (br 0)) drop)", ErrorKind::TypeMismatch)]
    #[case("(func (result i32) (block (result i32) (br 0 (i64.const 1))))", ErrorKind::TypeMismatch)]
    #[case("(func (select (ref.null func) (ref.null func) (i32.const 1)) drop)", ErrorKind::TypeMismatch)]
    #[case("(func (select (i32.const 1) (i64.const 1) (i32.const 1)) drop)", ErrorKind::TypeMismatch)]
    #[case("(global i32 (i32.const 0)) (func (global.set 0 (i32.const 1)))", ErrorKind::TypeMismatch)]
    #[case("(func local.get 0 drop)", ErrorKind::IndexOutOfRange)]
    #[case("(func call 3)", ErrorKind::IndexOutOfRange)]
    #[case("(func (drop (i32.load (i32.const 0))))", ErrorKind::IndexOutOfRange)]
    #[case("(memory 1) (func (drop (i32.load align=8 (i32.const 0))))", ErrorKind::IndexOutOfRange)]
    #[case("(memory 1) (func (data.drop 0))", ErrorKind::IndexOutOfRange)]
    #[case("(func $f (drop (ref.func $f)))", ErrorKind::UnresolvedSymbol)]
    #[case("(table 1 externref) (func (call_indirect (i32.const 0)))", ErrorKind::TypeMismatch)]
    #[case("(table $a 1 funcref) (table $b 1 externref) (func (table.copy $a $b (i32.const 0) (i32.const 0) (i32.const 0)))", ErrorKind::TypeMismatch)]
    #[case("(func (block (param i32) drop))", ErrorKind::TypeMismatch)]
    #[case("(func (br_table 0 1 (i32.const 0)))", ErrorKind::InvalidLabel)]
    fn invalid_bodies(#[case] fields: &str, #[case] kind: ErrorKind) {
        let err = check(&format!("(module {fields})")).unwrap_err();
        assert_eq!(err.kind, kind, "{fields}: {err}");
    }

    #[test]
    fn mismatch_names_instruction_and_types() {
        let err = check("(module (func (result i32) (f64.const 1)))").unwrap_err();
        assert_eq!(err.message, "end: expected i32, found f64");
        let err = check("(module (func (drop (i64.eqz (i32.const 0)))))").unwrap_err();
        assert_eq!(err.message, "i64.eqz: expected i64, found i32");
    }

    #[test]
    fn multi_value_needs_feature() {
        let config = Config {
            features: Features {
                multi_value: false,
                ..Features::all()
            },
            ..Config::default()
        };
        for source in [
            "(module (func (result i32 i32) (i32.const 1) (i32.const 2)))",
            "(module (func (block (param i32) (result i32)) drop))",
            "(module (func (i32.const 0) (block (result i32 i32) unreachable) drop drop drop))",
        ] {
            let err = check_with(source, &config).unwrap_err();
            assert_eq!(err.kind, ErrorKind::TypeMismatch, "{source}: {err}");
        }
        check_with("(module (func (result i32) (block (result i32) (i32.const 1))))", &config).unwrap();
    }
}
