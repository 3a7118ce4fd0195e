//! Instruction encoding.

use super::encoding::{write_f32_bits, write_f64_bits, write_len, write_vs32, write_vs33, write_vs64, write_vu32, BLOCK_TYPE_EMPTY};
use super::index;
use crate::ast::ops::{Opcode, MISC_PREFIX};
use crate::ast::{Instr, InstrKind, MemArg, TypeUse};
use crate::error::Diagnostic;

/// Appends one instruction.
pub(super) fn encode_instr(buf: &mut Vec<u8>, instr: &Instr) -> Result<(), Diagnostic> {
    use InstrKind as I;

    match &instr.kind {
        I::Unreachable => buf.push(0x00),
        I::Nop => buf.push(0x01),
        I::Block { ty, .. } => {
            buf.push(0x02);
            block_type(buf, ty)?;
        }
        I::Loop { ty, .. } => {
            buf.push(0x03);
            block_type(buf, ty)?;
        }
        I::If { ty, .. } => {
            buf.push(0x04);
            block_type(buf, ty)?;
        }
        I::Else => buf.push(0x05),
        I::End => buf.push(0x0B),
        I::Br(label) => {
            buf.push(0x0C);
            write_vu32(buf, index(label)?);
        }
        I::BrIf(label) => {
            buf.push(0x0D);
            write_vu32(buf, index(label)?);
        }
        I::BrTable { targets, default } => {
            buf.push(0x0E);
            write_len(buf, targets.len());
            for target in targets {
                write_vu32(buf, index(target)?);
            }
            write_vu32(buf, index(default)?);
        }
        I::Return => buf.push(0x0F),
        I::Call(func) => {
            buf.push(0x10);
            write_vu32(buf, index(func)?);
        }
        I::CallIndirect { table, ty } => {
            buf.push(0x11);
            write_vu32(buf, type_index(ty)?);
            write_vu32(buf, index(table)?);
        }

        I::Drop => buf.push(0x1A),
        I::Select(None) => buf.push(0x1B),
        I::Select(Some(types)) => {
            buf.push(0x1C);
            write_len(buf, types.len());
            buf.extend(types.iter().map(|ty| ty.byte()));
        }

        I::LocalGet(i) => indexed(buf, 0x20, i)?,
        I::LocalSet(i) => indexed(buf, 0x21, i)?,
        I::LocalTee(i) => indexed(buf, 0x22, i)?,
        I::GlobalGet(i) => indexed(buf, 0x23, i)?,
        I::GlobalSet(i) => indexed(buf, 0x24, i)?,
        I::TableGet(i) => indexed(buf, 0x25, i)?,
        I::TableSet(i) => indexed(buf, 0x26, i)?,

        I::Load(op, memarg) => {
            buf.push(op.opcode());
            write_memarg(buf, memarg);
        }
        I::Store(op, memarg) => {
            buf.push(op.opcode());
            write_memarg(buf, memarg);
        }
        I::MemorySize => buf.extend_from_slice(&[0x3F, 0x00]),
        I::MemoryGrow => buf.extend_from_slice(&[0x40, 0x00]),

        I::I32Const(value) => {
            buf.push(0x41);
            write_vs32(buf, *value);
        }
        I::I64Const(value) => {
            buf.push(0x42);
            write_vs64(buf, *value);
        }
        I::F32Const(bits) => {
            buf.push(0x43);
            write_f32_bits(buf, *bits);
        }
        I::F64Const(bits) => {
            buf.push(0x44);
            write_f64_bits(buf, *bits);
        }

        I::RefNull(ty) => {
            buf.push(0xD0);
            buf.push(ty.byte());
        }
        I::RefIsNull => buf.push(0xD1),
        I::RefFunc(func) => indexed(buf, 0xD2, func)?,

        I::Numeric(op) => write_opcode(buf, op.opcode()),

        I::MemoryInit(data) => {
            misc(buf, 8);
            write_vu32(buf, index(data)?);
            buf.push(0x00);
        }
        I::DataDrop(data) => {
            misc(buf, 9);
            write_vu32(buf, index(data)?);
        }
        I::MemoryCopy => {
            misc(buf, 10);
            buf.extend_from_slice(&[0x00, 0x00]);
        }
        I::MemoryFill => {
            misc(buf, 11);
            buf.push(0x00);
        }
        I::TableInit { table, elem } => {
            misc(buf, 12);
            write_vu32(buf, index(elem)?);
            write_vu32(buf, index(table)?);
        }
        I::ElemDrop(elem) => {
            misc(buf, 13);
            write_vu32(buf, index(elem)?);
        }
        I::TableCopy { dst, src } => {
            misc(buf, 14);
            write_vu32(buf, index(dst)?);
            write_vu32(buf, index(src)?);
        }
        I::TableGrow(table) => {
            misc(buf, 15);
            write_vu32(buf, index(table)?);
        }
        I::TableSize(table) => {
            misc(buf, 16);
            write_vu32(buf, index(table)?);
        }
        I::TableFill(table) => {
            misc(buf, 17);
            write_vu32(buf, index(table)?);
        }
    }
    Ok(())
}

fn indexed(buf: &mut Vec<u8>, opcode: u8, i: &crate::ast::Index) -> Result<(), Diagnostic> {
    buf.push(opcode);
    write_vu32(buf, index(i)?);
    Ok(())
}

fn misc(buf: &mut Vec<u8>, sub: u32) {
    write_opcode(buf, Opcode::Misc(sub));
}

fn write_opcode(buf: &mut Vec<u8>, opcode: Opcode) {
    match opcode {
        Opcode::Byte(byte) => buf.push(byte),
        Opcode::Misc(sub) => {
            buf.push(MISC_PREFIX);
            write_vu32(buf, sub);
        }
    }
}

/// ```text
/// memarg ::= align:u32 offset:u32
/// ```
fn write_memarg(buf: &mut Vec<u8>, memarg: &MemArg) {
    write_vu32(buf, memarg.align);
    write_vu32(buf, memarg.offset);
}

/// ```text
/// blocktype ::= 0x40 | valtype | typeidx:s33
/// ```
fn block_type(buf: &mut Vec<u8>, ty: &TypeUse) -> Result<(), Diagnostic> {
    if ty.is_short_block_type() {
        match ty.inline.as_ref().and_then(|sig| sig.results.first()) {
            Some(result) => buf.push(result.byte()),
            None => buf.push(BLOCK_TYPE_EMPTY),
        }
        return Ok(());
    }
    write_vs33(buf, type_index(ty)?);
    Ok(())
}

pub(super) fn type_index(ty: &TypeUse) -> Result<u32, Diagnostic> {
    let i = ty
        .index
        .as_ref()
        .ok_or_else(|| Diagnostic::internal(format!("type use at {} has no index", ty.span)))?;
    index(i)
}
