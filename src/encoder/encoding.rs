//! Binary encoding primitives for WebAssembly values.
//!
//! LEB128 integers, IEEE 754 floats and length-prefixed vectors. All
//! functions append to a caller-provided `&mut Vec<u8>`.

use byteorder::{ByteOrder, LittleEndian};

// ---------------------------------------------------------------------------
// WebAssembly binary format constants
// ---------------------------------------------------------------------------

pub const MAGIC: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;

// Section IDs
pub const SECTION_CUSTOM: u8 = 0;
pub const SECTION_TYPE: u8 = 1;
pub const SECTION_IMPORT: u8 = 2;
pub const SECTION_FUNCTION: u8 = 3;
pub const SECTION_TABLE: u8 = 4;
pub const SECTION_MEMORY: u8 = 5;
pub const SECTION_GLOBAL: u8 = 6;
pub const SECTION_EXPORT: u8 = 7;
pub const SECTION_START: u8 = 8;
pub const SECTION_ELEMENT: u8 = 9;
pub const SECTION_CODE: u8 = 10;
pub const SECTION_DATA: u8 = 11;
pub const SECTION_DATA_COUNT: u8 = 12;

pub const TYPE_FUNC: u8 = 0x60;

// Import/export descriptor kinds
pub const DESC_FUNC: u8 = 0x00;
pub const DESC_TABLE: u8 = 0x01;
pub const DESC_MEMORY: u8 = 0x02;
pub const DESC_GLOBAL: u8 = 0x03;

// Element segment flags: bit 0 = not active, bit 1 = explicit table (or
// declarative when not active), bit 2 = expressions
pub const ELEMKIND_FUNCREF: u8 = 0x00;
pub const ELEM_ACTIVE_FUNCS: u32 = 0;
pub const ELEM_PASSIVE_FUNCS: u32 = 1;
pub const ELEM_ACTIVE_TABLE_FUNCS: u32 = 2;
pub const ELEM_DECLARATIVE_FUNCS: u32 = 3;
pub const ELEM_ACTIVE_EXPRS: u32 = 4;
pub const ELEM_PASSIVE_EXPRS: u32 = 5;
pub const ELEM_ACTIVE_TABLE_EXPRS: u32 = 6;
pub const ELEM_DECLARATIVE_EXPRS: u32 = 7;

// Data segment flags
pub const DATA_ACTIVE: u32 = 0;
pub const DATA_PASSIVE: u32 = 1;
pub const DATA_ACTIVE_EXPLICIT: u32 = 2;

pub const OP_END: u8 = 0x0B;
pub const BLOCK_TYPE_EMPTY: u8 = 0x40;

// ---------------------------------------------------------------------------
// Unsigned LEB128
// ---------------------------------------------------------------------------

fn write_vu(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}

/// Appends the unsigned LEB128 encoding of a u32 value to `buf`.
pub fn write_vu32(buf: &mut Vec<u8>, v: u32) {
    write_vu(buf, v as u64);
}

/// Appends a boolean as a one-byte LEB128 value (0x00 or 0x01).
pub fn write_vu1(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

/// Appends a collection length as an unsigned LEB128 value.
pub fn write_len(buf: &mut Vec<u8>, len: usize) {
    write_vu(buf, len as u64);
}

// ---------------------------------------------------------------------------
// Signed LEB128
// ---------------------------------------------------------------------------

fn write_vs(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0) {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}

/// Appends the signed LEB128 encoding of an i32 value to `buf`.
pub fn write_vs32(buf: &mut Vec<u8>, v: i32) {
    write_vs(buf, v as i64);
}

/// Appends the signed LEB128 encoding of an i64 value to `buf`.
pub fn write_vs64(buf: &mut Vec<u8>, v: i64) {
    write_vs(buf, v);
}

/// Appends a block type index, a signed 33-bit LEB128 that is never negative.
pub fn write_vs33(buf: &mut Vec<u8>, index: u32) {
    write_vs(buf, index as i64);
}

// ---------------------------------------------------------------------------
// IEEE 754 floats (little-endian), from raw bits so NaN payloads survive
// ---------------------------------------------------------------------------

pub fn write_f32_bits(buf: &mut Vec<u8>, bits: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, bits);
    buf.extend_from_slice(&bytes);
}

pub fn write_f64_bits(buf: &mut Vec<u8>, bits: u64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_u64(&mut bytes, bits);
    buf.extend_from_slice(&bytes);
}

// ---------------------------------------------------------------------------
// Length-prefixed vectors
// ---------------------------------------------------------------------------

/// Appends a length-prefixed byte vector (vu32 length + raw bytes) to `buf`.
pub fn write_u8vec(buf: &mut Vec<u8>, v: &[u8]) {
    write_len(buf, v.len());
    buf.extend_from_slice(v);
}

/// Appends a UTF-8 name as a length-prefixed byte vector.
pub fn write_name(buf: &mut Vec<u8>, name: &str) {
    write_u8vec(buf, name.as_bytes());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
