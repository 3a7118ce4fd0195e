//! Operator tables: one closed enum per instruction family.
//!
//! Each row gives the mnemonic, binary opcode and stack signature, so the
//! parser, validator and encoder all dispatch on the same exhaustive match.

use super::types::ValType;
use crate::config::Feature;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use self::Opcode::{Byte, Misc};
use super::types::ValType::{F32, F64, I32, I64};

/// Binary opcode of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// A single-byte opcode.
    Byte(u8),
    /// `0xFC` followed by a u32 LEB128 sub-opcode.
    Misc(u32),
}

pub const MISC_PREFIX: u8 = 0xFC;

macro_rules! numeric_ops {
    (@feature) => { None };
    (@feature $feature:ident) => { Some(Feature::$feature) };
    ($( $variant:ident = $mnemonic:literal, $opcode:expr, [$($param:ident),*] -> [$($result:ident),*] $(, $feature:ident)?; )*) => {
        /// Plain numeric instructions: constants aside, everything that only
        /// pops and pushes numbers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NumOp {
            $($variant,)*
        }

        impl NumOp {
            pub const ALL: &'static [NumOp] = &[$(NumOp::$variant,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(NumOp::$variant => $mnemonic,)*
                }
            }

            pub fn opcode(self) -> Opcode {
                match self {
                    $(NumOp::$variant => $opcode,)*
                }
            }

            pub fn params(self) -> &'static [ValType] {
                match self {
                    $(NumOp::$variant => &[$($param),*],)*
                }
            }

            pub fn results(self) -> &'static [ValType] {
                match self {
                    $(NumOp::$variant => &[$($result),*],)*
                }
            }

            /// The proposal that introduced this operator, if not MVP.
            pub fn feature(self) -> Option<Feature> {
                match self {
                    $(NumOp::$variant => numeric_ops!(@feature $($feature)?),)*
                }
            }
        }
    };
}

numeric_ops! {
    I32Eqz = "i32.eqz", Byte(0x45), [I32] -> [I32];
    I32Eq = "i32.eq", Byte(0x46), [I32, I32] -> [I32];
    I32Ne = "i32.ne", Byte(0x47), [I32, I32] -> [I32];
    I32LtS = "i32.lt_s", Byte(0x48), [I32, I32] -> [I32];
    I32LtU = "i32.lt_u", Byte(0x49), [I32, I32] -> [I32];
    I32GtS = "i32.gt_s", Byte(0x4A), [I32, I32] -> [I32];
    I32GtU = "i32.gt_u", Byte(0x4B), [I32, I32] -> [I32];
    I32LeS = "i32.le_s", Byte(0x4C), [I32, I32] -> [I32];
    I32LeU = "i32.le_u", Byte(0x4D), [I32, I32] -> [I32];
    I32GeS = "i32.ge_s", Byte(0x4E), [I32, I32] -> [I32];
    I32GeU = "i32.ge_u", Byte(0x4F), [I32, I32] -> [I32];

    I64Eqz = "i64.eqz", Byte(0x50), [I64] -> [I32];
    I64Eq = "i64.eq", Byte(0x51), [I64, I64] -> [I32];
    I64Ne = "i64.ne", Byte(0x52), [I64, I64] -> [I32];
    I64LtS = "i64.lt_s", Byte(0x53), [I64, I64] -> [I32];
    I64LtU = "i64.lt_u", Byte(0x54), [I64, I64] -> [I32];
    I64GtS = "i64.gt_s", Byte(0x55), [I64, I64] -> [I32];
    I64GtU = "i64.gt_u", Byte(0x56), [I64, I64] -> [I32];
    I64LeS = "i64.le_s", Byte(0x57), [I64, I64] -> [I32];
    I64LeU = "i64.le_u", Byte(0x58), [I64, I64] -> [I32];
    I64GeS = "i64.ge_s", Byte(0x59), [I64, I64] -> [I32];
    I64GeU = "i64.ge_u", Byte(0x5A), [I64, I64] -> [I32];

    F32Eq = "f32.eq", Byte(0x5B), [F32, F32] -> [I32];
    F32Ne = "f32.ne", Byte(0x5C), [F32, F32] -> [I32];
    F32Lt = "f32.lt", Byte(0x5D), [F32, F32] -> [I32];
    F32Gt = "f32.gt", Byte(0x5E), [F32, F32] -> [I32];
    F32Le = "f32.le", Byte(0x5F), [F32, F32] -> [I32];
    F32Ge = "f32.ge", Byte(0x60), [F32, F32] -> [I32];

    F64Eq = "f64.eq", Byte(0x61), [F64, F64] -> [I32];
    F64Ne = "f64.ne", Byte(0x62), [F64, F64] -> [I32];
    F64Lt = "f64.lt", Byte(0x63), [F64, F64] -> [I32];
    F64Gt = "f64.gt", Byte(0x64), [F64, F64] -> [I32];
    F64Le = "f64.le", Byte(0x65), [F64, F64] -> [I32];
    F64Ge = "f64.ge", Byte(0x66), [F64, F64] -> [I32];

    I32Clz = "i32.clz", Byte(0x67), [I32] -> [I32];
    I32Ctz = "i32.ctz", Byte(0x68), [I32] -> [I32];
    I32Popcnt = "i32.popcnt", Byte(0x69), [I32] -> [I32];
    I32Add = "i32.add", Byte(0x6A), [I32, I32] -> [I32];
    I32Sub = "i32.sub", Byte(0x6B), [I32, I32] -> [I32];
    I32Mul = "i32.mul", Byte(0x6C), [I32, I32] -> [I32];
    I32DivS = "i32.div_s", Byte(0x6D), [I32, I32] -> [I32];
    I32DivU = "i32.div_u", Byte(0x6E), [I32, I32] -> [I32];
    I32RemS = "i32.rem_s", Byte(0x6F), [I32, I32] -> [I32];
    I32RemU = "i32.rem_u", Byte(0x70), [I32, I32] -> [I32];
    I32And = "i32.and", Byte(0x71), [I32, I32] -> [I32];
    I32Or = "i32.or", Byte(0x72), [I32, I32] -> [I32];
    I32Xor = "i32.xor", Byte(0x73), [I32, I32] -> [I32];
    I32Shl = "i32.shl", Byte(0x74), [I32, I32] -> [I32];
    I32ShrS = "i32.shr_s", Byte(0x75), [I32, I32] -> [I32];
    I32ShrU = "i32.shr_u", Byte(0x76), [I32, I32] -> [I32];
    I32Rotl = "i32.rotl", Byte(0x77), [I32, I32] -> [I32];
    I32Rotr = "i32.rotr", Byte(0x78), [I32, I32] -> [I32];

    I64Clz = "i64.clz", Byte(0x79), [I64] -> [I64];
    I64Ctz = "i64.ctz", Byte(0x7A), [I64] -> [I64];
    I64Popcnt = "i64.popcnt", Byte(0x7B), [I64] -> [I64];
    I64Add = "i64.add", Byte(0x7C), [I64, I64] -> [I64];
    I64Sub = "i64.sub", Byte(0x7D), [I64, I64] -> [I64];
    I64Mul = "i64.mul", Byte(0x7E), [I64, I64] -> [I64];
    I64DivS = "i64.div_s", Byte(0x7F), [I64, I64] -> [I64];
    I64DivU = "i64.div_u", Byte(0x80), [I64, I64] -> [I64];
    I64RemS = "i64.rem_s", Byte(0x81), [I64, I64] -> [I64];
    I64RemU = "i64.rem_u", Byte(0x82), [I64, I64] -> [I64];
    I64And = "i64.and", Byte(0x83), [I64, I64] -> [I64];
    I64Or = "i64.or", Byte(0x84), [I64, I64] -> [I64];
    I64Xor = "i64.xor", Byte(0x85), [I64, I64] -> [I64];
    I64Shl = "i64.shl", Byte(0x86), [I64, I64] -> [I64];
    I64ShrS = "i64.shr_s", Byte(0x87), [I64, I64] -> [I64];
    I64ShrU = "i64.shr_u", Byte(0x88), [I64, I64] -> [I64];
    I64Rotl = "i64.rotl", Byte(0x89), [I64, I64] -> [I64];
    I64Rotr = "i64.rotr", Byte(0x8A), [I64, I64] -> [I64];

    F32Abs = "f32.abs", Byte(0x8B), [F32] -> [F32];
    F32Neg = "f32.neg", Byte(0x8C), [F32] -> [F32];
    F32Ceil = "f32.ceil", Byte(0x8D), [F32] -> [F32];
    F32Floor = "f32.floor", Byte(0x8E), [F32] -> [F32];
    F32Trunc = "f32.trunc", Byte(0x8F), [F32] -> [F32];
    F32Nearest = "f32.nearest", Byte(0x90), [F32] -> [F32];
    F32Sqrt = "f32.sqrt", Byte(0x91), [F32] -> [F32];
    F32Add = "f32.add", Byte(0x92), [F32, F32] -> [F32];
    F32Sub = "f32.sub", Byte(0x93), [F32, F32] -> [F32];
    F32Mul = "f32.mul", Byte(0x94), [F32, F32] -> [F32];
    F32Div = "f32.div", Byte(0x95), [F32, F32] -> [F32];
    F32Min = "f32.min", Byte(0x96), [F32, F32] -> [F32];
    F32Max = "f32.max", Byte(0x97), [F32, F32] -> [F32];
    F32Copysign = "f32.copysign", Byte(0x98), [F32, F32] -> [F32];

    F64Abs = "f64.abs", Byte(0x99), [F64] -> [F64];
    F64Neg = "f64.neg", Byte(0x9A), [F64] -> [F64];
    F64Ceil = "f64.ceil", Byte(0x9B), [F64] -> [F64];
    F64Floor = "f64.floor", Byte(0x9C), [F64] -> [F64];
    F64Trunc = "f64.trunc", Byte(0x9D), [F64] -> [F64];
    F64Nearest = "f64.nearest", Byte(0x9E), [F64] -> [F64];
    F64Sqrt = "f64.sqrt", Byte(0x9F), [F64] -> [F64];
    F64Add = "f64.add", Byte(0xA0), [F64, F64] -> [F64];
    F64Sub = "f64.sub", Byte(0xA1), [F64, F64] -> [F64];
    F64Mul = "f64.mul", Byte(0xA2), [F64, F64] -> [F64];
    F64Div = "f64.div", Byte(0xA3), [F64, F64] -> [F64];
    F64Min = "f64.min", Byte(0xA4), [F64, F64] -> [F64];
    F64Max = "f64.max", Byte(0xA5), [F64, F64] -> [F64];
    F64Copysign = "f64.copysign", Byte(0xA6), [F64, F64] -> [F64];

    I32WrapI64 = "i32.wrap_i64", Byte(0xA7), [I64] -> [I32];
    I32TruncF32S = "i32.trunc_f32_s", Byte(0xA8), [F32] -> [I32];
    I32TruncF32U = "i32.trunc_f32_u", Byte(0xA9), [F32] -> [I32];
    I32TruncF64S = "i32.trunc_f64_s", Byte(0xAA), [F64] -> [I32];
    I32TruncF64U = "i32.trunc_f64_u", Byte(0xAB), [F64] -> [I32];
    I64ExtendI32S = "i64.extend_i32_s", Byte(0xAC), [I32] -> [I64];
    I64ExtendI32U = "i64.extend_i32_u", Byte(0xAD), [I32] -> [I64];
    I64TruncF32S = "i64.trunc_f32_s", Byte(0xAE), [F32] -> [I64];
    I64TruncF32U = "i64.trunc_f32_u", Byte(0xAF), [F32] -> [I64];
    I64TruncF64S = "i64.trunc_f64_s", Byte(0xB0), [F64] -> [I64];
    I64TruncF64U = "i64.trunc_f64_u", Byte(0xB1), [F64] -> [I64];
    F32ConvertI32S = "f32.convert_i32_s", Byte(0xB2), [I32] -> [F32];
    F32ConvertI32U = "f32.convert_i32_u", Byte(0xB3), [I32] -> [F32];
    F32ConvertI64S = "f32.convert_i64_s", Byte(0xB4), [I64] -> [F32];
    F32ConvertI64U = "f32.convert_i64_u", Byte(0xB5), [I64] -> [F32];
    F32DemoteF64 = "f32.demote_f64", Byte(0xB6), [F64] -> [F32];
    F64ConvertI32S = "f64.convert_i32_s", Byte(0xB7), [I32] -> [F64];
    F64ConvertI32U = "f64.convert_i32_u", Byte(0xB8), [I32] -> [F64];
    F64ConvertI64S = "f64.convert_i64_s", Byte(0xB9), [I64] -> [F64];
    F64ConvertI64U = "f64.convert_i64_u", Byte(0xBA), [I64] -> [F64];
    F64PromoteF32 = "f64.promote_f32", Byte(0xBB), [F32] -> [F64];
    I32ReinterpretF32 = "i32.reinterpret_f32", Byte(0xBC), [F32] -> [I32];
    I64ReinterpretF64 = "i64.reinterpret_f64", Byte(0xBD), [F64] -> [I64];
    F32ReinterpretI32 = "f32.reinterpret_i32", Byte(0xBE), [I32] -> [F32];
    F64ReinterpretI64 = "f64.reinterpret_i64", Byte(0xBF), [I64] -> [F64];

    I32Extend8S = "i32.extend8_s", Byte(0xC0), [I32] -> [I32], SignExtension;
    I32Extend16S = "i32.extend16_s", Byte(0xC1), [I32] -> [I32], SignExtension;
    I64Extend8S = "i64.extend8_s", Byte(0xC2), [I64] -> [I64], SignExtension;
    I64Extend16S = "i64.extend16_s", Byte(0xC3), [I64] -> [I64], SignExtension;
    I64Extend32S = "i64.extend32_s", Byte(0xC4), [I64] -> [I64], SignExtension;

    I32TruncSatF32S = "i32.trunc_sat_f32_s", Misc(0), [F32] -> [I32], SaturatingFloatToInt;
    I32TruncSatF32U = "i32.trunc_sat_f32_u", Misc(1), [F32] -> [I32], SaturatingFloatToInt;
    I32TruncSatF64S = "i32.trunc_sat_f64_s", Misc(2), [F64] -> [I32], SaturatingFloatToInt;
    I32TruncSatF64U = "i32.trunc_sat_f64_u", Misc(3), [F64] -> [I32], SaturatingFloatToInt;
    I64TruncSatF32S = "i64.trunc_sat_f32_s", Misc(4), [F32] -> [I64], SaturatingFloatToInt;
    I64TruncSatF32U = "i64.trunc_sat_f32_u", Misc(5), [F32] -> [I64], SaturatingFloatToInt;
    I64TruncSatF64S = "i64.trunc_sat_f64_s", Misc(6), [F64] -> [I64], SaturatingFloatToInt;
    I64TruncSatF64U = "i64.trunc_sat_f64_u", Misc(7), [F64] -> [I64], SaturatingFloatToInt;
}

macro_rules! memory_ops {
    ($name:ident, $doc:literal { $( $variant:ident = $mnemonic:literal, $opcode:literal, $ty:ident, $align:literal; )* }) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $($name::$variant => $mnemonic,)*
                }
            }

            pub fn opcode(self) -> u8 {
                match self {
                    $($name::$variant => $opcode,)*
                }
            }

            /// The value type moved to or from memory.
            pub fn ty(self) -> ValType {
                match self {
                    $($name::$variant => $ty,)*
                }
            }

            /// Log2 of the access width in bytes; the largest legal alignment.
            pub fn natural_align(self) -> u32 {
                match self {
                    $($name::$variant => $align,)*
                }
            }
        }
    };
}

memory_ops!(LoadOp, "Memory loads: `[i32] -> [t]`." {
    I32Load = "i32.load", 0x28, I32, 2;
    I64Load = "i64.load", 0x29, I64, 3;
    F32Load = "f32.load", 0x2A, F32, 2;
    F64Load = "f64.load", 0x2B, F64, 3;
    I32Load8S = "i32.load8_s", 0x2C, I32, 0;
    I32Load8U = "i32.load8_u", 0x2D, I32, 0;
    I32Load16S = "i32.load16_s", 0x2E, I32, 1;
    I32Load16U = "i32.load16_u", 0x2F, I32, 1;
    I64Load8S = "i64.load8_s", 0x30, I64, 0;
    I64Load8U = "i64.load8_u", 0x31, I64, 0;
    I64Load16S = "i64.load16_s", 0x32, I64, 1;
    I64Load16U = "i64.load16_u", 0x33, I64, 1;
    I64Load32S = "i64.load32_s", 0x34, I64, 2;
    I64Load32U = "i64.load32_u", 0x35, I64, 2;
});

memory_ops!(StoreOp, "Memory stores: `[i32 t] -> []`." {
    I32Store = "i32.store", 0x36, I32, 2;
    I64Store = "i64.store", 0x37, I64, 3;
    F32Store = "f32.store", 0x38, F32, 2;
    F64Store = "f64.store", 0x39, F64, 3;
    I32Store8 = "i32.store8", 0x3A, I32, 0;
    I32Store16 = "i32.store16", 0x3B, I32, 1;
    I64Store8 = "i64.store8", 0x3C, I64, 0;
    I64Store16 = "i64.store16", 0x3D, I64, 1;
    I64Store32 = "i64.store32", 0x3E, I64, 2;
});

/// An operator from one of the tables above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOp {
    Num(NumOp),
    Load(LoadOp),
    Store(StoreOp),
}

static BY_MNEMONIC: Lazy<HashMap<&'static str, TableOp>> = Lazy::new(|| {
    let nums = NumOp::ALL.iter().map(|&op| (op.mnemonic(), TableOp::Num(op)));
    let loads = LoadOp::ALL.iter().map(|&op| (op.mnemonic(), TableOp::Load(op)));
    let stores = StoreOp::ALL.iter().map(|&op| (op.mnemonic(), TableOp::Store(op)));
    nums.chain(loads).chain(stores).collect()
});

/// Look up a numeric, load or store mnemonic.
pub fn lookup(mnemonic: &str) -> Option<TableOp> {
    BY_MNEMONIC.get(mnemonic).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn mnemonics_are_unique() {
        let total = NumOp::ALL.len() + LoadOp::ALL.len() + StoreOp::ALL.len();
        assert_eq!(BY_MNEMONIC.len(), total);
    }

    #[test]
    fn opcodes_are_unique() {
        let mut seen = HashSet::new();
        for op in NumOp::ALL {
            assert!(seen.insert(op.opcode()), "duplicate opcode for {}", op.mnemonic());
        }
        for op in LoadOp::ALL {
            assert!(seen.insert(Byte(op.opcode())));
        }
        for op in StoreOp::ALL {
            assert!(seen.insert(Byte(op.opcode())));
        }
    }

    #[test]
    fn lookup_finds_each_family() {
        assert_eq!(lookup("i32.add"), Some(TableOp::Num(NumOp::I32Add)));
        assert_eq!(lookup("f64.load"), Some(TableOp::Load(LoadOp::F64Load)));
        assert_eq!(lookup("i64.store32"), Some(TableOp::Store(StoreOp::I64Store32)));
        assert_eq!(lookup("i32.bogus"), None);
    }

    #[test]
    fn signatures() {
        assert_eq!(NumOp::I64Eqz.params(), &[I64]);
        assert_eq!(NumOp::I64Eqz.results(), &[I32]);
        assert_eq!(NumOp::F32Copysign.params(), &[F32, F32]);
        assert_eq!(NumOp::I64TruncSatF64U.opcode(), Misc(7));
        assert_eq!(NumOp::I64TruncSatF64U.feature(), Some(Feature::SaturatingFloatToInt));
        assert_eq!(NumOp::I32Add.feature(), None);
        assert_eq!(LoadOp::I64Load32U.natural_align(), 2);
        assert_eq!(StoreOp::F64Store.ty(), F64);
    }

    #[test]
    fn opcode_byte_range_is_dense() {
        let bytes: Vec<u8> = NumOp::ALL
            .iter()
            .filter_map(|op| match op.opcode() {
                Byte(b) => Some(b),
                Misc(_) => None,
            })
            .collect();
        let expected: Vec<u8> = (0x45..=0xC4).collect();
        assert_eq!(bytes, expected);
    }
}
