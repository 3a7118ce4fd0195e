//! Value, reference, and definition types.

use std::fmt;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    FuncRef,
    ExternRef,
}

impl ValType {
    pub fn from_keyword(keyword: &str) -> Option<ValType> {
        match keyword {
            "i32" => Some(ValType::I32),
            "i64" => Some(ValType::I64),
            "f32" => Some(ValType::F32),
            "f64" => Some(ValType::F64),
            "funcref" => Some(ValType::FuncRef),
            "externref" => Some(ValType::ExternRef),
            _ => None,
        }
    }

    /// The binary encoding of this type.
    pub fn byte(self) -> u8 {
        match self {
            ValType::I32 => 0x7f,
            ValType::I64 => 0x7e,
            ValType::F32 => 0x7d,
            ValType::F64 => 0x7c,
            ValType::FuncRef => 0x70,
            ValType::ExternRef => 0x6f,
        }
    }

    pub fn is_ref(self) -> bool {
        matches!(self, ValType::FuncRef | ValType::ExternRef)
    }

    pub fn is_num(self) -> bool {
        !self.is_ref()
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        })
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum RefType {
    Func,
    Extern,
}

impl RefType {
    /// `funcref` / `externref`.
    pub fn from_keyword(keyword: &str) -> Option<RefType> {
        match keyword {
            "funcref" => Some(RefType::Func),
            "externref" => Some(RefType::Extern),
            _ => None,
        }
    }

    /// The heap type in `ref.null func` / `ref.null extern`.
    pub fn from_heap_keyword(keyword: &str) -> Option<RefType> {
        match keyword {
            "func" => Some(RefType::Func),
            "extern" => Some(RefType::Extern),
            _ => None,
        }
    }

    pub fn val_type(self) -> ValType {
        match self {
            RefType::Func => ValType::FuncRef,
            RefType::Extern => ValType::ExternRef,
        }
    }

    pub fn byte(self) -> u8 {
        self.val_type().byte()
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.val_type())
    }
}

/// Size bounds for a memory (in 64KiB pages) or table (in elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub limits: Limits,
    pub elem: RefType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValType,
    pub mutable: bool,
}

impl fmt::Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutable {
            write!(f, "(mut {})", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

/// A resolved function signature: parameter and result types only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TypeSignature {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl TypeSignature {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] -> [{}]", join(&self.params), join(&self.results))
    }
}

/// `i32 f64` style list, `""` when empty.
pub fn join(types: &[ValType]) -> String {
    types.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_bytes() {
        for (kw, byte) in [
            ("i32", 0x7f),
            ("i64", 0x7e),
            ("f32", 0x7d),
            ("f64", 0x7c),
            ("funcref", 0x70),
            ("externref", 0x6f),
        ] {
            let ty = ValType::from_keyword(kw).unwrap();
            assert_eq!(ty.byte(), byte);
            assert_eq!(ty.to_string(), kw);
        }
        assert_eq!(ValType::from_keyword("v128"), None);
        assert_eq!(RefType::from_heap_keyword("func").map(RefType::byte), Some(0x70));
    }

    #[test]
    fn signature_display() {
        let sig = TypeSignature::new(vec![ValType::I32, ValType::F64], vec![]);
        assert_eq!(sig.to_string(), "[i32 f64] -> []");
        let global = GlobalType {
            ty: ValType::I64,
            mutable: true,
        };
        assert_eq!(global.to_string(), "(mut i64)");
    }
}
