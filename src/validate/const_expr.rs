//! Constant expressions: global initialisers, segment offsets and element
//! items.

use super::context::{num, Context};
use crate::ast::{types, Instr, InstrKind, ValType};
use crate::error::Diagnostic;
use crate::wat::Span;

/// Check that `expr` is constant and produces exactly one `expected`.
pub(super) fn check(ctx: &Context, expr: &[Instr], expected: ValType, what: &str, span: Span) -> Result<(), Diagnostic> {
    let mut stack = Vec::new();
    for instr in expr {
        let ty = match &instr.kind {
            InstrKind::I32Const(_) => ValType::I32,
            InstrKind::I64Const(_) => ValType::I64,
            InstrKind::F32Const(_) => ValType::F32,
            InstrKind::F64Const(_) => ValType::F64,
            InstrKind::RefNull(ty) => ty.val_type(),
            InstrKind::RefFunc(func) => {
                ctx.func_type(func)?;
                ValType::FuncRef
            }
            InstrKind::GlobalGet(index) => {
                let global = ctx.global(index)?;
                if num(index)? as usize >= ctx.imported_globals || global.mutable {
                    return Err(Diagnostic::type_mismatch(
                        format!("{what}: constant expressions may only read imported immutable globals, not global {index}"),
                        instr.span,
                    ));
                }
                global.ty
            }
            other => {
                return Err(Diagnostic::type_mismatch(
                    format!("{what}: '{}' is not allowed in a constant expression", other.name()),
                    instr.span,
                ))
            }
        };
        stack.push(ty);
    }

    if stack != [expected] {
        return Err(Diagnostic::type_mismatch(
            format!("{what} must produce [{expected}], found [{}]", types::join(&stack)),
            span,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::validate;
    use crate::config::Config;
    use crate::error::{Diagnostic, ErrorKind};
    use crate::parser::parse;
    use crate::resolve::resolve;
    use rstest::rstest;

    fn check(source: &str) -> Result<(), Diagnostic> {
        let config = Config::default();
        validate(&resolve(&parse(source, &config)?)?, &config).map(|_| ())
    }

    #[rstest]
    #[case("(global i32 (i32.const 1))")]
    #[case("(global f64 (f64.const 1.5))")]
    #[case("(global externref (ref.null extern))")]
    #[case("(import \"e\" \"g\" (global i64)) (global i64 (global.get 0))")]
    #[case("(func $f) (global funcref (ref.func $f))")]
    #[case("(memory 1) (data (i32.const 16) \"x\")")]
    fn accepted(#[case] fields: &str) {
        check(&format!("(module {fields})")).unwrap();
    }

    #[rstest]
    #[case("(global i32 (i64.const 1))")]
    #[case("(global i32)")]
    #[case("(global i32 (i32.const 1) (i32.const 2))")]
    #[case("(global i32 (i32.add (i32.const 1) (i32.const 2)))")]
    #[case("(global i32 (i32.const 0)) (global i32 (global.get 0))")]
    #[case("(import \"e\" \"g\" (global (mut i32))) (global i32 (global.get 0))")]
    #[case("(memory 1) (data (i64.const 0) \"x\")")]
    #[case("(table 1 funcref) (elem (i32.const 0) externref (ref.null extern))")]
    fn rejected(#[case] fields: &str) {
        let err = check(&format!("(module {fields})")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch, "{err}");
    }
}
