//! End-to-end translation: WAT in, validated Wasm (or a diagnostic) out.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{assert_valid, counts, translate_valid, SectionCounts};
    use rstest::rstest;
    use watc::parser::MAX_BLOCK_DEPTH;
    use watc::wat::sexpr::MAX_NESTING;
    use watc::wat::LexErrorKind;
    use watc::{translate, translate_str, translate_with, Config, ErrorKind, Features, SyntaxErrorKind};

    fn error_of(source: &str) -> watc::Diagnostic {
        translate_str(source).expect_err("translation should fail")
    }

    fn with_features(features: Features) -> Config {
        Config {
            features,
            ..Config::default()
        }
    }

    // =======================================================================
    // Basic properties
    // =======================================================================

    #[test]
    fn empty_module_is_eight_bytes() {
        assert_eq!(translate(b"(module)").unwrap(), vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(translate(b"(module $named)").unwrap().len(), 8);
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t")]
    #[case(";; only a comment\n(; and a block comment ;)")]
    fn missing_module(#[case] source: &str) {
        let err = error_of(source);
        assert!(matches!(err.kind, ErrorKind::Syntax(_)), "{err}");
        assert_eq!(err.message, "missing module form");
    }

    #[test]
    fn translation_is_deterministic() {
        let source = r#"(module
            (type $t (func (param i32) (result i32)))
            (import "env" "log" (func $log (param i32)))
            (memory (export "mem") 1)
            (global $count (mut i32) (i32.const 0))
            (func $inc (type $t) (local.get 0) (i32.const 1) (i32.add))
            (func (export "run") (call $log (call $inc (global.get $count)))))"#;
        let first = translate_str(source).unwrap();
        let second = translate_str(source).unwrap();
        assert_eq!(first, second);
        assert_valid(&first);
    }

    #[test]
    fn forward_call_resolves() {
        let wasm = translate_valid("(module (func $a (call $b)) (func $b))");
        assert_eq!(counts(&wasm).functions, 2);
    }

    #[test]
    fn undefined_function_is_unresolved() {
        let err = error_of("(module (func call $nowhere))");
        assert_eq!(err.kind, ErrorKind::UnresolvedSymbol);
        assert!(err.message.contains("$nowhere"), "{}", err.message);
    }

    #[test]
    fn duplicate_function_name() {
        let err = error_of("(module (func $f) (func $f))");
        assert_eq!(err.kind, ErrorKind::DuplicateSymbol);
    }

    #[test]
    fn result_type_mismatch() {
        let err = error_of("(module (func (result i32) f64.const 1.0))");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert!(err.message.contains("i32") && err.message.contains("f64"), "{}", err.message);
    }

    // =======================================================================
    // Realistic modules, checked by an independent validator
    // =======================================================================

    #[test]
    fn factorial_recursive_and_iterative() {
        let wasm = translate_valid(
            r#"(module
                (func $fac (export "fac") (param $n i64) (result i64)
                  (if (result i64) (i64.eqz (local.get $n))
                    (then (i64.const 1))
                    (else (i64.mul (local.get $n) (call $fac (i64.sub (local.get $n) (i64.const 1)))))))
                (func (export "fac_iter") (param $n i64) (result i64)
                  (local $acc i64)
                  i64.const 1
                  local.set $acc
                  block $done
                    loop $again
                      local.get $n
                      i64.eqz
                      br_if $done
                      local.get $acc
                      local.get $n
                      i64.mul
                      local.set $acc
                      local.get $n
                      i64.const 1
                      i64.sub
                      local.set $n
                      br $again
                    end
                  end
                  local.get $acc))"#,
        );
        let counts = counts(&wasm);
        assert_eq!(counts.types, 1);
        assert_eq!(counts.functions, 2);
        assert_eq!(counts.exports, 2);
        assert_eq!(counts.code, 2);
    }

    #[test]
    fn imports_and_exports_of_every_kind() {
        let wasm = translate_valid(
            r#"(module
                (import "env" "f" (func $f (param i32) (result i32)))
                (import "env" "t" (table 1 funcref))
                (import "env" "m" (memory 1 2))
                (import "env" "g" (global $g i32))
                (global $h (mut i64) (i64.const -1))
                (func $main (export "main") (result i32) (call $f (global.get $g)))
                (export "table" (table 0))
                (export "memory" (memory 0))
                (export "h" (global $h)))"#,
        );
        assert_eq!(
            counts(&wasm),
            SectionCounts {
                types: 2,
                imports: 4,
                functions: 1,
                globals: 1,
                exports: 4,
                code: 1,
                ..SectionCounts::default()
            }
        );
    }

    #[test]
    fn inline_import_and_export_abbreviations() {
        let wasm = translate_valid(
            r#"(module
                (func $log (import "console" "log") (param i32))
                (global (export "g") (import "env" "g") i32)
                (memory (export "mem") (data "hello"))
                (table (export "tbl") funcref (elem $a $b))
                (func $a (export "a") (export "alias") (call $log (i32.const 1)))
                (func $b))"#,
        );
        let counts = counts(&wasm);
        assert_eq!(counts.imports, 2);
        assert_eq!(counts.exports, 5);
        assert_eq!(counts.memories, 1);
        assert_eq!(counts.tables, 1);
        assert_eq!(counts.elements, 1);
        assert_eq!(counts.data, 1);
    }

    #[test]
    fn call_indirect_through_a_table() {
        let wasm = translate_valid(
            r#"(module
                (type $binop (func (param i32 i32) (result i32)))
                (table 2 funcref)
                (elem (i32.const 0) $add $sub)
                (func $add (type $binop) (i32.add (local.get 0) (local.get 1)))
                (func $sub (type $binop) (i32.sub (local.get 0) (local.get 1)))
                (func (export "apply") (param i32 i32 i32) (result i32)
                  (call_indirect (type $binop) (local.get 1) (local.get 2) (local.get 0))))"#,
        );
        let counts = counts(&wasm);
        assert_eq!(counts.types, 2);
        assert_eq!(counts.elements, 1);
    }

    #[test]
    fn memory_access_and_start() {
        let wasm = translate_valid(
            r#"(module
                (memory 1)
                (data (i32.const 0) "\01\02\03\04")
                (global $sum (mut i32) (i32.const 0))
                (func $init
                  (global.set $sum
                    (i32.add (i32.load8_u (i32.const 0)) (i32.load16_u offset=2 align=1 (i32.const 0))))
                  (i64.store (i32.const 8) (i64.extend_i32_u (global.get $sum)))
                  (drop (memory.grow (i32.const 1)))
                  (drop (memory.size)))
                (start $init))"#,
        );
        let counts = counts(&wasm);
        assert_eq!(counts.start, Some(0));
        assert_eq!(counts.data, 1);
        assert_eq!(counts.data_count, None);
    }

    #[test]
    fn bulk_memory_emits_data_count() {
        let wasm = translate_valid(
            r#"(module
                (memory 1)
                (data $seg "payload")
                (func (export "init")
                  (memory.init $seg (i32.const 0) (i32.const 0) (i32.const 7))
                  (data.drop $seg)
                  (memory.copy (i32.const 16) (i32.const 0) (i32.const 7))
                  (memory.fill (i32.const 32) (i32.const 0) (i32.const 4))))"#,
        );
        assert_eq!(counts(&wasm).data_count, Some(1));
    }

    #[test]
    fn reference_types() {
        let wasm = translate_valid(
            r#"(module
                (table $funcs 4 funcref)
                (table $hosts 4 externref)
                (elem $passive funcref (ref.func $f) (ref.null func))
                (elem declare func $g)
                (func $f)
                (func $g)
                (func (export "run") (param $x externref) (result i32)
                  (table.set $hosts (i32.const 0) (local.get $x))
                  (table.init $funcs $passive (i32.const 0) (i32.const 0) (i32.const 2))
                  (elem.drop $passive)
                  (drop (table.grow $funcs (ref.func $g) (i32.const 1)))
                  (table.fill $hosts (i32.const 1) (ref.null extern) (i32.const 2))
                  (table.copy $funcs $funcs (i32.const 0) (i32.const 1) (i32.const 1))
                  (drop (select (result externref) (local.get $x) (ref.null extern) (i32.const 1)))
                  (i32.add (table.size $funcs) (ref.is_null (table.get $hosts (i32.const 0))))))"#,
        );
        let counts = counts(&wasm);
        assert_eq!(counts.tables, 2);
        assert_eq!(counts.elements, 2);
    }

    #[test]
    fn multi_value_blocks_and_functions() {
        let wasm = translate_valid(
            r#"(module
                (func $swap (param i32 i32) (result i32 i32) (local.get 1) (local.get 0))
                (func (export "f") (result i32)
                  (i32.const 1) (i32.const 2)
                  (block (param i32 i32) (result i32) (call $swap) (i32.sub))))"#,
        );
        assert_eq!(counts(&wasm).types, 3);
    }

    #[test]
    fn br_table_dispatch() {
        translate_valid(
            r#"(module
                (func (export "classify") (param i32) (result i32)
                  (block $default
                    (block $one
                      (block $zero
                        (br_table $zero $one $default (local.get 0)))
                      (return (i32.const 100)))
                    (return (i32.const 101)))
                  (i32.const -1)))"#,
        );
    }

    #[test]
    fn numeric_literals() {
        translate_valid(
            r#"(module
                (func (result i32) (i32.const 0xFFFF_FFFF))
                (func (result i32) (i32.const -2147483648))
                (func (result i64) (i64.const 0x7fff_ffff_ffff_ffff))
                (func (result f32) (f32.const -0x1.8p3))
                (func (result f64) (f64.const inf))
                (func (result f64) (f64.const -nan:0x8000000000000))
                (func (result f32) (f32.const 1e10))
                (func (result i32) (i32.trunc_sat_f64_u (f64.const 3.5)))
                (func (result i32) (i32.extend8_s (i32.const 255))))"#,
        );
    }

    #[test]
    fn debug_names_section() {
        let config = Config {
            debug_names: true,
            ..Config::default()
        };
        let source = "(module $demo (func $main (param $x i32) (local $y i64)))";
        let wasm = translate_with(source.as_bytes(), &config).unwrap();
        assert_valid(&wasm);
        assert_eq!(counts(&wasm).custom, vec!["name".to_string()]);

        let plain = translate_str(source).unwrap();
        assert!(counts(&plain).custom.is_empty());
    }

    // =======================================================================
    // Diagnostics
    // =======================================================================

    #[rstest]
    #[case("(module", ErrorKind::Syntax(SyntaxErrorKind::UnbalancedParens))]
    #[case("(module))", ErrorKind::Syntax(SyntaxErrorKind::UnbalancedParens))]
    #[case("(module (fnuc))", ErrorKind::Syntax(SyntaxErrorKind::UnknownKeyword))]
    #[case("(module (func i32.frobnicate))", ErrorKind::Syntax(SyntaxErrorKind::UnknownKeyword))]
    #[case("(module (func (param v128)))", ErrorKind::Syntax(SyntaxErrorKind::UnknownKeyword))]
    #[case("(module (func (result i32) (i32.const 4294967296)))", ErrorKind::Syntax(SyntaxErrorKind::MalformedLiteral))]
    #[case("(module (func \"unterminated))", ErrorKind::Lex(LexErrorKind::UnterminatedString))]
    #[case("(module (func (local.get $x)))", ErrorKind::UnresolvedSymbol)]
    #[case("(module (func (br $nowhere)))", ErrorKind::InvalidLabel)]
    #[case("(module (func (br 1)))", ErrorKind::InvalidLabel)]
    #[case("(module (global $g i32 (i32.const 0)) (global $g i32 (i32.const 1)))", ErrorKind::DuplicateSymbol)]
    #[case("(module (func (result i32) (i32.add (i32.const 1) (f32.const 2))))", ErrorKind::TypeMismatch)]
    #[case("(module (func (drop (i32.load (i32.const 0)))))", ErrorKind::IndexOutOfRange)]
    #[case("(module (memory 1) (memory 1))", ErrorKind::IndexOutOfRange)]
    #[case("(module (func (call 5)))", ErrorKind::IndexOutOfRange)]
    fn diagnostics(#[case] source: &str, #[case] kind: ErrorKind) {
        let err = error_of(source);
        assert_eq!(err.kind, kind, "{source}: {err}");
        assert!(err.span.is_some(), "{source}: {err} has no span");
    }

    #[test]
    fn diagnostic_display_has_position() {
        let err = error_of("(module\n  (func call $missing))");
        assert_eq!(err.to_string(), "2:14: unresolved symbol: unknown function $missing");
    }

    // =======================================================================
    // Feature switches
    // =======================================================================

    #[rstest]
    #[case(Features { sign_extension: false, ..Features::all() }, "(module (func (result i32) (i32.extend8_s (i32.const 1))))")]
    #[case(Features { saturating_float_to_int: false, ..Features::all() }, "(module (func (result i32) (i32.trunc_sat_f32_s (f32.const 1))))")]
    #[case(Features { bulk_memory: false, ..Features::all() }, "(module (memory 1) (func (memory.fill (i32.const 0) (i32.const 0) (i32.const 0))))")]
    #[case(Features { bulk_memory: false, ..Features::all() }, "(module (memory 1) (data \"passive\"))")]
    #[case(Features { reference_types: false, ..Features::all() }, "(module (func (param externref)))")]
    fn disabled_features_are_syntax_errors(#[case] features: Features, #[case] source: &str) {
        translate_str(source).unwrap_or_else(|e| panic!("{source} should translate by default: {e}"));
        let err = translate_with(source.as_bytes(), &with_features(features)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)), "{source}: {err}");
    }

    #[test]
    fn mvp_config_still_translates_mvp_modules() {
        let source = r#"(module (memory 1) (func (export "f") (param i32) (result i32)
                          (i32.mul (local.get 0) (i32.load (i32.const 0)))))"#;
        let wasm = translate_with(source.as_bytes(), &with_features(Features::mvp())).unwrap();
        assert_valid(&wasm);
        assert_eq!(wasm, translate_str(source).unwrap());
    }

    #[test]
    fn multi_value_off_is_type_mismatch() {
        let config = with_features(Features {
            multi_value: false,
            ..Features::all()
        });
        let err = translate_with(b"(module (func (result i32 i32) (i32.const 1) (i32.const 2)))", &config).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    // =======================================================================
    // Nesting limits
    // =======================================================================

    fn nesting_error(source: &str) -> watc::Diagnostic {
        let err = translate_str(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax(SyntaxErrorKind::NestingTooDeep), "{err}");
        err
    }

    #[test]
    fn deeply_nested_lists_are_a_syntax_error() {
        let depth = 100_000;
        let source = format!("(module {}{})", "(".repeat(depth), ")".repeat(depth));
        let err = nesting_error(&source);
        assert_eq!(err.message, format!("lists nested more than {MAX_NESTING} deep"));
    }

    #[test]
    fn deeply_nested_folded_blocks_are_a_syntax_error() {
        let depth = 5000;
        let source = format!("(module (func {}{}))", "(block ".repeat(depth), ")".repeat(depth));
        nesting_error(&source);
    }

    #[test]
    fn deeply_nested_flat_blocks_are_a_syntax_error() {
        let depth = 100_000;
        let source = format!("(module (func {}{}))", "block ".repeat(depth), "end ".repeat(depth));
        let err = nesting_error(&source);
        assert_eq!(err.message, format!("blocks nested more than {MAX_BLOCK_DEPTH} deep"));
        // The first block past the limit.
        assert_eq!(err.span.map(|s| s.start), Some(14 + 6 * MAX_BLOCK_DEPTH));
    }

    #[test]
    fn nesting_up_to_the_limits_translates() {
        let depth = MAX_NESTING - 10;
        let folded = format!("(module (func {}{}))", "(block ".repeat(depth), ")".repeat(depth));
        assert!(translate_str(&folded).is_ok());

        let flat = format!(
            "(module (func {}{}))",
            "block ".repeat(MAX_BLOCK_DEPTH),
            "end ".repeat(MAX_BLOCK_DEPTH)
        );
        assert!(translate_str(&flat).is_ok());
    }

    #[test]
    fn folded_and_flat_blocks_share_the_depth_limit() {
        let half = MAX_BLOCK_DEPTH / 2;
        let source = format!(
            "(module (func {}{}{}{}))",
            "(block ".repeat(half),
            "block ".repeat(half + 1),
            "end ".repeat(half + 1),
            ")".repeat(half)
        );
        nesting_error(&source);
    }
}
