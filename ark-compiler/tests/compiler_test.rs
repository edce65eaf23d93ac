// ark-compiler - End-to-end compilation tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use ark_compiler::bytecode::{HASH_LENGTH, HEADER_SIZE};
use ark_compiler::{decode, Artifact, Compiler, ErrorKind, ValueEntry};

const LOAD_SYMBOL: u8 = 0x01;
const LOAD_CONST: u8 = 0x02;
const POP_JUMP_IF_TRUE: u8 = 0x03;
const LET: u8 = 0x05;
const POP_JUMP_IF_FALSE: u8 = 0x06;
const JUMP: u8 = 0x07;
const RET: u8 = 0x08;
const HALT: u8 = 0x09;
const CALL: u8 = 0x0a;
const CAPTURE: u8 = 0x0b;
const MUT: u8 = 0x0d;
const DEL: u8 = 0x0e;
const GET_FIELD: u8 = 0x0f;
const PLUGIN: u8 = 0x10;
const LIST: u8 = 0x11;
const ADD: u8 = 0x20;

fn compile(source: &str) -> Vec<u8> {
    let mut compiler = Compiler::new(0, 0);
    compiler.feed(source, "test.ark").expect("feed error");
    compiler.compile().expect("compile error");
    compiler.bytecode().to_vec()
}

fn compile_decoded(source: &str) -> Artifact {
    decode(&compile(source)).expect("decode error")
}

fn compile_err(source: &str) -> ErrorKind {
    let mut compiler = Compiler::new(0, 0);
    compiler.feed(source, "test.ark").expect("feed error");
    compiler.compile().expect_err("expected a compile error").kind
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_empty_program() {
    let artifact = compile_decoded("");
    assert!(artifact.symbols.is_empty());
    assert!(artifact.values.is_empty());
    assert_eq!(artifact.segments, vec![vec![HALT]]);
}

#[test]
fn test_number_literal() {
    let artifact = compile_decoded("42");
    assert_eq!(artifact.values, vec![ValueEntry::Number(42.0)]);
    assert_eq!(artifact.segments, vec![vec![LOAD_CONST, 0, 0, HALT]]);

    // the constant is stored as six-digit decimal text
    let bytes = compile("42");
    let tail = &bytes[HEADER_SIZE + HASH_LENGTH..];
    assert!(tail
        .windows(10)
        .any(|w| w == b"42.000000\x00"));
}

#[test]
fn test_let_and_use() {
    let artifact = compile_decoded("(let x 3) x");
    assert_eq!(artifact.symbols, vec!["x".to_string()]);
    assert_eq!(artifact.values, vec![ValueEntry::Number(3.0)]);
    assert_eq!(
        artifact.segments,
        vec![vec![
            LOAD_CONST, 0, 0, //
            LET, 0, 0, //
            LOAD_SYMBOL, 0, 0, //
            HALT,
        ]]
    );
}

#[test]
fn test_if_layout() {
    let artifact = compile_decoded("(let c 1)(let a 2)(let b 3)(if c a b)");
    assert_eq!(
        artifact.symbols,
        vec!["c".to_string(), "a".to_string(), "b".to_string()]
    );
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, LET, 0, 0, //
            LOAD_CONST, 0, 1, LET, 0, 1, //
            LOAD_CONST, 0, 2, LET, 0, 2, //
            LOAD_SYMBOL, 0, 0, // c
            POP_JUMP_IF_TRUE, 0, 30, // to the then branch
            LOAD_SYMBOL, 0, 2, // b (else)
            JUMP, 0, 33, // to the end
            LOAD_SYMBOL, 0, 1, // a (then)
            HALT,
        ]
    );
}

#[test]
fn test_function_and_call() {
    let artifact = compile_decoded("((fun (a b) (+ a b)) 1 2)");
    assert_eq!(artifact.symbols, vec!["a".to_string(), "b".to_string()]);
    // the callee is compiled before its arguments, so its page address is
    // interned first
    assert_eq!(
        artifact.values,
        vec![
            ValueEntry::PageAddr(1),
            ValueEntry::Number(1.0),
            ValueEntry::Number(2.0),
        ]
    );
    // page 0: arguments, then the callee, then the call
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 1, //
            LOAD_CONST, 0, 2, //
            LOAD_CONST, 0, 0, // closure
            CALL, 0, 2, //
            HALT,
        ]
    );
    // page 1: bind parameters, fold the body, return
    assert_eq!(
        artifact.segments[1],
        vec![
            MUT, 0, 0, //
            MUT, 0, 1, //
            LOAD_SYMBOL, 0, 0, //
            LOAD_SYMBOL, 0, 1, //
            ADD, //
            RET, //
            HALT,
        ]
    );
}

#[test]
fn test_chained_operator_left_fold() {
    let artifact = compile_decoded("(+ 1 2 3)");
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, //
            LOAD_CONST, 0, 1, //
            ADD, //
            LOAD_CONST, 0, 2, //
            ADD, //
            HALT,
        ]
    );
}

// ============================================================================
// Special forms
// ============================================================================

#[test]
fn test_while_layout() {
    let artifact = compile_decoded("(let go 1)(while go 0)");
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, LET, 0, 0, //
            LOAD_SYMBOL, 0, 0, // condition, loop start = 6
            POP_JUMP_IF_FALSE, 0, 18, // exit
            LOAD_CONST, 0, 1, // body
            JUMP, 0, 6, // back to the condition
            HALT,
        ]
    );
}

#[test]
fn test_begin_compiles_in_order() {
    let artifact = compile_decoded("(begin 1 2)");
    assert_eq!(
        artifact.segments[0],
        vec![LOAD_CONST, 0, 0, LOAD_CONST, 0, 1, HALT]
    );
}

#[test]
fn test_empty_list_is_nil_builtin() {
    let artifact = compile_decoded("()");
    // BUILTIN id of "nil"
    assert_eq!(artifact.segments[0], vec![0x0c, 0, 2, HALT]);
}

#[test]
fn test_builtin_and_operator_uses() {
    // `print` is a builtin, `not` is an operator: neither reaches the
    // symbol table.
    let artifact = compile_decoded("(print (not true))");
    assert!(artifact.symbols.is_empty());
}

#[test]
fn test_set_emits_store() {
    let artifact = compile_decoded("(let x 1)(set x 2)");
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, LET, 0, 0, //
            LOAD_CONST, 0, 1, 0x04, 0, 0, // STORE x
            HALT,
        ]
    );
}

#[test]
fn test_mut_emits_mut() {
    let artifact = compile_decoded("(mut x 1)");
    assert_eq!(
        artifact.segments[0],
        vec![LOAD_CONST, 0, 0, MUT, 0, 0, HALT]
    );
}

#[test]
fn test_del() {
    let artifact = compile_decoded("(let x 1)(del x)");
    assert_eq!(
        artifact.segments[0],
        vec![LOAD_CONST, 0, 0, LET, 0, 0, DEL, 0, 0, HALT]
    );
}

#[test]
fn test_del_keeps_name_defined() {
    // Deleting does not retract the compile-time binding: a later use
    // still passes the undefined-symbol check (the VM errors at runtime).
    compile("(let x 1)(del x) x");
}

#[test]
fn test_quote_allocates_a_page() {
    let artifact = compile_decoded("(quote 1)");
    assert_eq!(
        artifact.values,
        vec![ValueEntry::Number(1.0), ValueEntry::PageAddr(1)]
    );
    assert_eq!(artifact.segments[0], vec![LOAD_CONST, 0, 1, HALT]);
    assert_eq!(artifact.segments[1], vec![LOAD_CONST, 0, 0, RET, HALT]);
}

#[test]
fn test_import_records_plugin() {
    let artifact = compile_decoded("(import \"plugins/http.ark\")");
    assert_eq!(
        artifact.values,
        vec![ValueEntry::Str("plugins/http.ark".into())]
    );
    assert_eq!(artifact.segments[0], vec![PLUGIN, 0, 0, HALT]);
}

#[test]
fn test_plugin_prefixed_symbols_are_allowed() {
    let artifact = compile_decoded("(import \"plugins/http.ark\") (http:get \"url\")");
    assert!(artifact.symbols.contains(&"http:get".to_string()));
}

#[test]
fn test_capture_emits_into_enclosing_page() {
    let artifact = compile_decoded("(let x 1)(let f (fun (&x) x))");
    // page 0: LET x, then CAPTURE x before the closure constant, LET f
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, LET, 0, 0, //
            CAPTURE, 0, 0, //
            LOAD_CONST, 0, 1, // PageAddr(1)
            LET, 0, 1, // f
            HALT,
        ]
    );
    // the capture is not re-bound inside the body
    assert_eq!(artifact.segments[1], vec![LOAD_SYMBOL, 0, 0, RET, HALT]);
}

// ============================================================================
// Specific list forms
// ============================================================================

#[test]
fn test_list_of_zero_is_allowed() {
    let artifact = compile_decoded("(list)");
    assert_eq!(artifact.segments[0], vec![LIST, 0, 0, HALT]);
}

#[test]
fn test_list_arguments_compile_in_reverse() {
    let artifact = compile_decoded("(let a 1)(let b 2)(list a b)");
    assert_eq!(
        artifact.segments[0],
        vec![
            LOAD_CONST, 0, 0, LET, 0, 0, //
            LOAD_CONST, 0, 1, LET, 0, 1, //
            LOAD_SYMBOL, 0, 1, // b first
            LOAD_SYMBOL, 0, 0, // then a
            LIST, 0, 2, //
            HALT,
        ]
    );
}

#[test]
fn test_list_keeps_field_access_with_its_value() {
    let artifact = compile_decoded("(let a 1)(let x 2)(let b 3)(list a.x b)");
    // groups reversed: b, then a with its field
    assert_eq!(
        artifact.segments[0][18..],
        [
            LOAD_SYMBOL, 0, 2, // b
            LOAD_SYMBOL, 0, 0, // a
            GET_FIELD, 0, 1, // .x
            LIST, 0, 2, // field access is not an argument
            HALT,
        ]
    );
}

#[test]
fn test_append_immediate_is_argc_minus_one() {
    let artifact = compile_decoded("(let l 1)(append l 2 3)");
    assert_eq!(
        artifact.segments[0][6..],
        [
            LOAD_CONST, 0, 2, // 3
            LOAD_CONST, 0, 1, // 2
            LOAD_SYMBOL, 0, 0, // l
            0x12, 0, 2, // APPEND argc-1
            HALT,
        ]
    );
}

#[test]
fn test_pop_takes_no_immediate() {
    let artifact = compile_decoded("(let l 1)(pop l 0)");
    assert_eq!(
        artifact.segments[0][6..],
        [
            LOAD_CONST, 0, 1, // index
            LOAD_SYMBOL, 0, 0, // l
            0x16, // POP
            HALT,
        ]
    );
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_field_access_attaches_to_callee() {
    let artifact = compile_decoded("(let obj 1)(let m 2)(obj.m 7)");
    assert_eq!(
        artifact.segments[0][12..],
        [
            LOAD_CONST, 0, 2, // the argument comes first
            LOAD_SYMBOL, 0, 0, // obj
            GET_FIELD, 0, 1, // .m
            CALL, 0, 1, // the field accessor is not an argument
            HALT,
        ]
    );
}

#[test]
fn test_nested_calls_reenter_temp_pages() {
    let artifact = compile_decoded("(let f 1)(let g 2)(f (g 3))");
    assert_eq!(
        artifact.segments[0][12..],
        [
            LOAD_CONST, 0, 2, // 3
            LOAD_SYMBOL, 0, 1, // g
            CALL, 0, 1, //
            LOAD_SYMBOL, 0, 0, // f
            CALL, 0, 1, //
            HALT,
        ]
    );
}

#[test]
fn test_unary_operator_call() {
    let artifact = compile_decoded("(not true)");
    // operand, then the operator once
    assert_eq!(artifact.segments[0], vec![0x0c, 0, 1, 0x38, HALT]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_append_arity_too_low() {
    assert!(matches!(
        compile_err("(append x)"),
        ErrorKind::ArityTooLow { form } if form == "append"
    ));
}

#[test]
fn test_pop_arity() {
    assert!(matches!(
        compile_err("(pop)"),
        ErrorKind::ArityTooLow { form } if form == "pop"
    ));
    assert!(matches!(
        compile_err("(pop x)"),
        ErrorKind::ArityTooLow { form } if form == "pop"
    ));
}

#[test]
fn test_chained_comparison_is_rejected() {
    let source = "(let a 1)(let b 2)(let c 3)(let d 4)(< a b c d)";
    assert!(matches!(
        compile_err(source),
        ErrorKind::BadChainedOperator { operator, length: 4 } if operator == "<"
    ));
    // the chainable set is fine at any length
    compile("(let a 1)(let b 2)(let c 3)(let d 4)(+ a b c d)");
}

#[test]
fn test_unbound_capture() {
    assert!(matches!(
        compile_err("(fun (&x) x)"),
        ErrorKind::UnboundCapture { name } if name == "x"
    ));
}

#[test]
fn test_undefined_symbol() {
    assert!(matches!(
        compile_err("(f 1)"),
        ErrorKind::UndefinedSymbol { name } if name == "f"
    ));
}

#[test]
fn test_undefined_symbol_reports_context() {
    let mut compiler = Compiler::new(0, 0);
    compiler.feed("(let a 1)\n(f a)", "test.ark").unwrap();
    let err = compiler.compile().expect_err("expected an error");
    let ctx = err.context.expect("error should carry context");
    assert_eq!(ctx.filename, "test.ark");
    assert_eq!((ctx.line, ctx.column), (2, 2));
    assert_eq!(ctx.source_line.as_deref(), Some("(f a)"));
}

#[test]
fn test_parse_error_surfaces_through_feed() {
    let mut compiler = Compiler::new(0, 0);
    let err = compiler
        .feed("(let x", "test.ark")
        .expect_err("expected a parse error");
    assert!(matches!(err.kind, ErrorKind::Parse { .. }));
}

#[test]
fn test_compile_before_feed() {
    let mut compiler = Compiler::new(0, 0);
    assert!(matches!(
        compiler.compile().expect_err("expected an error").kind,
        ErrorKind::Internal { .. }
    ));
}

#[test]
fn test_capture_outside_params_is_rejected() {
    assert!(matches!(
        compile_err("(let x 1)(print &x)"),
        ErrorKind::Syntax { .. }
    ));
}
