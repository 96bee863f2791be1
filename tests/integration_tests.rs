use std::fs;
use std::path::PathBuf;

use intech::common::Platform;
use intech::driver::{self, Emit};
use intech::error::ErrorKind;
use intech::front::parse;
use intech::middle::lower_program;

/// Run lex -> parse -> lower -> emit over a source string, asserting
/// every stage succeeds, and return the resulting assembly text.
fn compile_to_asm(source: &str) -> String {
    let program = parse(source).expect("parse should succeed");
    let tac = lower_program(&program);
    intech::back::emit_program(&tac, Platform::Sysv).expect("assembly emission should succeed")
}

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn identity_function_threads_its_argument_through_a_call() {
    let asm = compile_to_asm(
        "fonction f(entier x): entier { retourner x; } \
         fonction main(entier a): entier { retourner f(a); }",
    );
    assert!(asm.contains("call\tf"));
    assert!(asm.contains("real_main:"));
}

#[test]
fn arithmetic_precedence_scenario() {
    // retourner 1 + 2 * 3; must lower the multiplication first.
    let program = parse("fonction main(): entier { retourner 1 + 2 * 3; }").unwrap();
    let tac = lower_program(&program).to_string();
    let mul_line = tac.lines().find(|l| l.contains('*')).expect("a multiplication instruction");
    let add_line = tac.lines().find(|l| l.contains('+')).expect("an addition instruction");
    let mul_idx = tac.lines().position(|l| l == mul_line).unwrap();
    let add_idx = tac.lines().position(|l| l == add_line).unwrap();
    assert!(mul_idx < add_idx, "2 * 3 must be computed before 1 + (2*3)");
}

#[test]
fn short_circuit_and_never_compares_the_right_operand_after_a_left_failure_path() {
    let program = parse(
        "fonction main(entier a, entier b, entier c): entier { \
           si (a < b ET b < c) retourner 1; sinon retourner 0; \
         }",
    )
    .unwrap();
    let tac = lower_program(&program);
    let instrs = &tac.functions[0].instructions;
    let compare_count = instrs
        .iter()
        .filter(|i| matches!(i, intech::middle::tac::Instruction::Compare { .. }))
        .count();
    // One compare per leaf: a<b and b<c. The left leaf's false branch must
    // jump straight past the second compare rather than falling into it.
    assert_eq!(compare_count, 2);
}

#[test]
fn short_circuit_or_skips_the_right_operand_when_the_left_is_true() {
    let program = parse(
        "fonction main(entier a, entier b): entier { \
           si (a == 0 OU b / a > 1) retourner 1; sinon retourner 0; \
         }",
    )
    .unwrap();
    let tac = lower_program(&program);
    let text = tac.to_string();
    // The division must appear guarded behind a jump, not unconditionally
    // evaluated before the `a == 0` check.
    let cmp_a = text.find("COMPARE").expect("a compare for a == 0");
    let div = text.find('/').expect("the division for b / a");
    assert!(cmp_a < div, "a == 0 must be checked before b / a is evaluated");
}

#[test]
fn factorial_loop_lowers_to_a_single_backward_jump() {
    let program = parse(
        "fonction main(entier n): entier { \
           entier acc = 1; \
           tantque (n > 0) { \
             acc = acc * n; \
             n = n - 1; \
           } \
           retourner acc; \
         }",
    )
    .unwrap();
    let tac = lower_program(&program);
    let jumps = tac.functions[0]
        .instructions
        .iter()
        .filter(|i| matches!(i, intech::middle::tac::Instruction::Jump(_)))
        .count();
    assert_eq!(jumps, 1, "a single tantque loop has exactly one unconditional back-edge");
}

#[test]
fn compile_file_rejects_a_non_intech_extension() {
    let path = write_temp("integration_bad_ext.txt", "fonction main(): entier { retourner 0; }");
    let err = driver::compile_file(&path, Emit::Asm, Platform::Sysv, true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
    let _ = fs::remove_file(&path);
}

#[test]
fn compile_file_end_to_end_writes_interm_and_assembly() {
    let path = write_temp(
        "integration_e2e.intech",
        "fonction f(entier x): entier { retourner x; } \
         fonction main(entier a): entier { retourner f(a); }",
    );
    driver::compile_file(&path, Emit::Asm, Platform::Sysv, true).unwrap();

    let interm_path = format!("{}.interm", path.display());
    let asm_path = format!("{}.S", path.display());
    let interm = fs::read_to_string(&interm_path).unwrap();
    let asm = fs::read_to_string(&asm_path).unwrap();

    assert!(interm.contains("CALL f"));
    assert!(asm.contains("call\tf"));

    let _ = fs::remove_file(&path);
    let _ = fs::remove_file(&interm_path);
    let _ = fs::remove_file(&asm_path);
}

#[test]
fn a_void_function_returning_a_value_is_a_type_error() {
    let err = parse("fonction f(): rien { retourner 1; }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}
