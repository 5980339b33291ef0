//! End-to-end compile scenarios, driving the library's public entry points
//! rather than internals.

use std::fs;

use ada83c::{compile_file, compile_unit, CompilerConfig};

#[test]
fn s1_constant_expression_compiles_clean() {
    let src = "procedure P is X : Integer := 2 + 3 * 4; begin null; end P;";
    let out = compile_unit("s1.adb", src, &CompilerConfig::new(), false);
    assert_eq!(out.exit_code, 0, "{:?}", out.diagnostics.entries());
    assert!(out.ir.contains("define void @p_s"));
    assert!(out.ir.contains("mul i64") || out.ir.contains("14"));
}

#[test]
fn check_only_resolves_without_emitting_ir() {
    let src = "procedure Q is X : Integer; begin X := 1; end Q;";
    let out = compile_unit("q.adb", src, &CompilerConfig::new(), true);
    assert_eq!(out.exit_code, 0);
    assert!(out.ir.is_empty());
}

#[test]
fn undeclared_identifier_is_an_error_with_nonzero_exit() {
    let src = "procedure R is begin Nope := 1; end R;";
    let out = compile_unit("r.adb", src, &CompilerConfig::new(), false);
    assert_eq!(out.exit_code, 1);
    assert!(out.diagnostics.has_errors());
    assert!(out.ir.is_empty());
}

#[test]
fn overflow_check_is_suppressed_when_configured() {
    let src = "procedure S is X : Integer := 1 + 2; begin null; end S;";
    let config = CompilerConfig::new().with_all_checks_suppressed();
    let out = compile_unit("s.adb", src, &config, false);
    assert_eq!(out.exit_code, 0);
    assert!(!out.ir.contains("llvm.sadd.with.overflow"));
}

#[test]
fn division_emits_a_zero_check_branch() {
    let src = "procedure T is X : Integer := 10 / 2; begin null; end T;";
    let out = compile_unit("t.adb", src, &CompilerConfig::new(), false);
    assert_eq!(out.exit_code, 0);
    assert!(out.ir.contains("icmp eq i64"));
}

#[test]
fn compile_file_reads_source_from_disk_and_reports_the_same_as_compile_unit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("u.adb");
    fs::write(&path, "procedure U is begin null; end U;").expect("write source");

    let out = compile_file(&path, &CompilerConfig::new(), false).expect("compile_file");
    assert_eq!(out.exit_code, 0);
    assert!(out.ir.contains("define void @u_s"));
}

#[test]
fn compile_file_surfaces_missing_files_as_io_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.adb");

    let err = compile_file(&missing, &CompilerConfig::new(), false).unwrap_err();
    assert!(matches!(err, ada83c::CompileError::Io(_)) || err.to_string().contains("I/O error"));
}

#[test]
fn if_statement_lowers_to_branch_and_merge_labels() {
    let src = "procedure V is X : Integer := 1; begin if X = 1 then X := 2; else X := 3; end if; end V;";
    let out = compile_unit("v.adb", src, &CompilerConfig::new(), false);
    assert_eq!(out.exit_code, 0, "{:?}", out.diagnostics.entries());
    assert!(out.ir.contains("br i1"));
}
