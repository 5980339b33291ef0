//! Core of an Ada 83 compiler that lowers one compilation unit to LLVM
//! textual IR. The library exposes `compile_unit`/`compile_file` as the
//! driver-facing entry points, independent of the `main.rs` CLI binary
//! built on top of them.

pub mod arena;
pub mod ast;
pub mod bigint;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod symbols;
pub mod types;

use std::fmt;
use std::path::Path;

pub use ast::CompilationUnit;
pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};

/// Everything a driver needs after a compile attempt, win or lose: the
/// emitted IR (empty on failure), every diagnostic gathered along the way,
/// and the exit code (`0` iff no errors were reported).
pub struct CompileOutput {
    pub ir: String,
    pub diagnostics: Diagnostics,
    pub exit_code: i32,
}

/// Small hand-rolled error enum rather than reaching for `anyhow`/`thiserror`.
#[derive(Debug)]
pub enum CompileError {
    Io(std::io::Error),
    /// `N` diagnostics were reported; the unit was not compiled to IR.
    Diagnostics(usize),
    /// Lowering reached a state `ice!` can't recover from by substituting a
    /// placeholder value.
    /// `compile_unit`/`compile_file` never construct this today — every
    /// current codegen failure mode routes through `Diagnostics` via `ice!`
    /// instead — but it's kept as the escape hatch for a future lowering
    /// stage (e.g. static-link threading) that can't simply emit a
    /// diagnostic and carry on.
    Codegen(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io(e) => write!(f, "I/O error: {}", e),
            CompileError::Diagnostics(n) => write!(f, "{} error(s) reported", n),
            CompileError::Codegen(msg) => write!(f, "code generation failed: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io(e) => Some(e),
            CompileError::Diagnostics(_) | CompileError::Codegen(_) => None,
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

/// Lex, parse, resolve, and (unless `check_only`) lower `source` to LLVM IR.
///
/// Returns `Ok` with the full diagnostic list even when errors were
/// reported — diagnostics never abort the pass — callers that want an
/// early-return on errors should check `output.exit_code`.
/// `CompileError` is reserved for conditions outside the compiler's own
/// recoverable-diagnostic model (I/O failures reading a `with`-ed unit
/// surface through `Diagnostics` instead; this entry point itself never
/// touches the filesystem beyond what `semantic::Analyzer` does internally
/// for `with` resolution).
pub fn compile_unit(file_name: &str, source: &str, config: &CompilerConfig, check_only: bool) -> CompileOutput {
    let arena = arena::Arena::new();
    let mut diags = diagnostics::Diagnostics::new();

    let tokens = lexer::Lexer::new(file_name, source.as_bytes(), &arena).tokenize(&mut diags);
    let mut parser = parser::Parser::new(tokens, &mut diags);
    let parsed = parser.parse_compilation_unit();
    drop(parser);

    let Ok(mut cu) = parsed else {
        let exit_code = if diags.has_errors() { 1 } else { 0 };
        return CompileOutput { ir: String::new(), diagnostics: diags, exit_code };
    };

    let mut analyzer = semantic::Analyzer::new(&arena, &mut diags, config.search_dirs.clone());
    analyzer.analyze_compilation_unit(&mut cu);
    let env = analyzer.into_environment();

    if check_only || diags.has_errors() {
        let exit_code = if diags.has_errors() { 1 } else { 0 };
        return CompileOutput { ir: String::new(), diagnostics: diags, exit_code };
    }

    let mut codegen = codegen::Codegen::new(&env, &mut diags);
    let ir = codegen.emit_compilation_unit(&cu);
    let exit_code = if diags.has_errors() { 1 } else { 0 };
    CompileOutput { ir, diagnostics: diags, exit_code }
}

/// Convenience wrapper reading `path` off disk first.
pub fn compile_file(path: &Path, config: &CompilerConfig, check_only: bool) -> Result<CompileOutput, CompileError> {
    let source = std::fs::read_to_string(path)?;
    let file_name = path.display().to_string();
    Ok(compile_unit(&file_name, &source, config, check_only))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_compile_reports_no_errors_and_exit_zero() {
        let output = compile_unit("t.adb", "procedure P is begin null; end P;", &CompilerConfig::new(), false);
        assert_eq!(output.exit_code, 0);
        assert!(!output.diagnostics.has_errors());
        assert!(output.ir.contains("define void @p_s"));
    }

    #[test]
    fn check_only_skips_codegen_but_still_resolves() {
        let output = compile_unit("t.adb", "procedure P is X : Integer := 1; begin null; end P;", &CompilerConfig::new(), true);
        assert_eq!(output.exit_code, 0);
        assert!(output.ir.is_empty());
    }

    #[test]
    fn unresolved_name_yields_exit_one_and_no_ir() {
        let output = compile_unit("t.adb", "procedure P is begin Undefined_Var := 1; end P;", &CompilerConfig::new(), false);
        assert_eq!(output.exit_code, 1);
        assert!(output.diagnostics.has_errors());
        assert!(output.ir.is_empty());
    }
}
