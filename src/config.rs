//! Compiler configuration for the driver: include paths, the unit-wide
//! suppressed-checks bitmask, and the codegen target layout.

use std::path::PathBuf;

use crate::types::checks;

/// Compiler-wide configuration, built up with `with_*` methods.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Directories searched for `with`-ed units, in order (`-I` on the CLI).
    pub search_dirs: Vec<PathBuf>,

    /// Default `.ll` output path when none is given on the command line.
    pub default_output: PathBuf,

    /// Checks suppressed for the whole compilation unit, independent of any
    /// per-entity `pragma Suppress`.
    pub suppressed_checks: u32,

    /// LLVM `target datalayout` string emitted in the module prologue.
    pub target_datalayout: String,

    /// LLVM `target triple` string emitted alongside the datalayout.
    pub target_triple: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            search_dirs: vec![PathBuf::from(".")],
            default_output: PathBuf::from("output.ll"),
            suppressed_checks: 0,
            target_datalayout: "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128".to_string(),
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_search_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(path.into());
        self
    }

    pub fn with_search_dirs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_dirs.extend(paths);
        self
    }

    pub fn with_default_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_output = path.into();
        self
    }

    pub fn with_suppressed_check(mut self, mask: u32) -> Self {
        self.suppressed_checks |= mask;
        self
    }

    pub fn with_all_checks_suppressed(mut self) -> Self {
        self.suppressed_checks = checks::ALL_CHECKS;
        self
    }

    pub fn with_target(mut self, triple: impl Into<String>, datalayout: impl Into<String>) -> Self {
        self.target_triple = triple.into();
        self.target_datalayout = datalayout.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_current_dir_on_search_path() {
        let config = CompilerConfig::new();
        assert_eq!(config.search_dirs, vec![PathBuf::from(".")]);
        assert_eq!(config.suppressed_checks, 0);
    }

    #[test]
    fn builder_accumulates_search_dirs_and_checks() {
        let config = CompilerConfig::new()
            .with_search_dir("/opt/ada/lib")
            .with_search_dir("/home/user/ada")
            .with_suppressed_check(checks::OVERFLOW_CHECK)
            .with_suppressed_check(checks::INDEX_CHECK);
        assert_eq!(config.search_dirs.len(), 3); // "." plus the two added
        assert_eq!(config.suppressed_checks & checks::OVERFLOW_CHECK, checks::OVERFLOW_CHECK);
        assert_eq!(config.suppressed_checks & checks::INDEX_CHECK, checks::INDEX_CHECK);
    }

    #[test]
    fn with_all_checks_suppressed_sets_full_mask() {
        let config = CompilerConfig::new().with_all_checks_suppressed();
        assert_eq!(config.suppressed_checks, checks::ALL_CHECKS);
    }
}
