//! Accumulating diagnostics reporter with source locations.
//!
//! `Error_Count` lives on a per-unit `Diagnostics` value threaded through
//! every pass rather than a process global, which is what lets
//! `compile_unit` (see `lib.rs`) be called repeatedly, or in parallel for
//! multiple units, without cross-talk.

use std::fmt;

/// `(filename, line, column)`, attached to every token and AST node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location { file: file.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Reported, traversal continues.
    Error,
    /// Same as `Error` for exit-code purposes but used for lint-style
    /// informational pragmas (`Pure`, `Preelaborate`, …) that are accepted
    /// without affecting correctness.
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Location,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", self.location, kind, self.message)
    }
}

/// Per-compilation-unit diagnostics accumulator.
///
/// `report_error` never aborts; `fatal_error` is reserved for conditions the
/// reference treats as unrecoverable for the whole process.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { entries: Vec::new() }
    }

    /// Record a recoverable error at `location`. Prints nothing itself —
    /// callers (the CLI front end) render `entries()` to stderr once, in
    /// the `<file>:<line>:<col>: error: <msg>` shape.
    pub fn report_error(&mut self, location: Location, message: impl Into<String>) {
        self.entries.push(Diagnostic { location, severity: Severity::Error, message: message.into() });
    }

    pub fn report_warning(&mut self, location: Location, message: impl Into<String>) {
        self.entries.push(Diagnostic { location, severity: Severity::Warning, message: message.into() });
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Render every accumulated diagnostic in the same line format,
    /// one per line, in report order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.entries {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }
}

/// Internal-error escape hatch. Reports a diagnostic *and*, in debug builds, trips a
/// `debug_assert!` so the condition is loud during development while still
/// degrading to a recoverable diagnostic in release builds, rather than the
/// reference's `add i64 0, 0`.
#[macro_export]
macro_rules! ice {
    ($diags:expr, $loc:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $diags.report_error($loc.clone(), format!("internal error: {}", msg));
        debug_assert!(false, "internal error: {}", msg);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_renders() {
        let mut d = Diagnostics::new();
        d.report_error(Location::new("a.ads", 3, 7), "no component FOO");
        d.report_error(Location::new("a.ads", 4, 1), "unresolved name BAR");
        assert_eq!(d.error_count(), 2);
        assert!(d.has_errors());
        let rendered = d.render();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("a.ads:3:7: error: no component FOO"));
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut d = Diagnostics::new();
        d.report_warning(Location::new("a.ads", 1, 1), "pragma Pure accepted");
        assert_eq!(d.error_count(), 0);
        assert!(!d.has_errors());
    }
}
