// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used by every synthesis phase.
// Grammars arrive pre-analysed, so diagnostics point at grammar entities
// (a track, a nonterminal, an option) rather than at source spans.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable codes, grouped by phase.
///
/// - `E01xx` / `W01xx`: grammar and option validation
/// - `E02xx` / `W02xx`: parallel-variant planning
/// - `E06xx`: postcondition certificates
/// - `E07xx`: builder invariants (internal errors)
pub mod codes {
    use super::DiagCode;

    pub const E0100: DiagCode = DiagCode("E0100"); // grammar has no tracks
    pub const E0101: DiagCode = DiagCode("E0101"); // table count != track count
    pub const E0102: DiagCode = DiagCode("E0102"); // unknown index variable
    pub const E0103: DiagCode = DiagCode("E0103"); // duplicate running index
    pub const E0104: DiagCode = DiagCode("E0104"); // duplicate nonterminal
    pub const E0105: DiagCode = DiagCode("E0105"); // order names unknown nonterminal
    pub const E0106: DiagCode = DiagCode("E0106"); // order repeats a nonterminal
    pub const E0107: DiagCode = DiagCode("E0107"); // tile size is zero
    pub const E0108: DiagCode = DiagCode("E0108"); // tabulated nonterminal missing from order
    pub const E0109: DiagCode = DiagCode("E0109"); // running index is a generated identifier
    pub const E0110: DiagCode = DiagCode("E0110"); // option identifier collides
    pub const W0100: DiagCode = DiagCode("W0100"); // no tabulated nonterminals

    pub const E0200: DiagCode = DiagCode("E0200"); // parallel variant needs one track
    pub const W0200: DiagCode = DiagCode("W0200"); // parallel variant skipped

    pub const E0600: DiagCode = DiagCode("E0600"); // traversal certificate failed

    pub const E0700: DiagCode = DiagCode("E0700"); // loop / end-state mismatch
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any synthesis phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// Grammar entity the diagnostic is about, e.g. `nonterminal 'hairpin'`.
    pub subject: Option<String>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, subject, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            subject: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the grammar entity this diagnostic refers to.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        match &self.code {
            Some(code) => write!(f, "{}[{}]: ", level, code)?,
            None => write!(f, "{}: ", level)?,
        }
        if let Some(subject) = &self.subject {
            write!(f, "{}: ", subject)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True when any diagnostic in `diags` is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}
