//! Error types for compilation and execution.
//!
//! Runtime faults are called disruptions. Each carries a code from a fixed
//! exit-code taxonomy so the CLI can map it directly onto a process status.

use std::fmt;

use colored::Colorize;
use thiserror::Error;

use crate::span::{source_line, Span};

/// Process exit codes reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,

    // ============ External ============
    /// Command line usage errors.
    Cmd = 64,
    /// Source file errors.
    Syntax = 65,
    Type = 66,
    Argument = 67,
    Range = 68,
    Reference = 69,
    Io = 70,

    // ============ Internal ============
    Memory = 80,
    Overflow = 81,
    Internal = 82,
    Unimplemented = 90,
}

impl ExitCode {
    /// Human readable label printed in front of a fault message.
    pub fn label(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Failure => "Error",
            ExitCode::Cmd => "Command Error",
            ExitCode::Syntax => "Syntax Error",
            ExitCode::Type => "Type Error",
            ExitCode::Argument => "Argument Error",
            ExitCode::Range => "Range Error",
            ExitCode::Reference => "Reference Error",
            ExitCode::Io => "IO Error",
            ExitCode::Memory => "Memory Error",
            ExitCode::Overflow => "Overflow Error",
            ExitCode::Internal => "Internal Error",
            ExitCode::Unimplemented => "Unimplemented Error",
        }
    }

    /// Converts a raw code (e.g. one stored on a `Disruption` instance) back into the taxonomy.
    pub fn from_u8(code: u8) -> Option<ExitCode> {
        let code = match code {
            0 => ExitCode::Success,
            1 => ExitCode::Failure,
            64 => ExitCode::Cmd,
            65 => ExitCode::Syntax,
            66 => ExitCode::Type,
            67 => ExitCode::Argument,
            68 => ExitCode::Range,
            69 => ExitCode::Reference,
            70 => ExitCode::Io,
            80 => ExitCode::Memory,
            81 => ExitCode::Overflow,
            82 => ExitCode::Internal,
            90 => ExitCode::Unimplemented,
            _ => return None,
        };
        Some(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as u8 as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A runtime fault raised while executing bytecode.
///
/// Fatal disruptions bypass every catch region.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {}", .code.label(), .message)]
pub struct Disruption {
    pub code: ExitCode,
    pub message: String,
    pub fatal: bool,
}

impl Disruption {
    pub fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fatal: true,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Type, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Argument, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Range, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Reference, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::fatal(ExitCode::Overflow, message)
    }

    pub fn memory(message: impl Into<String>) -> Self {
        Self::fatal(ExitCode::Memory, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::fatal(ExitCode::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::fatal(ExitCode::Unimplemented, message)
    }

    pub fn wrong_operands(op: &str) -> Self {
        Self::type_error(format!("The \"{}\" operator expected numeric operands.", op))
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::reference(format!("Undefined variable reference to \"{}\".", name))
    }
}

/// One frame of the call trace printed for an uncaught disruption.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub line: usize,
    /// `None` for the top-level script.
    pub function: Option<String>,
    pub source: String,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] ", self.line)?;
        match &self.function {
            Some(name) => write!(f, "at \"{}()\".", name)?,
            None => write!(f, "in script.")?,
        }
        write!(f, "\n[source] `{}`", self.source.trim())
    }
}

/// An uncaught disruption together with the call trace captured when it escaped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{disruption}")]
pub struct RuntimeFault {
    pub disruption: Disruption,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeFault {
    pub fn code(&self) -> ExitCode {
        self.disruption.code
    }

    /// Print the fault and its trace to stderr.
    pub fn report(&self) {
        eprintln!(
            "{} {}",
            format!("{}:", self.disruption.code.label()).red().bold(),
            self.disruption.message
        );
        for frame in &self.trace {
            eprintln!("{}", frame.to_string().dimmed());
        }
    }
}

/// A single compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {}] Syntax Error{}: {}", .span.line, location(.lexeme), .message)]
pub struct SyntaxError {
    pub message: String,
    /// `None` when the error was reported at end of input.
    pub lexeme: Option<String>,
    pub span: Span,
}

fn location(lexeme: &Option<String>) -> String {
    match lexeme {
        Some(lexeme) => format!(" at '{}'", lexeme),
        None => " at end".to_string(),
    }
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, lexeme: Option<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            lexeme,
            span,
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

/// Every diagnostic recorded during one compilation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileErrors(pub Vec<SyntaxError>);

impl CompileErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SyntaxError> {
        self.0.iter()
    }

    /// True when any diagnostic message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|e| e.message.contains(needle))
    }

    /// Render every diagnostic with its source line and a caret under the column.
    pub fn render(&self, source: &str) -> String {
        let mut out = String::new();
        for error in &self.0 {
            let span = error.span;
            let line = source_line(source, span.line);
            let marker = format!("{:>4} | ", span.line);
            let caret = format!(
                "{}{}",
                " ".repeat(marker.len() + span.column.saturating_sub(1)),
                "^".repeat(span.len().max(1))
            );

            out.push_str(&format!(
                "{} {}\n",
                format!("[line {}] Syntax Error{}:", span.line, location(&error.lexeme))
                    .red()
                    .bold(),
                error.message
            ));
            out.push_str(&format!("{}{}\n", marker.dimmed(), line.cyan()));
            out.push_str(&format!("{}\n", caret.red()));
        }
        out
    }

    /// Print [`CompileErrors::render`] to stderr.
    pub fn report(&self, source: &str) {
        eprint!("{}", self.render(source));
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

/// Unified error type for the library entry points.
#[derive(Debug, Error)]
pub enum NucleusError {
    #[error("{0}")]
    Compile(#[from] CompileErrors),

    #[error("{0}")]
    Runtime(#[from] RuntimeFault),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NucleusError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            NucleusError::Compile(_) => ExitCode::Syntax,
            NucleusError::Runtime(fault) => fault.code(),
            NucleusError::Io(_) => ExitCode::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disruption_display() {
        let d = Disruption::type_error("bad operands");
        assert_eq!(d.to_string(), "Type Error: bad operands");
        assert!(!d.fatal);
        assert!(Disruption::overflow("deep").fatal);
    }

    #[test]
    fn test_exit_code_roundtrip() {
        for code in [
            ExitCode::Failure,
            ExitCode::Type,
            ExitCode::Reference,
            ExitCode::Overflow,
            ExitCode::Unimplemented,
        ] {
            assert_eq!(ExitCode::from_u8(code as u8), Some(code));
        }
        assert_eq!(ExitCode::from_u8(3), None);
        assert_eq!(i32::from(ExitCode::Syntax), 65);
    }

    #[test]
    fn test_syntax_error_display() {
        let e = SyntaxError::new(
            "Expected an expression.",
            Some(")".to_string()),
            Span::new(0, 1, 3, 1),
        );
        assert_eq!(
            e.to_string(),
            "[line 3] Syntax Error at ')': Expected an expression."
        );
        let eof = SyntaxError::new("Expected '}'.", None, Span::new(0, 0, 1, 1));
        assert_eq!(eof.to_string(), "[line 1] Syntax Error at end: Expected '}'.");
    }

    #[test]
    fn test_render_points_at_column() {
        colored::control::set_override(false);
        let errors = CompileErrors(vec![SyntaxError::new(
            "Expected an expression.",
            Some(";".to_string()),
            Span::new(12, 13, 2, 5),
        )]);
        let text = errors.render("let a = 1;\nlet ;\n");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[line 2] Syntax Error at ';': Expected an expression.");
        assert_eq!(lines[1], "   2 | let ;");
        assert_eq!(lines[2], "           ^");
    }

    #[test]
    fn test_trace_frame_display() {
        let frame = TraceFrame {
            line: 4,
            function: Some("area".to_string()),
            source: "  return w * h;  ".to_string(),
        };
        assert_eq!(frame.to_string(), "[line 4] at \"area()\".\n[source] `return w * h;`");
    }
}
