use std::env;
use std::fmt::Write as _;

use crate::graph::GraphError;
use crate::syntax::error::SyntaxError;
use crate::syntax::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Human-facing report built from the structured error types; used by the
/// REPL and anything else that prints to a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub title: String,
    pub message: Option<String>,
    pub position: Option<Position>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn error(title: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            title: title.into(),
            message: None,
            position: None,
            hints: Vec::new(),
        }
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            title: title.into(),
            message: None,
            position: None,
            hints: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn from_syntax_error(error: &SyntaxError) -> Self {
        let mut diagnostic = Diagnostic::error(error.to_string()).with_position(error.position());
        if !error.parsed().is_empty() {
            diagnostic = diagnostic.with_message(format!("parsed up to `{}`", error.parsed()));
        }
        if let SyntaxError::UnmatchedBracket { .. } = error {
            diagnostic = diagnostic.with_hint("Close the bracket before the end of the formula.");
        }
        diagnostic
    }

    pub fn from_graph_error(error: &GraphError) -> Self {
        match error {
            GraphError::Syntax(syntax) => Self::from_syntax_error(syntax),
            GraphError::Cycle { from, to } => Diagnostic::error(error.to_string()).with_hint(
                format!("Break the loop between `{}` and `{}` before rewiring.", from, to),
            ),
            GraphError::UnknownFunction { .. } => Diagnostic::error(error.to_string())
                .with_hint("Built-in functions: min, max, sum, abs, len."),
            _ => Diagnostic::error(error.to_string()),
        }
    }

    /// Render for a terminal, with a source caret when the position and
    /// source line are available. Honors `NO_COLOR`.
    pub fn render(&self, source: Option<&str>) -> String {
        let use_color = env::var_os("NO_COLOR").is_none();
        let (red, yellow, bold, reset) = if use_color {
            ("\u{1b}[31m", "\u{1b}[33m", "\u{1b}[1m", "\u{1b}[0m")
        } else {
            ("", "", "", "")
        };
        let mut out = String::new();
        let label = match self.severity {
            Severity::Error => format!("{}{}error{}", bold, red, reset),
            Severity::Warning => format!("{}{}warning{}", bold, yellow, reset),
        };
        let _ = write!(out, "{}: {}", label, self.title);
        if let (Some(position), Some(source)) = (self.position, source)
            && let Some(line) = source.lines().nth(position.line.saturating_sub(1))
        {
            let _ = write!(out, "\n  {}\n  {}^", line, " ".repeat(position.column));
        }
        if let Some(message) = &self.message {
            let _ = write!(out, "\n  note: {}", message);
        }
        for hint in &self.hints {
            let _ = write!(out, "\n  hint: {}", hint);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::parse;

    #[test]
    fn test_render_plain() {
        // SAFETY: test-local env mutation, no concurrent env readers here.
        unsafe { std::env::set_var("NO_COLOR", "1") };
        let rendered = Diagnostic::error("something broke")
            .with_hint("try again")
            .render(None);
        assert_eq!(rendered, "error: something broke\n  hint: try again");
    }

    #[test]
    fn test_syntax_error_diagnostic_carries_position() {
        let error = parse("1 + ").unwrap_err();
        let diagnostic = Diagnostic::from_syntax_error(&error);
        assert_eq!(diagnostic.severity, Severity::Error);
        assert!(diagnostic.position.is_some());
        assert!(diagnostic.message.as_deref().unwrap_or("").contains("1"));
    }
}
