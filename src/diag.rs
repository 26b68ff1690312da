//! Source positions, spans and spanned diagnostics.

use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl Default for Span {
    fn default() -> Self {
        // A harmless 1:1 zero-length span instead of line 0.
        Self {
            start: Position::new(0, 1, 1),
            end: Position::new(0, 1, 1),
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A diagnostic kind paired with its primary span and an optional related
/// span (e.g. the move site for a use-after-move, or the first borrow for a
/// borrow conflict). Enough to render a two-point explanation.
#[derive(Debug, Clone)]
pub struct SpannedError<K> {
    pub kind: K,
    pub span: Span,
    pub related: Option<Span>,
}

impl<K> SpannedError<K> {
    pub fn new(kind: K, span: Span) -> Self {
        Self {
            kind,
            span,
            related: None,
        }
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related = Some(span);
        self
    }
}

impl<K: Display> Display for SpannedError<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "({}:{}) {}",
            self.span.start.line, self.span.start.column, self.kind
        )?;
        if let Some(related) = self.related {
            write!(
                f,
                " (related: {}:{})",
                related.start.line, related.start.column
            )?;
        }
        Ok(())
    }
}

/// Formats an error against its source text with marker lines under the
/// primary span, followed by the related span's snippet when present.
///
/// Example:
/// ```text
/// (4:9) Use after move: `x`
/// │ 4 │ length(&x)
/// │   │ ----------
/// related:
/// │ 3 │ val y = x
/// │   │ ---------
/// ```
pub fn format_error<K: Display>(source: &str, error: &SpannedError<K>) -> String {
    let mut out = format!(
        "({}:{}) {}\n",
        error.span.start.line, error.span.start.column, error.kind
    );
    push_snippet(&mut out, source, error.span);
    if let Some(related) = error.related {
        out.push_str("related:\n");
        push_snippet(&mut out, source, related);
    }
    out
}

#[cfg(test)]
#[path = "tests/t_diag.rs"]
mod tests;

fn push_snippet(out: &mut String, source: &str, span: Span) {
    let lines: Vec<&str> = source.lines().collect();
    let first = span.start.line.max(1);
    let last = span.end.line.max(first).min(lines.len().max(first));
    let width = last.to_string().len();

    for line_no in first..=last {
        let content = lines.get(line_no - 1).copied().unwrap_or("");
        out.push_str(&format!("│ {line_no:>width$} │ {content}\n"));

        let start_col = if line_no == span.start.line {
            span.start.column.max(1)
        } else {
            1
        };
        let end_col = if line_no == span.end.line {
            span.end.column.max(start_col)
        } else {
            content.chars().count() + 1
        };
        let len = (end_col - start_col).max(1);
        let marker = format!("{}{}", " ".repeat(start_col - 1), "-".repeat(len));
        out.push_str(&format!("│ {:>width$} │ {marker}\n", ""));
    }
}
