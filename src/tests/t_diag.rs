use super::*;

fn span(line: usize, start_col: usize, end_col: usize) -> Span {
    Span::new(
        Position::new(0, line, start_col),
        Position::new(0, line, end_col),
    )
}

#[test]
fn display_renders_position_and_related() {
    let error =
        SpannedError::new("use of moved value `x`".to_string(), span(3, 1, 11)).with_related(span(2, 1, 10));
    assert_eq!(
        error.to_string(),
        "(3:1) use of moved value `x` (related: 2:1)"
    );
}

#[test]
fn format_error_marks_both_spans() {
    let source = "val x = make()\nval y = x\nlength(&x)\n";
    let error =
        SpannedError::new("use of moved value `x`".to_string(), span(3, 1, 11)).with_related(span(2, 1, 10));

    let rendered = format_error(source, &error);
    assert!(rendered.starts_with("(3:1) use of moved value `x`\n"));
    assert!(rendered.contains("length(&x)"));
    assert!(rendered.contains("related:"));
    assert!(rendered.contains("val y = x"));
    assert!(rendered.contains("----------"));
}

#[test]
fn format_error_tolerates_spans_past_the_source() {
    let source = "val x = 1\n";
    let error = SpannedError::new("boom".to_string(), span(9, 1, 2));
    // Must not panic; the snippet degrades to an empty line.
    let rendered = format_error(source, &error);
    assert!(rendered.starts_with("(9:1) boom\n"));
}

#[test]
fn default_span_points_at_the_start() {
    let span = Span::default();
    assert_eq!(span.start.line, 1);
    assert_eq!(span.start.column, 1);
    assert_eq!(span.to_string(), "1:1..1:1");
}
