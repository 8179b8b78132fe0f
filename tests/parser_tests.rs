//! Parser integration tests: statement coverage, error reporting, and the
//! print/parse round-trip law.

use webql::ast::{print_program, Expression, Literal, SelectSource, Statement};
use webql::parse;

fn diagnostics_text(diags: &[miette::Report]) -> String {
    diags
        .iter()
        .map(|diag| format!("{diag:?}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_ok(source: &str) -> webql::Program {
    let result = parse(source);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics for `{source}`: {:?}",
        result.diagnostics
    );
    result.ast.expect("AST")
}

fn parse_err(source: &str) -> String {
    let result = parse(source);
    assert!(result.ast.is_none(), "expected parse failure for `{source}`");
    diagnostics_text(&result.diagnostics)
}

#[test]
fn select_with_all_clauses() {
    let program = parse_ok(
        "SELECT title, price AS cost FROM 'https://x.com' WHERE price > 3 \
         ORDER BY cost DESC, title LIMIT 10 OFFSET 5",
    );
    let Statement::Select(select) = &program.statements[0] else {
        panic!("expected SELECT");
    };
    assert_eq!(select.fields.len(), 2);
    assert_eq!(select.fields[1].alias.as_deref(), Some("cost"));
    assert!(select.where_clause.is_some());
    assert_eq!(select.order_by.len(), 2);
    assert!(select.order_by[0].descending);
    assert!(!select.order_by[1].descending);
    assert_eq!(select.limit, Some(10));
    assert_eq!(select.offset, Some(5));
}

#[test]
fn select_sources() {
    let program = parse_ok("SELECT a FROM 'https://x.com'");
    let Statement::Select(select) = &program.statements[0] else {
        panic!()
    };
    assert!(matches!(select.source, SelectSource::Url(_, _)));

    let program = parse_ok("SELECT a FROM rows");
    let Statement::Select(select) = &program.statements[0] else {
        panic!()
    };
    assert!(matches!(select.source, SelectSource::Variable(_, _)));

    let program = parse_ok("SELECT a FROM (SELECT a, b FROM 'https://x.com')");
    let Statement::Select(select) = &program.statements[0] else {
        panic!()
    };
    assert!(matches!(select.source, SelectSource::Subquery(_, _)));
}

#[test]
fn member_field_records_dotted_path() {
    let program = parse_ok("SELECT item.price FROM 'https://x.com'");
    let Statement::Select(select) = &program.statements[0] else {
        panic!()
    };
    assert_eq!(select.fields[0].name.as_str(), "item");
    assert_eq!(select.fields[0].path.as_deref(), Some("item.price"));
}

#[test]
fn navigate_with_options_and_capture() {
    let program = parse_ok(
        "NAVIGATE TO 'https://x.com' WITH {waitUntil: 'networkidle', timeout: 30s, \
         screenshot: TRUE, browser: {headless: TRUE, viewport: {width: 1280, height: 720}}} \
         CAPTURE title, url",
    );
    let Statement::Navigate(navigate) = &program.statements[0] else {
        panic!("expected NAVIGATE");
    };
    let options = navigate.options.as_ref().expect("options");
    assert_eq!(options.timeout_ms, Some(30_000.0));
    assert!(options.screenshot);
    assert_eq!(
        options.browser.as_ref().and_then(|b| b.viewport),
        Some((1280, 720))
    );
    assert_eq!(navigate.capture.len(), 2);
}

#[test]
fn navigate_rejects_unknown_option_keys() {
    let text = parse_err("NAVIGATE TO 'https://x.com' WITH {bogus: 1}");
    assert!(text.contains("unrecognized NAVIGATE option"), "{text}");
}

#[test]
fn navigate_rejects_both_wait_options() {
    let text = parse_err("NAVIGATE TO 'https://x.com' WITH {waitFor: 'load', waitUntil: 'load'}");
    assert!(text.contains("waitFor and waitUntil"), "{text}");
}

#[test]
fn navigate_rejects_bad_wait_value() {
    let text = parse_err("NAVIGATE TO 'https://x.com' WITH {waitFor: 'whenever'}");
    assert!(text.contains("lifecycle event"), "{text}");
}

#[test]
fn navigate_accepts_selector_wait() {
    parse_ok("NAVIGATE TO 'https://x.com' WITH {waitFor: '#content'}");
    parse_ok("NAVIGATE TO 'https://x.com' WITH {waitFor: '.spinner'}");
    parse_ok("NAVIGATE TO 'https://x.com' WITH {waitFor: '[data-ready]'}");
}

#[test]
fn navigate_rejects_negative_timeout() {
    let text = parse_err("NAVIGATE TO 'https://x.com' WITH {timeout: -5}");
    assert!(text.contains("timeout"), "{text}");
}

#[test]
fn navigate_rejects_unknown_proxy_key() {
    let text = parse_err("NAVIGATE TO 'https://x.com' WITH {proxy: {recache: TRUE}}");
    assert!(text.contains("unrecognized proxy option"), "{text}");
}

#[test]
fn set_show_for_if() {
    let program = parse_ok(
        "SET config.retries = 3\n\
         SHOW METRICS\n\
         FOR EACH u IN ['https://a.com'] { NAVIGATE TO u }\n\
         IF done THEN SHOW CACHE ELSE SHOW METRICS",
    );
    assert_eq!(program.statements.len(), 4);
    assert!(matches!(program.statements[0], Statement::Set(_)));
    assert!(matches!(program.statements[1], Statement::Show(_)));
    assert!(matches!(program.statements[2], Statement::For(_)));
    assert!(matches!(program.statements[3], Statement::If(_)));
}

#[test]
fn insert_update_delete() {
    let program = parse_ok(
        "INSERT INTO '#search' VALUES ('rust', 'parsing')\n\
         UPDATE '.row' SET value = 1 WHERE active = TRUE\n\
         DELETE FROM '.stale' WHERE age > 30",
    );
    let Statement::Insert(insert) = &program.statements[0] else {
        panic!()
    };
    assert_eq!(insert.values.len(), 2);
    let Statement::Update(update) = &program.statements[1] else {
        panic!()
    };
    assert_eq!(update.assignments.len(), 1);
    assert!(update.where_clause.is_some());
    let Statement::Delete(delete) = &program.statements[2] else {
        panic!()
    };
    assert!(delete.where_clause.is_some());
}

#[test]
fn with_ctes() {
    let program = parse_ok(
        "WITH pages AS (SELECT title FROM 'https://x.com'), \
         posts AS (SELECT title FROM 'https://y.com') \
         SELECT title FROM pages",
    );
    let Statement::With(with) = &program.statements[0] else {
        panic!("expected WITH");
    };
    assert_eq!(with.ctes.len(), 2);
    assert_eq!(with.ctes[0].name.as_str(), "pages");
}

#[test]
fn duplicate_cte_names_rejected() {
    let text = parse_err(
        "WITH p AS (SELECT a FROM 'https://x.com'), p AS (SELECT b FROM 'https://y.com') \
         SELECT a FROM p",
    );
    assert!(text.contains("duplicate CTE"), "{text}");
}

#[test]
fn unknown_leading_token_is_rejected() {
    let text = parse_err("FETCH 'https://x.com'");
    assert!(text.contains("expected statement"), "{text}");
}

#[test]
fn first_error_stops_parsing() {
    // Both statements are bad; only one diagnostic is produced.
    let result = parse("SELECT FROM x\nSELECT FROM y");
    assert!(result.ast.is_none());
    assert_eq!(result.diagnostics.len(), 1);
}

#[test]
fn errors_carry_position_notes() {
    let text = parse_err("SELECT title FROM");
    assert!(text.contains("line 1"), "{text}");
}

// ---------------------------------------------------------------------
// Round-trip law: printing a parsed program and re-parsing it yields a
// stable canonical form.
// ---------------------------------------------------------------------

fn assert_round_trip(source: &str) {
    let first = print_program(&parse_ok(source));
    let second = print_program(&parse_ok(&first));
    assert_eq!(first, second, "unstable print for `{source}`");
}

#[test]
fn print_parse_round_trip() {
    for source in [
        "SELECT title FROM 'https://x.com'",
        "SELECT title, price AS cost FROM 'https://x.com' WHERE price > 3 AND name LIKE '%x%' \
         ORDER BY cost DESC LIMIT 10 OFFSET 2",
        "SELECT a FROM (SELECT a, b FROM 'https://x.com' WHERE b IN [1, 2, 3])",
        "NAVIGATE TO 'https://x.com' WITH {waitUntil: 'load', timeout: 5000} CAPTURE title",
        "SET config.depth = 2 + 3",
        "SHOW CACHE",
        "FOR EACH u IN ['https://a.com', 'https://b.com'] { NAVIGATE TO u }",
        "IF NOT done THEN { SHOW CACHE } ELSE { SHOW METRICS }",
        "INSERT INTO '#search' VALUES ('rust')",
        "UPDATE '.row' SET value = 1, label = 'x' WHERE active = TRUE",
        "DELETE FROM '.stale'",
        "WITH pages AS (SELECT title FROM 'https://x.com') SELECT title FROM pages",
        "SELECT n FROM x WHERE (a OR b) AND NOT c",
    ] {
        assert_round_trip(source);
    }
}

#[test]
fn round_trip_preserves_structure() {
    // parse(print(parse(q))) is structurally identical to parse(q) up to
    // spans, which the canonical form regenerates.
    let source = "SELECT title FROM 'https://x.com' WHERE price > 3 LIMIT 5";
    let original = parse_ok(source);
    let printed = print_program(&original);
    let reparsed = parse_ok(&printed);

    let (Statement::Select(a), Statement::Select(b)) =
        (&original.statements[0], &reparsed.statements[0])
    else {
        panic!("expected SELECTs");
    };
    assert_eq!(a.fields.len(), b.fields.len());
    assert_eq!(a.limit, b.limit);
    assert_eq!(
        a.fields[0].output_name(),
        b.fields[0].output_name()
    );
    match (&a.where_clause, &b.where_clause) {
        (
            Some(Expression::Binary(op_a, _, _, _)),
            Some(Expression::Binary(op_b, _, _, _)),
        ) => assert_eq!(op_a, op_b),
        other => panic!("unexpected where clauses: {other:?}"),
    }
}

#[test]
fn duration_and_bytes_literals_round_trip() {
    let program = parse_ok("SET window = 5s\nSET quota = 2MB");
    let Statement::Set(set) = &program.statements[0] else {
        panic!()
    };
    assert!(matches!(
        set.value,
        Expression::Literal(Literal::Duration(ms), _) if ms == 5_000.0
    ));
    let Statement::Set(set) = &program.statements[1] else {
        panic!()
    };
    assert!(matches!(
        set.value,
        Expression::Literal(Literal::Bytes(2_097_152), _)
    ));
    assert_round_trip("SET window = 5s");
    assert_round_trip("SET quota = 2MB");
}
