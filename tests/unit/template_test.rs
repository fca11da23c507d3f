use sql2csv::error::Sql2CsvError;
use sql2csv::template::render;

fn template_message(result: Result<String, Sql2CsvError>) -> String {
    match result {
        Err(Sql2CsvError::Template { message }) => message,
        other => panic!("Expected Template error, got {other:?}"),
    }
}

#[test]
fn substitutes_named_variables() {
    let sql = render(
        "SELECT * FROM {{ schema }}.users WHERE id = {{ id }}",
        r#"{"schema": "public", "id": 42}"#,
    )
    .unwrap();

    assert_eq!(sql, "SELECT * FROM public.users WHERE id = 42");
}

#[test]
fn supports_conditionals_and_loops() {
    let sql = render(
        "SELECT {% for c in cols %}{{ c }}{% if not loop.last %}, {% endif %}{% endfor %} FROM t{% if active %} WHERE active{% endif %}",
        r#"{"cols": ["a", "b", "c"], "active": true}"#,
    )
    .unwrap();

    assert_eq!(sql, "SELECT a, b, c FROM t WHERE active");
}

#[test]
fn text_without_placeholders_is_unchanged() {
    let sql = render("SELECT 1", "{}").unwrap();
    assert_eq!(sql, "SELECT 1");
}

#[test]
fn undefined_variable_is_an_error() {
    let message = template_message(render("SELECT {{ missing }}", r#"{"other": 1}"#));
    assert!(message.contains("cannot render query template"), "message: {message}");
}

#[test]
fn invalid_json_is_an_error() {
    let message = template_message(render("SELECT 1", "{not json"));
    assert!(message.contains("invalid --vars JSON"), "message: {message}");
}

#[test]
fn non_object_json_is_an_error() {
    let message = template_message(render("SELECT 1", "[1, 2, 3]"));
    assert_eq!(message, "--vars must be a JSON object");
}

#[test]
fn malformed_template_is_an_error() {
    let message = template_message(render("SELECT {{ id ", r#"{"id": 1}"#));
    assert!(message.contains("cannot parse query template"), "message: {message}");
}
