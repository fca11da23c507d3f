use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::{MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::backend::Scheme;

/// Which SQL dialect to parse with.
#[derive(Debug, Clone, Copy)]
pub enum BackendDialect {
    Postgres,
    MySql,
}

impl From<Scheme> for BackendDialect {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Postgres => BackendDialect::Postgres,
            Scheme::MySql => BackendDialect::MySql,
        }
    }
}

/// Why a query was denied.
#[derive(Debug, Clone)]
pub enum DenialKind {
    WriteStatement,
    SelectInto,
    CteWrappedWrite,
    StoredProcedure,
    MultipleStatements,
    EmptyQuery,
    ParseFailure,
    Unrecognized,
}

/// A single denial reason.
#[derive(Debug, Clone)]
pub struct DenialReason {
    pub statement_index: usize,
    pub kind: DenialKind,
    pub detail: String,
}

/// Outcome of read-only query validation.
#[derive(Debug)]
pub enum ValidationResult {
    Safe,
    Denied { reasons: Vec<DenialReason> },
}

impl ValidationResult {
    /// All denial details joined into one line.
    pub fn detail(&self) -> Option<String> {
        match self {
            ValidationResult::Safe => None,
            ValidationResult::Denied { reasons } => Some(
                reasons
                    .iter()
                    .map(|r| r.detail.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        }
    }
}

/// Validate that the text is exactly one read-only statement.
pub fn validate(sql: &str, dialect: BackendDialect) -> ValidationResult {
    let statements = match dialect {
        BackendDialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        BackendDialect::MySql => Parser::parse_sql(&MySqlDialect {}, sql),
    };

    let statements = match statements {
        Ok(stmts) => stmts,
        Err(e) => {
            return ValidationResult::Denied {
                reasons: vec![DenialReason {
                    statement_index: 0,
                    kind: DenialKind::ParseFailure,
                    detail: format!("cannot verify query safety: {}", e),
                }],
            };
        }
    };

    let mut reasons = Vec::new();

    match statements.len() {
        0 => reasons.push(DenialReason {
            statement_index: 0,
            kind: DenialKind::EmptyQuery,
            detail: "no SQL statement found".to_string(),
        }),
        1 => {}
        n => reasons.push(DenialReason {
            statement_index: 1,
            kind: DenialKind::MultipleStatements,
            detail: format!("expected a single statement, found {n}"),
        }),
    }

    for (i, stmt) in statements.iter().enumerate() {
        if !is_safe_statement(stmt) {
            let (kind, detail) = classify_denial(stmt);
            reasons.push(DenialReason {
                statement_index: i,
                kind,
                detail,
            });
        }
    }

    if reasons.is_empty() {
        ValidationResult::Safe
    } else {
        ValidationResult::Denied { reasons }
    }
}

fn is_safe_statement(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => is_safe_query_body(&query.body),
        Statement::ExplainTable { .. } => true,
        Statement::Explain { analyze, .. } => !analyze,
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowVariable { .. } => true,
        _ => false,
    }
}

fn is_safe_query_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_safe_query_body(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            is_safe_query_body(left) && is_safe_query_body(right)
        }
        SetExpr::Values(_) => true,
        SetExpr::Table(_) => true,
        _ => false,
    }
}

fn classify_denial(stmt: &Statement) -> (DenialKind, String) {
    match stmt {
        Statement::Insert { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: INSERT".to_string(),
        ),
        Statement::Update { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: UPDATE".to_string(),
        ),
        Statement::Delete { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: DELETE".to_string(),
        ),
        Statement::Drop { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: DROP".to_string(),
        ),
        Statement::CreateTable { .. } | Statement::CreateView { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: DDL".to_string(),
        ),
        Statement::AlterTable { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: ALTER".to_string(),
        ),
        Statement::Truncate { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: TRUNCATE".to_string(),
        ),
        Statement::Merge { .. } => (
            DenialKind::WriteStatement,
            "query would modify state: MERGE".to_string(),
        ),
        Statement::Explain { .. } => (
            DenialKind::WriteStatement,
            "EXPLAIN ANALYZE executes the statement".to_string(),
        ),
        Statement::Execute { .. } | Statement::Call { .. } => (
            DenialKind::StoredProcedure,
            "procedure execution is not allowed in read-only mode".to_string(),
        ),
        Statement::Query(query) => classify_query_denial(&query.body),
        _ => (
            DenialKind::Unrecognized,
            "unrecognized statement type, denied by default".to_string(),
        ),
    }
}

fn classify_query_denial(body: &SetExpr) -> (DenialKind, String) {
    match body {
        SetExpr::Select(select) if select.into.is_some() => (
            DenialKind::SelectInto,
            "SELECT INTO would create a table".to_string(),
        ),
        SetExpr::Insert(_) => (
            DenialKind::CteWrappedWrite,
            "CTE-wrapped INSERT is not allowed in read-only mode".to_string(),
        ),
        SetExpr::Update(_) => (
            DenialKind::CteWrappedWrite,
            "CTE-wrapped UPDATE is not allowed in read-only mode".to_string(),
        ),
        SetExpr::Query(query) => classify_query_denial(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            if is_safe_query_body(left) {
                classify_query_denial(right)
            } else {
                classify_query_denial(left)
            }
        }
        _ => (
            DenialKind::Unrecognized,
            "query contains unsafe operations".to_string(),
        ),
    }
}
