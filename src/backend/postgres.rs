use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgRow, PgValueFormat};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

use crate::backend::{query_error, scan_error, ColumnMeta, RawValue};
use crate::error::Sql2CsvError;
use crate::pipeline::RowProducer;

/// Run `sql` on the connection and publish its result set, closing the
/// connection afterwards whatever the outcome.
pub async fn stream(
    mut conn: PgConnection,
    sql: &str,
    producer: &mut RowProducer,
) -> Result<(), Sql2CsvError> {
    let result = drive(&mut conn, sql, producer).await;
    if let Err(e) = conn.close().await {
        debug!("postgres connection did not close cleanly: {}", e);
    }
    result
}

/// The statement is described once for the column list, then executed over
/// the simple query protocol so every value arrives in the server's text
/// output form (arrays, intervals, json, `infinity` timestamps included).
async fn drive(
    conn: &mut PgConnection,
    sql: &str,
    producer: &mut RowProducer,
) -> Result<(), Sql2CsvError> {
    let statement = (&mut *conn).prepare(sql).await.map_err(query_error)?;

    let columns = statement
        .columns()
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            type_name: c.type_info().name().to_string(),
        })
        .collect::<Vec<_>>();
    let types = columns
        .iter()
        .map(|c| c.type_name.clone())
        .collect::<Vec<_>>();
    producer.publish_header(columns).await?;

    let mut rows = sqlx::raw_sql(sql).fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.map_err(query_error)? {
        let values = decode_row(&row, &types)?;
        producer.publish_row(values).await?;
    }

    Ok(())
}

fn decode_row(row: &PgRow, types: &[String]) -> Result<Vec<RawValue>, Sql2CsvError> {
    row.columns()
        .iter()
        .map(|column| {
            let type_name = types
                .get(column.ordinal())
                .map(String::as_str)
                .unwrap_or_else(|| column.type_info().name());
            decode_cell(row, column.ordinal(), column.name(), type_name)
        })
        .collect()
}

fn decode_cell(
    row: &PgRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<RawValue, Sql2CsvError> {
    let raw = row.try_get_raw(idx).map_err(|e| scan_error(column, e))?;
    if raw.is_null() {
        return Ok(RawValue::Null);
    }
    if matches!(raw.format(), PgValueFormat::Binary) {
        return Err(Sql2CsvError::Scan {
            message: format!("column {column:?}: unexpected binary-format {type_name} value"),
        });
    }

    let text: &str = row
        .try_get_unchecked(idx)
        .map_err(|e| scan_error(column, e))?;
    decode_text(text, type_name).map_err(|message| Sql2CsvError::Scan {
        message: format!("column {column:?}: {message}"),
    })
}

/// Map one value in PostgreSQL text output form to a raw cell.
///
/// Booleans print as `t`/`f` and are widened to `true`/`false`. NUMERIC and
/// INT8 digits go to the normalizer as bytes; everything else is the server's
/// own rendering and passes through unchanged.
pub fn decode_text(text: &str, type_name: &str) -> Result<RawValue, String> {
    let value = match type_name {
        "BOOL" => match text {
            "t" => RawValue::Bool(true),
            "f" => RawValue::Bool(false),
            other => return Err(format!("invalid boolean {other:?}")),
        },
        "NUMERIC" | "INT8" => RawValue::Bytes(text.as_bytes().to_vec()),
        _ => RawValue::Text(text.to_string()),
    };
    Ok(value)
}
