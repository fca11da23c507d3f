use futures::TryStreamExt;
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

use crate::backend::{query_error, scan_error, ColumnMeta, RawValue};
use crate::error::Sql2CsvError;
use crate::pipeline::RowProducer;

/// Run `sql` on the connection and publish its result set, closing the
/// connection afterwards whatever the outcome.
pub async fn stream(
    mut conn: MySqlConnection,
    sql: &str,
    producer: &mut RowProducer,
) -> Result<(), Sql2CsvError> {
    let result = drive(&mut conn, sql, producer).await;
    if let Err(e) = conn.close().await {
        debug!("mysql connection did not close cleanly: {}", e);
    }
    result
}

async fn drive(
    conn: &mut MySqlConnection,
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
    producer.publish_header(columns).await?;

    let mut rows = statement.query().fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.map_err(query_error)? {
        let values = decode_row(&row)?;
        producer.publish_row(values).await?;
    }

    Ok(())
}

fn decode_row(row: &MySqlRow) -> Result<Vec<RawValue>, Sql2CsvError> {
    row.columns()
        .iter()
        .map(|column| decode_cell(row, column.ordinal(), column.name(), column.type_info().name()))
        .collect()
}

fn decode_cell(
    row: &MySqlRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<RawValue, Sql2CsvError> {
    let raw = row.try_get_raw(idx).map_err(|e| scan_error(column, e))?;
    if raw.is_null() {
        return Ok(RawValue::Null);
    }

    let scan = |e| scan_error(column, e);
    let value = match type_name {
        "NULL" => RawValue::Null,
        "BOOLEAN" => RawValue::Bool(row.try_get(idx).map_err(scan)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            RawValue::Int(row.try_get_unchecked::<i64, _>(idx).map_err(scan)?)
        }
        unsigned if unsigned.ends_with(" UNSIGNED") => {
            RawValue::UInt(row.try_get_unchecked::<u64, _>(idx).map_err(scan)?)
        }
        "FLOAT" => RawValue::Float32(row.try_get(idx).map_err(scan)?),
        "DOUBLE" => RawValue::Float64(row.try_get(idx).map_err(scan)?),
        // -838:59:59 ..= 838:59:59, wider than a time of day
        "TIME" => RawValue::Text(row.try_get::<MySqlTime, _>(idx).map_err(scan)?.to_string()),
        "DATE" | "DATETIME" | "TIMESTAMP" => {
            let bytes: &[u8] = row.try_get_unchecked(idx).map_err(scan)?;
            let text = decode_temporal(bytes, type_name == "DATE").map_err(|message| {
                Sql2CsvError::Scan {
                    message: format!("column {column:?}: {message}"),
                }
            })?;
            RawValue::Text(text)
        }
        "BIT" => {
            let bytes: &[u8] = row.try_get_unchecked(idx).map_err(scan)?;
            RawValue::UInt(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
        }
        // DECIMAL arrives as digit text, character columns as their bytes;
        // both are left for the normalizer to interpret by type name.
        _ => {
            let bytes: &[u8] = row.try_get_unchecked(idx).map_err(scan)?;
            RawValue::Bytes(bytes.to_vec())
        }
    };

    Ok(value)
}

/// Render a binary-protocol DATE, DATETIME or TIMESTAMP as MySQL prints it.
///
/// The value is a length byte (0, 4, 7 or 11) followed by year (u16 LE),
/// month, day, then optionally hour, minute, second and microseconds
/// (u32 LE). Zero dates such as `0000-00-00` are valid and kept as text.
pub fn decode_temporal(buf: &[u8], date_only: bool) -> Result<String, String> {
    let (&len, body) = buf
        .split_first()
        .ok_or_else(|| "empty temporal value".to_string())?;
    if body.len() != len as usize || !matches!(len, 0 | 4 | 7 | 11) {
        return Err(format!("temporal value has unexpected length {}", buf.len()));
    }

    let field = |at: usize| body.get(at).copied().unwrap_or(0);
    let year = u16::from_le_bytes([field(0), field(1)]);
    let date = format!("{:04}-{:02}-{:02}", year, field(2), field(3));
    if date_only {
        return Ok(date);
    }

    let mut out = format!("{} {:02}:{:02}:{:02}", date, field(4), field(5), field(6));
    if len == 11 {
        let micros = u32::from_le_bytes([field(7), field(8), field(9), field(10)]);
        if micros != 0 {
            out.push_str(&format!(".{micros:06}"));
        }
    }
    Ok(out)
}
