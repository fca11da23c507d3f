pub mod mysql;
pub mod postgres;

use std::fmt::{self, Write as _};

use secrecy::{ExposeSecret, SecretString};
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::Connection as _;

use crate::error::Sql2CsvError;
use crate::pipeline::RowProducer;

/// Metadata for a single result column.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

/// A single normalized cell, ready for CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Null,
}

impl CellValue {
    /// The CSV field text. NULL is the empty field.
    pub fn as_str(&self) -> &str {
        match self {
            CellValue::Text(s) => s,
            CellValue::Null => "",
        }
    }
}

/// A cell as the driver handed it over, before normalization.
///
/// `Bytes` carries driver-specific encodings (textual DECIMAL digits,
/// character data, blobs) whose meaning depends on the reported type name.
/// `Text` is already in its final printed form.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(v) => write!(f, "{v}"),
            RawValue::Int(v) => write!(f, "{v}"),
            RawValue::UInt(v) => write!(f, "{v}"),
            RawValue::Float32(v) => write_float(f, f64::from(*v), &v.to_string()),
            RawValue::Float64(v) => write_float(f, *v, &v.to_string()),
            RawValue::Text(v) => f.write_str(v),
            RawValue::Bytes(v) => match std::str::from_utf8(v) {
                Ok(s) => f.write_str(s),
                Err(_) => f.write_str(&hex_literal(v)),
            },
        }
    }
}

/// Infinities print the way the databases spell them.
fn write_float(f: &mut fmt::Formatter<'_>, v: f64, finite: &str) -> fmt::Result {
    if v == f64::INFINITY {
        f.write_str("Infinity")
    } else if v == f64::NEG_INFINITY {
        f.write_str("-Infinity")
    } else {
        f.write_str(finite)
    }
}

/// Render bytes the way PostgreSQL prints bytea: `\x` followed by lowercase hex.
pub fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Backend family selected by the connection URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Postgres,
    MySql,
}

impl Scheme {
    pub fn label(&self) -> &'static str {
        match self {
            Scheme::Postgres => "postgres",
            Scheme::MySql => "mysql",
        }
    }
}

/// Known URI schemes and the backend family each one dials.
const SCHEMES: &[(&str, Scheme)] = &[
    ("postgres", Scheme::Postgres),
    ("postgresql", Scheme::Postgres),
    ("mysql", Scheme::MySql),
    ("mariadb", Scheme::MySql),
];

/// Map a connection URI to its backend and the URI handed to the driver.
///
/// The driver receives the URI unchanged except for `mariadb://`, which the
/// MySQL driver only accepts under the `mysql` scheme.
pub fn resolve_scheme(uri: &str) -> Result<(Scheme, String), Sql2CsvError> {
    let uri = uri.trim();
    let (prefix, rest) = match uri.split_once("://") {
        Some(parts) => parts,
        None => {
            let scheme = uri.split_once(':').map(|(s, _)| s).unwrap_or("");
            return Err(Sql2CsvError::UnsupportedScheme {
                scheme: scheme.to_string(),
            });
        }
    };

    let lowered = prefix.to_ascii_lowercase();
    let scheme = SCHEMES
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, scheme)| *scheme)
        .ok_or_else(|| Sql2CsvError::UnsupportedScheme {
            scheme: prefix.to_string(),
        })?;

    let driver_uri = match scheme {
        Scheme::MySql if lowered == "mariadb" => format!("mysql://{rest}"),
        _ => uri.to_string(),
    };

    Ok((scheme, driver_uri))
}

/// An open, exclusively owned database connection.
pub enum Connection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Postgres(_) => f.write_str("Connection::Postgres"),
            Connection::MySql(_) => f.write_str("Connection::MySql"),
        }
    }
}

/// Dial the backend named by the URI scheme. No retries.
pub async fn connect(uri: &SecretString) -> Result<Connection, Sql2CsvError> {
    let (scheme, driver_uri) = resolve_scheme(uri.expose_secret())?;
    let connection = match scheme {
        Scheme::Postgres => PgConnection::connect(&driver_uri)
            .await
            .map(Connection::Postgres),
        Scheme::MySql => MySqlConnection::connect(&driver_uri)
            .await
            .map(Connection::MySql),
    };
    connection.map_err(|e| Sql2CsvError::Connection {
        message: format!("{} connection failed: {}", scheme.label(), e),
    })
}

/// Something that can run one query and feed its result set to a producer.
///
/// Implementations publish the column descriptor exactly once, then every
/// row in cursor order, and release their resources before returning.
pub trait QuerySource: Send + 'static {
    fn stream(
        self,
        sql: &str,
        producer: &mut RowProducer,
    ) -> impl std::future::Future<Output = Result<(), Sql2CsvError>> + Send;
}

impl QuerySource for Connection {
    async fn stream(self, sql: &str, producer: &mut RowProducer) -> Result<(), Sql2CsvError> {
        match self {
            Connection::Postgres(conn) => postgres::stream(conn, sql, producer).await,
            Connection::MySql(conn) => mysql::stream(conn, sql, producer).await,
        }
    }
}

pub(crate) fn query_error(e: sqlx::Error) -> Sql2CsvError {
    Sql2CsvError::Query {
        message: e.to_string(),
    }
}

pub(crate) fn scan_error(column: &str, e: sqlx::Error) -> Sql2CsvError {
    Sql2CsvError::Scan {
        message: format!("column {column:?}: {e}"),
    }
}
