//! Cell normalization keyed by the database-reported type name.
//!
//! Drivers hand over values in whatever representation they use on the wire.
//! The registry maps a type name to a function that collapses those
//! representations into CSV text; unmapped types use the generic rendering.

use std::collections::HashMap;

use num_bigint::BigInt;
use tracing::warn;

use crate::backend::{hex_literal, CellValue, RawValue};
use crate::error::Sql2CsvError;

/// How to treat values a normalizer cannot interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Degrade to a fallback rendering and log a warning.
    #[default]
    Lenient,
    /// Fail the invocation with a normalization error.
    Strict,
}

/// A normalization entry: raw value, reported type name, strictness.
pub type NormalizeFn = fn(RawValue, &str, Strictness) -> Result<CellValue, Sql2CsvError>;

const BIG_INTEGER_TYPES: &[&str] = &["BIGINT", "BIGINT UNSIGNED", "INT8"];
const DECIMAL_TYPES: &[&str] = &["DECIMAL", "NUMERIC", "NEWDECIMAL"];
const TEXT_TYPES: &[&str] = &[
    "VARCHAR",
    "CHAR",
    "TEXT",
    "TINYTEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "BPCHAR",
    "NAME",
    "CITEXT",
    "ENUM",
    "SET",
];
const BINARY_TYPES: &[&str] = &["BYTEA", "GEOMETRY"];

pub struct NormalizerRegistry {
    entries: HashMap<String, NormalizeFn>,
    strictness: Strictness,
}

impl NormalizerRegistry {
    /// An empty table: every type uses the generic rendering.
    pub fn new(strictness: Strictness) -> Self {
        Self {
            entries: HashMap::new(),
            strictness,
        }
    }

    /// The table used for Postgres and MySQL result sets.
    pub fn with_defaults(strictness: Strictness) -> Self {
        let mut registry = Self::new(strictness);
        for name in BIG_INTEGER_TYPES {
            registry.register(name, normalize_big_integer);
        }
        for name in DECIMAL_TYPES {
            registry.register(name, normalize_decimal);
        }
        for name in TEXT_TYPES {
            registry.register(name, normalize_text);
        }
        for name in BINARY_TYPES {
            registry.register(name, normalize_binary);
        }
        registry
    }

    /// Add or replace the entry for a type name (case-insensitive).
    pub fn register(&mut self, type_name: &str, f: NormalizeFn) {
        self.entries.insert(type_key(type_name), f);
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Normalize one cell. NULL is always the empty field, whatever the type.
    pub fn normalize(&self, raw: RawValue, type_name: &str) -> Result<CellValue, Sql2CsvError> {
        if matches!(raw, RawValue::Null) {
            return Ok(CellValue::Null);
        }
        match self.entries.get(&type_key(type_name)) {
            Some(f) => f(raw, type_name, self.strictness),
            None => Ok(render_default(raw)),
        }
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_defaults(Strictness::default())
    }
}

/// Upper-case, trimmed, without a parenthesized parameter list.
fn type_key(type_name: &str) -> String {
    let trimmed = type_name.trim();
    let base = match trimmed.find('(') {
        Some(pos) => trimmed[..pos].trim_end(),
        None => trimmed,
    };
    base.to_ascii_uppercase()
}

/// The generic rule for already-typed scalars.
pub fn render_default(raw: RawValue) -> CellValue {
    match raw {
        RawValue::Null => CellValue::Null,
        RawValue::Text(s) => CellValue::Text(s),
        other => CellValue::Text(other.to_string()),
    }
}

/// Digit bytes reported as a wide integer type become exact decimal text.
pub fn normalize_big_integer(
    raw: RawValue,
    type_name: &str,
    strictness: Strictness,
) -> Result<CellValue, Sql2CsvError> {
    match raw {
        RawValue::Bytes(bytes) => parse_big_integer(&bytes, type_name, strictness),
        other => Ok(render_default(other)),
    }
}

/// Integral DECIMAL/NUMERIC digits go through the big-integer path; values
/// with a fractional part or a special value are kept verbatim.
pub fn normalize_decimal(
    raw: RawValue,
    type_name: &str,
    strictness: Strictness,
) -> Result<CellValue, Sql2CsvError> {
    let bytes = match raw {
        RawValue::Bytes(bytes) => bytes,
        other => return Ok(render_default(other)),
    };

    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim();
    if let Some(n) = BigInt::parse_bytes(text.as_bytes(), 10) {
        return Ok(CellValue::Text(n.to_string()));
    }
    if is_decimal_literal(text) || matches!(text, "NaN" | "Infinity" | "-Infinity") {
        return Ok(CellValue::Text(text.to_string()));
    }
    malformed(text, type_name, strictness)
}

/// Character data is decoded as text verbatim.
pub fn normalize_text(
    raw: RawValue,
    type_name: &str,
    strictness: Strictness,
) -> Result<CellValue, Sql2CsvError> {
    match raw {
        RawValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Ok(CellValue::Text(s)),
            Err(e) => match strictness {
                Strictness::Strict => Err(Sql2CsvError::Normalization {
                    message: format!("{type_name} value is not valid UTF-8: {}", e.utf8_error()),
                }),
                Strictness::Lenient => {
                    warn!("{} value is not valid UTF-8, replacing invalid bytes", type_name);
                    Ok(CellValue::Text(
                        String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    ))
                }
            },
        },
        other => Ok(render_default(other)),
    }
}

/// Binary strings always render as a `\x` hex literal.
pub fn normalize_binary(
    raw: RawValue,
    _type_name: &str,
    _strictness: Strictness,
) -> Result<CellValue, Sql2CsvError> {
    match raw {
        RawValue::Bytes(bytes) => Ok(CellValue::Text(hex_literal(&bytes))),
        other => Ok(render_default(other)),
    }
}

fn parse_big_integer(
    bytes: &[u8],
    type_name: &str,
    strictness: Strictness,
) -> Result<CellValue, Sql2CsvError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match BigInt::parse_bytes(text.as_bytes(), 10) {
        Some(n) => Ok(CellValue::Text(n.to_string())),
        None => malformed(text, type_name, strictness),
    }
}

/// Lenient mode renders unparseable integer text as zero.
fn malformed(text: &str, type_name: &str, strictness: Strictness) -> Result<CellValue, Sql2CsvError> {
    match strictness {
        Strictness::Strict => Err(Sql2CsvError::Normalization {
            message: format!("malformed {type_name} value {text:?}"),
        }),
        Strictness::Lenient => {
            warn!("malformed {} value {:?}, writing 0", type_name, text);
            Ok(CellValue::Text("0".to_string()))
        }
    }
}

/// Optional sign, digits, at most one decimal point, at least one digit.
fn is_decimal_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let mut digits = 0;
    let mut points = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }
    digits > 0 && points <= 1
}
