use thiserror::Error;

/// Terminal failure of one invocation. Each variant names the stage it came from.
#[derive(Debug, Error)]
pub enum Sql2CsvError {
    #[error("config: {message}")]
    Config { message: String },

    #[error("template: {message}")]
    Template { message: String },

    #[error("validation: {reason}")]
    Validation { reason: String },

    #[error("unsupported scheme: {scheme:?} (expected postgres://, postgresql://, mysql:// or mariadb://)")]
    UnsupportedScheme { scheme: String },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("query: {message}")]
    Query { message: String },

    #[error("scan: {message}")]
    Scan { message: String },

    #[error("normalization: {message}")]
    Normalization { message: String },

    #[error("write: {message}")]
    Write { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
