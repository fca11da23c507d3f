use crate::cli::Cli;
use crate::error::Sql2CsvError;
use crate::template;

/// Produce the final query text: literal or file contents, then templating.
pub fn resolve_query(args: &Cli) -> Result<String, Sql2CsvError> {
    let raw = match (&args.query, &args.file) {
        (Some(_), Some(_)) => {
            return Err(Sql2CsvError::Config {
                message: "--query and --file are mutually exclusive".to_string(),
            });
        }
        (Some(sql), None) => sql.clone(),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| Sql2CsvError::Config {
            message: format!("cannot read SQL file {}: {}", path.display(), e),
        })?,
        (None, None) => {
            return Err(Sql2CsvError::Config {
                message: "either file or query must be provided".to_string(),
            });
        }
    };

    let sql = match &args.vars {
        Some(vars) => template::render(&raw, vars)?,
        None => raw,
    };

    if sql.trim().is_empty() {
        return Err(Sql2CsvError::Config {
            message: "query is empty".to_string(),
        });
    }

    Ok(sql)
}
