use crate::error::Sql2CsvError;

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &Sql2CsvError) {
    eprintln!("error: {}", err);
}
