use std::io::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::Sql2CsvError;
use crate::pipeline::Record;

/// Writes records as CSV, in the order they are handed over.
///
/// Fields containing the delimiter, a quote or a line break are quoted and
/// embedded quotes are doubled. Records end with `\n`.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    columns: usize,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    pub fn new(output: W) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b',')
            .quote(b'"')
            .double_quote(true)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(output);
        Self {
            writer,
            columns: 0,
            rows: 0,
        }
    }

    /// Write one record. Data rows must match the header's arity.
    pub fn write_record(&mut self, record: &Record) -> Result<(), Sql2CsvError> {
        match record {
            Record::Header(names) => {
                self.writer.write_record(names).map_err(write_error)?;
                self.columns = names.len();
            }
            Record::Row(cells) => {
                self.writer
                    .write_record(cells.iter().map(|c| c.as_str()))
                    .map_err(write_error)?;
                self.rows += 1;
            }
        }
        Ok(())
    }

    /// Flush everything buffered so far to the destination.
    pub fn finish(&mut self) -> Result<(), Sql2CsvError> {
        self.writer.flush().map_err(|e| Sql2CsvError::Write {
            message: e.to_string(),
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Data rows written, not counting the header.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

fn write_error(e: csv::Error) -> Sql2CsvError {
    Sql2CsvError::Write {
        message: e.to_string(),
    }
}
