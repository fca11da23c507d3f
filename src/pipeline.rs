//! Producer/consumer wiring between a query cursor and the CSV sink.
//!
//! The producer runs as its own task and publishes records onto a bounded
//! channel; the caller's task drains the channel into the sink. A full channel
//! stalls the producer, so memory is bounded by the channel capacity. A
//! producer failure is reported through a single-slot error channel after
//! every row published before it, so nothing already queued is lost.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::backend::{CellValue, ColumnMeta, QuerySource, RawValue};
use crate::error::Sql2CsvError;
use crate::normalize::{NormalizerRegistry, Strictness};
use crate::sink::CsvSink;

/// Channel capacity when none is configured.
pub const DEFAULT_BUFFER: usize = 100;

/// One unit of CSV output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Header(Vec<String>),
    Row(Vec<CellValue>),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub buffer: usize,
    pub strictness: Strictness,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
            strictness: Strictness::default(),
        }
    }
}

/// What reached the output on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub columns: usize,
    pub rows: usize,
}

/// Publishing half of the pipeline, handed to a [`QuerySource`].
///
/// The header must be published once before any row; every row must match
/// its arity. Dropping the producer closes the delivery channel.
pub struct RowProducer {
    tx: mpsc::Sender<Record>,
    registry: Arc<NormalizerRegistry>,
    column_types: Option<Vec<String>>,
    rows: usize,
}

impl RowProducer {
    fn new(tx: mpsc::Sender<Record>, registry: Arc<NormalizerRegistry>) -> Self {
        Self {
            tx,
            registry,
            column_types: None,
            rows: 0,
        }
    }

    pub async fn publish_header(&mut self, columns: Vec<ColumnMeta>) -> Result<(), Sql2CsvError> {
        if self.column_types.is_some() {
            return Err(Sql2CsvError::Scan {
                message: "column descriptor published twice".to_string(),
            });
        }
        let (names, types): (Vec<_>, Vec<_>) = columns
            .into_iter()
            .map(|c| (c.name, c.type_name))
            .unzip();
        self.column_types = Some(types);
        self.send(Record::Header(names)).await
    }

    pub async fn publish_row(&mut self, values: Vec<RawValue>) -> Result<(), Sql2CsvError> {
        let types = self.column_types.as_ref().ok_or_else(|| Sql2CsvError::Scan {
            message: "row published before column descriptor".to_string(),
        })?;
        if values.len() != types.len() {
            return Err(Sql2CsvError::Scan {
                message: format!(
                    "row {} has {} values, expected {}",
                    self.rows + 1,
                    values.len(),
                    types.len()
                ),
            });
        }

        let cells = values
            .into_iter()
            .zip(types)
            .map(|(raw, type_name)| self.registry.normalize(raw, type_name))
            .collect::<Result<Vec<_>, _>>()?;

        self.send(Record::Row(cells)).await?;
        self.rows += 1;
        Ok(())
    }

    /// Rows published so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    async fn send(&self, record: Record) -> Result<(), Sql2CsvError> {
        self.tx.send(record).await.map_err(|_| Sql2CsvError::Write {
            message: "output closed before all rows were delivered".to_string(),
        })
    }
}

/// Run `sql` through `source` and stream the result set into `output` as CSV.
///
/// Returns after the sink has drained the channel or as soon as an error from
/// either side is observed. Rows written before a failure stay written.
pub async fn run_pipeline<S, W>(
    source: S,
    sql: String,
    options: PipelineOptions,
    output: W,
) -> Result<PipelineSummary, Sql2CsvError>
where
    S: QuerySource,
    W: Write,
{
    if options.buffer == 0 {
        return Err(Sql2CsvError::Config {
            message: "buffer size must be at least 1".to_string(),
        });
    }

    let (tx, mut rx) = mpsc::channel(options.buffer);
    let (err_tx, mut err_rx) = oneshot::channel();
    let registry = Arc::new(NormalizerRegistry::with_defaults(options.strictness));

    let producer = tokio::spawn(async move {
        let mut producer = RowProducer::new(tx, registry);
        if let Err(err) = source.stream(&sql, &mut producer).await {
            // The error goes out before `producer` drops and closes the channel.
            let _ = err_tx.send(err);
        }
        producer.rows()
    });

    let mut sink = CsvSink::new(output);
    let drained = drain(&mut rx, &mut err_rx, &mut sink).await;
    let flushed = sink.finish();

    // Unblock a producer still waiting on a full channel before joining it.
    drop(rx);
    let joined = producer.await;

    drained?;
    flushed?;
    let published = match joined {
        Ok(rows) => rows,
        // Re-raise producer panics on the caller's task.
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            return Err(Sql2CsvError::Query {
                message: format!("row producer task was cancelled: {e}"),
            });
        }
    };
    debug!("{} rows published, {} written", published, sink.rows());

    Ok(PipelineSummary {
        columns: sink.columns(),
        rows: sink.rows(),
    })
}

async fn drain<W: Write>(
    rx: &mut mpsc::Receiver<Record>,
    err_rx: &mut oneshot::Receiver<Sql2CsvError>,
    sink: &mut CsvSink<W>,
) -> Result<(), Sql2CsvError> {
    let mut error_slot_open = true;
    loop {
        tokio::select! {
            // Queued rows win over a pending error so none are dropped.
            biased;

            record = rx.recv() => match record {
                Some(record) => sink.write_record(&record)?,
                None => {
                    if !error_slot_open {
                        return Ok(());
                    }
                    return match err_rx.await {
                        Ok(err) => Err(err),
                        Err(_) => Ok(()),
                    };
                }
            },

            err = &mut *err_rx, if error_slot_open => match err {
                Ok(err) => return Err(err),
                // Producer finished cleanly; keep draining until the channel closes.
                Err(_) => error_slot_open = false,
            },
        }
    }
}
