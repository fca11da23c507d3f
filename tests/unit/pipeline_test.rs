use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sql2csv::backend::{ColumnMeta, QuerySource, RawValue};
use sql2csv::error::Sql2CsvError;
use sql2csv::normalize::Strictness;
use sql2csv::pipeline::{run_pipeline, PipelineOptions, PipelineSummary, RowProducer};

/// In-memory result set that fails after `fail_after` rows when set.
struct FakeSource {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<RawValue>>,
    fail_after: Option<usize>,
    closed: Arc<AtomicBool>,
}

impl FakeSource {
    fn new(columns: &[(&str, &str)], rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, type_name)| ColumnMeta {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                })
                .collect(),
            rows,
            fail_after: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

impl QuerySource for FakeSource {
    async fn stream(self, _sql: &str, producer: &mut RowProducer) -> Result<(), Sql2CsvError> {
        let FakeSource {
            columns,
            rows,
            fail_after,
            closed,
        } = self;
        let result = publish_all(columns, rows, fail_after, producer).await;
        closed.store(true, Ordering::SeqCst);
        result
    }
}

async fn publish_all(
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<RawValue>>,
    fail_after: Option<usize>,
    producer: &mut RowProducer,
) -> Result<(), Sql2CsvError> {
    producer.publish_header(columns).await?;
    for (i, row) in rows.into_iter().enumerate() {
        if fail_after == Some(i) {
            return Err(connection_reset());
        }
        producer.publish_row(row).await?;
    }
    match fail_after {
        Some(_) => Err(connection_reset()),
        None => Ok(()),
    }
}

fn connection_reset() -> Sql2CsvError {
    Sql2CsvError::Query {
        message: "connection reset".to_string(),
    }
}

/// Source whose decoding blows up after the header.
struct PanickingSource;

impl QuerySource for PanickingSource {
    async fn stream(self, _sql: &str, producer: &mut RowProducer) -> Result<(), Sql2CsvError> {
        producer
            .publish_header(vec![ColumnMeta {
                name: "ts".to_string(),
                type_name: "TIMESTAMP".to_string(),
            }])
            .await?;
        panic!("timestamp decoder overflowed");
    }
}

/// Writer that accepts `limit` bytes and then fails like a closed pipe.
struct BrokenPipe {
    written: Vec<u8>,
    limit: usize,
}

impl Write for BrokenPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written.len() >= self.limit {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        let n = buf.len().min(self.limit - self.written.len());
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn text(s: &str) -> RawValue {
    RawValue::Bytes(s.as_bytes().to_vec())
}

fn int_rows(n: i64) -> Vec<Vec<RawValue>> {
    (1..=n).map(|i| vec![RawValue::Int(i)]).collect()
}

async fn run(source: FakeSource, buffer: usize) -> (Result<PipelineSummary, Sql2CsvError>, String) {
    let mut out = Vec::new();
    let options = PipelineOptions {
        buffer,
        strictness: Strictness::Lenient,
    };
    let result = run_pipeline(source, "SELECT".to_string(), options, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

#[tokio::test]
async fn id_name_scenario_with_null() {
    let source = FakeSource::new(
        &[("id", "INT4"), ("name", "VARCHAR")],
        vec![
            vec![RawValue::Int(1), text("a")],
            vec![RawValue::Int(2), RawValue::Null],
        ],
    );

    let (result, output) = run(source, 100).await;
    let summary = result.unwrap();

    assert_eq!(output, "id,name\n1,a\n2,\n");
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.columns, 2);
}

#[tokio::test]
async fn wide_integer_scenario_is_exact() {
    let source = FakeSource::new(
        &[("n", "DECIMAL")],
        vec![vec![text("9223372036854775808")]],
    );

    let (result, output) = run(source, 100).await;
    result.unwrap();

    assert_eq!(output, "n\n9223372036854775808\n");
}

#[tokio::test]
async fn emits_header_plus_one_record_per_row() {
    let rows = (0..250)
        .map(|i| vec![RawValue::Int(i), text("x"), RawValue::Bool(i % 2 == 0)])
        .collect();
    let source = FakeSource::new(&[("a", "INT8"), ("b", "TEXT"), ("c", "BOOL")], rows);

    let (result, output) = run(source, 100).await;
    let summary = result.unwrap();

    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 251);
    assert_eq!(lines[0], "a,b,c");
    assert!(lines.iter().all(|l| l.split(',').count() == 3));
    assert_eq!(summary.rows, 250);
}

#[tokio::test]
async fn zero_rows_still_writes_header() {
    let source = FakeSource::new(&[("col1", "TEXT"), ("col2", "TEXT")], vec![]);

    let (result, output) = run(source, 100).await;
    let summary = result.unwrap();

    assert_eq!(output, "col1,col2\n");
    assert_eq!(summary.rows, 0);
}

#[tokio::test]
async fn order_is_preserved_under_backpressure() {
    let source = FakeSource::new(&[("id", "INT4")], int_rows(2_000));

    let (result, output) = run(source, 1).await;
    result.unwrap();

    let ids = output
        .lines()
        .skip(1)
        .map(|l| l.parse::<i64>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(ids, (1..=2_000).collect::<Vec<_>>());
}

#[tokio::test]
async fn rows_before_failure_are_delivered_then_error_reported() {
    let source = FakeSource::new(&[("id", "INT4")], int_rows(50)).failing_after(30);

    let (result, output) = run(source, 100).await;

    match result {
        Err(Sql2CsvError::Query { message }) => assert_eq!(message, "connection reset"),
        other => panic!("Expected Query error, got {other:?}"),
    }
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 31, "header plus the 30 rows published before the failure");
    assert_eq!(lines[30], "30");
}

#[tokio::test]
async fn failure_before_first_row_reports_query_error() {
    let source = FakeSource::new(&[("id", "INT4")], int_rows(5)).failing_after(0);

    let (result, output) = run(source, 100).await;

    assert!(matches!(result, Err(Sql2CsvError::Query { .. })));
    assert!(output.lines().nth(1).is_none(), "no data rows expected: {output:?}");
}

#[tokio::test]
async fn arity_mismatch_is_a_scan_error() {
    let source = FakeSource::new(
        &[("a", "INT4"), ("b", "INT4")],
        vec![
            vec![RawValue::Int(1), RawValue::Int(2)],
            vec![RawValue::Int(3)],
        ],
    );

    let (result, output) = run(source, 100).await;

    assert!(matches!(result, Err(Sql2CsvError::Scan { .. })), "got {result:?}");
    assert_eq!(output, "a,b\n1,2\n");
}

#[tokio::test]
async fn strict_mode_surfaces_normalization_failure() {
    let source = FakeSource::new(&[("n", "BIGINT")], vec![vec![text("12x")]]);
    let mut out = Vec::new();
    let options = PipelineOptions {
        buffer: 10,
        strictness: Strictness::Strict,
    };

    let result = run_pipeline(source, "SELECT".to_string(), options, &mut out).await;

    assert!(matches!(result, Err(Sql2CsvError::Normalization { .. })), "got {result:?}");
}

#[tokio::test]
async fn lenient_mode_degrades_malformed_integer_to_zero() {
    let source = FakeSource::new(&[("n", "BIGINT")], vec![vec![text("12x")]]);

    let (result, output) = run(source, 10).await;

    result.unwrap();
    assert_eq!(output, "n\n0\n");
}

#[tokio::test]
async fn write_failure_is_reported_without_hanging() {
    let source = FakeSource::new(&[("id", "INT4")], int_rows(100_000));
    let closed = source.closed.clone();
    let writer = BrokenPipe {
        written: Vec::new(),
        limit: 64,
    };
    let options = PipelineOptions {
        buffer: 4,
        strictness: Strictness::Lenient,
    };

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        run_pipeline(source, "SELECT".to_string(), options, writer),
    )
    .await
    .expect("pipeline hung after a write failure");

    assert!(matches!(result, Err(Sql2CsvError::Write { .. })), "got {result:?}");
    assert!(closed.load(Ordering::SeqCst), "producer should have finished before returning");
}

#[tokio::test]
async fn zero_buffer_is_rejected() {
    let source = FakeSource::new(&[("id", "INT4")], int_rows(1));
    let (result, _) = run(source, 0).await;
    assert!(matches!(result, Err(Sql2CsvError::Config { .. })));
}

#[tokio::test]
async fn fields_needing_quotes_are_escaped() {
    let source = FakeSource::new(
        &[("val", "TEXT")],
        vec![
            vec![text("hello, world")],
            vec![text("say \"hi\"")],
            vec![text("line1\nline2")],
            vec![text("null")],
        ],
    );

    let (result, output) = run(source, 100).await;
    result.unwrap();

    assert_eq!(
        output,
        "val\n\"hello, world\"\n\"say \"\"hi\"\"\"\n\"line1\nline2\"\nnull\n"
    );
}

#[tokio::test]
#[should_panic(expected = "timestamp decoder overflowed")]
async fn producer_panic_propagates_to_caller() {
    let mut out = Vec::new();
    let _ = run_pipeline(
        PanickingSource,
        "SELECT".to_string(),
        PipelineOptions::default(),
        &mut out,
    )
    .await;
}
