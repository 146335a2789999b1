use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use csv::ReaderBuilder;
use geohash::Coord;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// How each known CSV column maps onto a time-series point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Tag,
    Field,
    Timestamp,
}

/// Numeric representation of a field column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
}

/// Static header-to-kind table. Columns not listed here are ignored.
static COLUMN_KINDS: Lazy<HashMap<&'static str, ColumnKind>> = Lazy::new(|| {
    HashMap::from([
        ("name", ColumnKind::Tag),
        ("country", ColumnKind::Tag),
        ("level", ColumnKind::Tag),
        ("county", ColumnKind::Tag),
        ("population", ColumnKind::Field),
        ("lat", ColumnKind::Field),
        ("long", ColumnKind::Field),
        ("cases", ColumnKind::Field),
        ("deaths", ColumnKind::Field),
        ("recovered", ColumnKind::Field),
        ("active", ColumnKind::Field),
        ("date", ColumnKind::Timestamp),
    ])
});

/// Static field-to-type table for the columns classified as fields.
static FIELD_KINDS: Lazy<HashMap<&'static str, FieldKind>> = Lazy::new(|| {
    HashMap::from([
        ("population", FieldKind::Int),
        ("lat", FieldKind::Float),
        ("long", FieldKind::Float),
        ("cases", FieldKind::Int),
        ("deaths", FieldKind::Int),
        ("recovered", FieldKind::Int),
        ("active", FieldKind::Int),
    ])
});

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Geohash length produced for the derived tag. Matches the default
/// precision of the library the upstream dataset tooling uses.
pub const GEOHASH_PRECISION: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

/// One parsed CSV row, ready to be written as a time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for parsed points. The production implementation talks to
/// InfluxDB; tests record the calls.
#[async_trait]
pub trait MeasurementSink {
    async fn drop_measurement(&mut self) -> Result<()>;
    async fn write_batch(&mut self, points: Vec<Point>) -> Result<()>;
}

/// Streaming loader: classifies each row through the static tables,
/// accumulates points and flushes them to the sink in fixed-size batches.
///
/// The measurement is dropped once, immediately before the first flush of a
/// load, so the freshly parsed snapshot fully replaces the previous dataset.
/// Any trailing partial batch is flushed at end of input.
pub struct RowLoader<'a, S: MeasurementSink> {
    sink: &'a mut S,
    batch_size: usize,
    pending: Vec<Point>,
    dropped: bool,
    total_rows: u64,
    batches_written: u64,
}

impl<'a, S: MeasurementSink> RowLoader<'a, S> {
    pub fn new(sink: &'a mut S, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            dropped: false,
            total_rows: 0,
            batches_written: 0,
        }
    }

    /// Parse the whole CSV stream and write it out. Returns
    /// `(rows loaded, batches written)`.
    ///
    /// A CSV structural error (anything other than clean end-of-input) is
    /// returned as an error; the caller treats it as fatal.
    pub async fn load<R: Read>(mut self, reader: R) -> Result<(u64, u64)> {
        let mut rdr = ReaderBuilder::new().from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("reading CSV header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        debug!(columns = headers.len(), "parsed header row");

        for (idx, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("CSV read error at record {}", idx))?;
            let point = point_from_record(&headers, record.iter());
            self.pending.push(point);
            self.total_rows += 1;
            if self.pending.len() >= self.batch_size {
                self.flush().await?;
            }
        }

        // remaining partial batch lands too; the snapshot replaces the old
        // dataset wholesale
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        Ok((self.total_rows, self.batches_written))
    }

    async fn flush(&mut self) -> Result<()> {
        if !self.dropped {
            self.sink
                .drop_measurement()
                .await
                .context("clearing measurement before first batch")?;
            self.dropped = true;
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let size = batch.len();
        self.sink.write_batch(batch).await.context("writing batch")?;
        self.batches_written += 1;
        debug!(batch = self.batches_written, rows = size, "flushed batch");
        Ok(())
    }
}

/// Build one point from a CSV record. Malformed values coerce to their
/// zero-values rather than failing: empty or non-numeric fields become 0,
/// an unparseable date becomes the Unix epoch.
fn point_from_record<'r>(
    headers: &[String],
    values: impl Iterator<Item = &'r str>,
) -> Point {
    let mut tags = Vec::new();
    let mut fields = Vec::new();
    let mut timestamp = DateTime::<Utc>::UNIX_EPOCH;
    let mut lat = 0.0_f64;
    let mut long = 0.0_f64;

    for (header, value) in headers.iter().zip(values) {
        match COLUMN_KINDS.get(header.as_str()) {
            Some(ColumnKind::Tag) => tags.push((header.clone(), value.to_string())),
            Some(ColumnKind::Field) => match FIELD_KINDS.get(header.as_str()) {
                Some(FieldKind::Int) => {
                    fields.push((header.clone(), FieldValue::Int(parse_int(value))));
                }
                Some(FieldKind::Float) => {
                    let v = parse_float(value);
                    match header.as_str() {
                        "lat" => lat = v,
                        "long" => long = v,
                        _ => {}
                    }
                    fields.push((header.clone(), FieldValue::Float(v)));
                }
                None => {}
            },
            Some(ColumnKind::Timestamp) => timestamp = parse_date(value),
            // unrecognized column
            None => {}
        }
    }

    tags.push(("geohash".to_string(), encode_geohash(lat, long)));
    Point {
        tags,
        fields,
        timestamp,
    }
}

fn parse_int(value: &str) -> i64 {
    if value.is_empty() {
        return 0;
    }
    value.parse().unwrap_or(0)
}

fn parse_float(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    value.parse().unwrap_or(0.0)
}

fn parse_date(value: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn encode_geohash(lat: f64, long: f64) -> String {
    match geohash::encode(Coord { x: long, y: lat }, GEOHASH_PRECISION) {
        Ok(hash) => hash,
        Err(err) => {
            // out-of-range coordinates; fall back to the zero-value hash
            warn!(lat, long, error = %err, "geohash encode failed");
            geohash::encode(Coord { x: 0.0, y: 0.0 }, GEOHASH_PRECISION)
                .unwrap_or_default()
        }
    }
}
