//! Windowed aggregation query engine
//!
//! Resolves matching series through the index, scans each through the
//! store, and buckets samples into half-open `[bucket_start,
//! bucket_start + step)` windows aligned to the query window start.
//! Buckets are materialized sparsely, so a query costs what the data it
//! touches costs, not what the window spans. Empty buckets produce no
//! output point; zero matching series is an empty result, not an error.
//! Long queries check the cancellation token at series boundaries.

use crate::index::{SeriesId, SeriesIndex};
use crate::schema::{LabelMatcher, TimeRange, TimestampMicros};
use crate::store::SampleStore;
use crate::{Error, Result};

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Supported aggregation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Avg,
    Max,
    Min,
    /// Per-series first-difference over consecutive non-empty buckets,
    /// per second, summed across matched series
    Rate,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
            Self::Rate => "rate",
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "avg" | "mean" => Ok(Self::Avg),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "rate" => Ok(Self::Rate),
            other => Err(Error::Validation(format!(
                "unknown aggregation '{}'; expected one of sum, avg, max, min, rate",
                other
            ))),
        }
    }
}

/// A windowed aggregation query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Exact metric name to match
    pub name: String,
    /// Label matchers, all of which must hold
    pub matchers: Vec<LabelMatcher>,
    /// Half-open query window
    pub range: TimeRange,
    pub aggregation: Aggregation,
    /// Bucket width in microseconds
    pub step: i64,
}

impl QueryRequest {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("query name cannot be empty".to_string()));
        }
        if self.step <= 0 {
            return Err(Error::Validation(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        if self.range.is_empty() {
            return Err(Error::Validation(format!(
                "query range [{}, {}) is empty",
                self.range.start, self.range.end
            )));
        }
        if self.range.end.checked_sub(self.range.start).is_none() {
            return Err(Error::Validation(format!(
                "query range [{}, {}) is too wide",
                self.range.start, self.range.end
            )));
        }
        Ok(())
    }
}

/// One output point: bucket start timestamp plus the aggregated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPoint {
    pub timestamp: TimestampMicros,
    pub value: f64,
}

/// Read-side engine over the index and store.
pub struct QueryEngine {
    index: Arc<SeriesIndex>,
    store: Arc<SampleStore>,
}

/// Per-bucket accumulator across all matched series.
#[derive(Clone, Copy)]
struct Bucket {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl Bucket {
    fn first(value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

impl QueryEngine {
    pub fn new(index: Arc<SeriesIndex>, store: Arc<SampleStore>) -> Self {
        Self { index, store }
    }

    /// Run a query. Errors abort the whole query: a partial aggregate would
    /// be silently misleading.
    pub fn query(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<Vec<QueryPoint>> {
        request.validate()?;

        let series = self.index.lookup(&request.name, &request.matchers);
        debug!(
            name = %request.name,
            series = series.len(),
            aggregation = request.aggregation.as_str(),
            "Executing query"
        );
        if series.is_empty() {
            return Ok(Vec::new());
        }

        match request.aggregation {
            Aggregation::Rate => self.rate(request, &series, cancel),
            _ => self.combine(request, &series, cancel),
        }
    }

    fn combine(
        &self,
        request: &QueryRequest,
        series: &[SeriesId],
        cancel: &CancellationToken,
    ) -> Result<Vec<QueryPoint>> {
        // Sparse: only buckets that hold data are materialized.
        let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();

        for &id in series {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            for sample in self.store.scan(id, request.range) {
                let bucket = bucket_index(request, sample.timestamp);
                buckets
                    .entry(bucket)
                    .and_modify(|b| b.observe(sample.value))
                    .or_insert_with(|| Bucket::first(sample.value));
            }
        }

        let points = buckets
            .into_iter()
            .map(|(bucket, b)| QueryPoint {
                timestamp: bucket_start(request, bucket),
                value: match request.aggregation {
                    Aggregation::Sum => b.sum,
                    Aggregation::Avg => b.sum / b.count as f64,
                    Aggregation::Max => b.max,
                    Aggregation::Min => b.min,
                    Aggregation::Rate => unreachable!("rate handled separately"),
                },
            })
            .collect();
        Ok(points)
    }

    fn rate(
        &self,
        request: &QueryRequest,
        series: &[SeriesId],
        cancel: &CancellationToken,
    ) -> Result<Vec<QueryPoint>> {
        // Sum of per-series rates per non-empty bucket
        let mut rates: BTreeMap<i64, f64> = BTreeMap::new();

        for &id in series {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            // Last value per bucket for this series
            let mut last_in_bucket: BTreeMap<i64, f64> = BTreeMap::new();
            let mut samples_in_window = 0usize;
            for sample in self.store.scan(id, request.range) {
                samples_in_window += 1;
                last_in_bucket.insert(bucket_index(request, sample.timestamp), sample.value);
            }
            // Fewer than two samples in the window yields no rate points.
            if samples_in_window < 2 {
                continue;
            }

            let mut prev: Option<(i64, f64)> = None;
            for (bucket, value) in last_in_bucket {
                if let Some((prev_bucket, prev_value)) = prev {
                    let elapsed_seconds =
                        ((bucket - prev_bucket) * request.step) as f64 / MICROS_PER_SECOND;
                    *rates.entry(bucket).or_insert(0.0) += (value - prev_value) / elapsed_seconds;
                }
                prev = Some((bucket, value));
            }
        }

        let points = rates
            .into_iter()
            .map(|(bucket, value)| QueryPoint {
                timestamp: bucket_start(request, bucket),
                value,
            })
            .collect();
        Ok(points)
    }
}

/// Half-open bucket assignment: a sample exactly on a boundary belongs to
/// the bucket it opens. Scanned timestamps are inside the validated range,
/// so the subtraction cannot overflow.
fn bucket_index(request: &QueryRequest, timestamp: TimestampMicros) -> i64 {
    (timestamp - request.range.start) / request.step
}

fn bucket_start(request: &QueryRequest, bucket: i64) -> TimestampMicros {
    request.range.start + bucket * request.step
}
