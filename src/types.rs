use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Label name holding the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Label set of a series, unique by name and ordered by name
pub type Metric = BTreeMap<String, String>;

/// A single value at a point in time
///
/// Timestamps are milliseconds since the Unix epoch, matching the remote-write
/// format. Samples returned by the query API are converted from its
/// `[<seconds>, "<value>"]` pair encoding.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "WirePair")]
pub struct Sample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Create a sample at a millisecond timestamp
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Create a sample at a point in time
    pub fn at(time: DateTime<Utc>, value: f64) -> Self {
        Self::new(time.timestamp_millis(), value)
    }
}

/// Time series to push through the distributor
///
/// # Example
///
/// ```rust
/// use cortex_e2e_client::TimeSeries;
///
/// let series = TimeSeries::new("series_1")
///     .with_label("job", "test")
///     .with_sample(1_600_000_000_000, 1.0);
///
/// assert_eq!(series.metric_name(), Some("series_1"));
/// assert_eq!(series.selector(), r#"series_1{job="test"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    /// Labels identifying the series, including `__name__`
    pub labels: Metric,
    /// Samples in push order
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Create a series with the given metric name and no samples
    pub fn new(metric_name: &str) -> Self {
        Self::default().with_label(METRIC_NAME_LABEL, metric_name)
    }

    /// Add a label, replacing any earlier value with the same name
    pub fn with_label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    /// Append a sample at a millisecond timestamp
    pub fn with_sample(mut self, timestamp: i64, value: f64) -> Self {
        self.samples.push(Sample::new(timestamp, value));
        self
    }

    /// Append a sample at a point in time
    pub fn with_sample_at(mut self, time: DateTime<Utc>, value: f64) -> Self {
        self.samples.push(Sample::at(time, value));
        self
    }

    /// Get the metric name label
    pub fn metric_name(&self) -> Option<&str> {
        self.labels.get(METRIC_NAME_LABEL).map(|s| s.as_str())
    }

    /// Selector matching exactly this series' labels
    pub fn selector(&self) -> String {
        let matchers: Vec<String> = self
            .labels
            .iter()
            .filter(|(name, _)| name.as_str() != METRIC_NAME_LABEL)
            .map(|(name, value)| format!("{name}={value:?}"))
            .collect();

        format!(
            "{}{{{}}}",
            self.metric_name().unwrap_or_default(),
            matchers.join(",")
        )
    }
}

/// Result of an instant or range query
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryResult {
    Scalar(Sample),
    Vector(Vec<VectorSample>),
    Matrix(Vec<SeriesSamples>),
    String(StringSample),
}

impl QueryResult {
    /// The `resultType` this value was decoded from
    pub fn result_type(&self) -> &'static str {
        match self {
            QueryResult::Scalar(_) => "scalar",
            QueryResult::Vector(_) => "vector",
            QueryResult::Matrix(_) => "matrix",
            QueryResult::String(_) => "string",
        }
    }
}

/// One element of an instant vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorSample {
    pub metric: Metric,
    #[serde(rename = "value")]
    pub sample: Sample,
}

/// One series of a range vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesSamples {
    pub metric: Metric,
    #[serde(rename = "values")]
    pub samples: Vec<Sample>,
}

/// A string value at a point in time
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WirePair")]
pub struct StringSample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: String,
}

#[derive(Deserialize)]
struct WirePair(f64, String);

fn seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

impl TryFrom<WirePair> for Sample {
    type Error = String;

    fn try_from(WirePair(seconds, value): WirePair) -> Result<Self, Self::Error> {
        let value = value
            .parse::<f64>()
            .map_err(|e| format!("invalid sample value {value:?}: {e}"))?;
        Ok(Sample::new(seconds_to_millis(seconds), value))
    }
}

impl From<WirePair> for StringSample {
    fn from(WirePair(seconds, value): WirePair) -> Self {
        StringSample {
            timestamp: seconds_to_millis(seconds),
            value,
        }
    }
}
