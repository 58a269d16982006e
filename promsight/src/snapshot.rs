//! The data model produced by parsing and classification.
//!
//! A [`Snapshot`] is the single current-value view of one exposition text. It
//! holds [`Sample`]s partitioned into three buckets, plus whatever `# HELP`
//! and `# TYPE` metadata the text declared. Nothing here is mutated once
//! built.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Label pairs of a sample, keyed by label name.
///
/// Keys are unique. When an exposition line repeats a key the last value
/// wins.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Prometheus metric types
pub enum MetricType {
    /// A gauge is a metric that represents a single numerical value that can arbitrarily go up and down
    Gauge,
    /// A counter is a cumulative metric that represents a single monotonically increasing counter
    Counter,
    /// A histogram samples observations and counts them in configurable buckets
    Histogram,
    /// A summary samples observations
    Summary,
    /// An untyped metric for compatibility with systems that don't have typed metrics
    Untyped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric type: {0}")]
/// A `# TYPE` line named a type outside the exposition format.
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetricType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "histogram" => Ok(Self::Histogram),
            "summary" => Ok(Self::Summary),
            "untyped" => Ok(Self::Untyped),
            _ => Err(UnknownMetricType(s.to_string())),
        }
    }
}

impl MetricType {
    /// Whether this type is exposed as `_sum`/`_count` (and maybe `_bucket`)
    /// series under the family name.
    #[must_use]
    pub fn is_compound(self) -> bool {
        matches!(self, Self::Histogram | Self::Summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// One measurement: a metric name, its labels and the current value.
pub struct Sample {
    /// The metric name
    pub name: String,
    /// The metric labels
    pub labels: Labels,
    /// The metric value
    pub value: f64,
}

impl Sample {
    /// Look up the value of `label` on this sample.
    #[must_use]
    pub fn label(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Metadata declared for a metric family by `# HELP` and `# TYPE` lines.
pub struct Family {
    /// Declared type, if any
    pub metric_type: Option<MetricType>,
    /// Declared help text, if any
    pub help: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// The classification buckets of a [`Snapshot`].
pub enum Bucket {
    /// Application defined metrics
    Custom,
    /// Request and duration metrics of the serving process
    ServerRequest,
    /// Runtime and process metrics
    Runtime,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Custom => "custom",
            Self::ServerRequest => "server_request",
            Self::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
/// Classified samples of a single exposition text
///
/// Each bucket preserves the order samples appeared in the source text.
pub struct Snapshot {
    /// Samples in the [`Bucket::Custom`] bucket
    pub custom: Vec<Sample>,
    /// Samples in the [`Bucket::ServerRequest`] bucket
    pub server_request: Vec<Sample>,
    /// Samples in the [`Bucket::Runtime`] bucket
    pub runtime: Vec<Sample>,
    /// Family metadata keyed by family name
    pub families: BTreeMap<String, Family>,
}

impl Snapshot {
    /// The samples routed to `bucket`.
    #[must_use]
    pub fn bucket(&self, bucket: Bucket) -> &[Sample] {
        match bucket {
            Bucket::Custom => &self.custom,
            Bucket::ServerRequest => &self.server_request,
            Bucket::Runtime => &self.runtime,
        }
    }

    /// Total number of samples across every bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.custom.len() + self.server_request.len() + self.runtime.len()
    }

    /// True when no bucket holds a sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every sample, bucket by bucket.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.custom
            .iter()
            .chain(self.server_request.iter())
            .chain(self.runtime.iter())
    }

    /// Metadata for the family that `name` belongs to.
    ///
    /// A histogram or summary declares its `_sum`, `_count` and `_bucket`
    /// series under the base name, so those suffixes resolve to the base
    /// family when it is compound.
    #[must_use]
    pub fn family(&self, name: &str) -> Option<&Family> {
        if let Some(family) = self.families.get(name) {
            return Some(family);
        }
        ["_sum", "_count", "_bucket"]
            .iter()
            .filter_map(|suffix| name.strip_suffix(suffix))
            .filter_map(|base| self.families.get(base))
            .find(|family| family.metric_type.is_some_and(MetricType::is_compound))
    }
}
