//! Route samples into [`Snapshot`] buckets by metric name prefix.
//!
//! Routing is a decision table: an ordered list of [`Rule`]s evaluated top to
//! bottom, the first rule whose prefix matches deciding the bucket. Samples no
//! rule matches are left out of the snapshot on purpose.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    parser::Exposition,
    snapshot::{Bucket, Sample, Snapshot},
};

/// Errors produced when validating a rule table
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A rule with an empty prefix matches every name.
    #[error("rule {index} has an empty prefix")]
    EmptyPrefix {
        /// Position of the offending rule
        index: usize,
    },
    /// An earlier rule's prefix covers every name this rule could match.
    #[error("rule for prefix {prefix:?} is shadowed by earlier prefix {by:?}")]
    Shadowed {
        /// The unreachable rule's prefix
        prefix: String,
        /// The earlier prefix that wins instead
        by: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Route every metric whose name starts with `prefix` into `bucket`.
pub struct Rule {
    /// Metric name prefix
    pub prefix: String,
    /// Destination bucket
    pub bucket: Bucket,
}

impl Rule {
    /// Create a new [`Rule`]
    #[must_use]
    pub fn new(prefix: impl Into<String>, bucket: Bucket) -> Self {
        Self {
            prefix: prefix.into(),
            bucket,
        }
    }
}

/// The built-in rule table, most specific prefix first.
#[must_use]
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("mw_", Bucket::Custom),
        Rule::new("http_request", Bucket::ServerRequest),
        Rule::new("nodejs_", Bucket::Runtime),
        Rule::new("process_", Bucket::Runtime),
    ]
}

/// Check that every rule in `rules` can match some name.
///
/// # Errors
///
/// Returns an error if a prefix is empty or if an earlier rule's prefix is a
/// prefix of a later rule's, since first match wins.
pub fn validate_rules(rules: &[Rule]) -> Result<(), Error> {
    for (index, rule) in rules.iter().enumerate() {
        if rule.prefix.is_empty() {
            return Err(Error::EmptyPrefix { index });
        }
        if let Some(earlier) = rules[..index]
            .iter()
            .find(|earlier| rule.prefix.starts_with(&earlier.prefix))
        {
            return Err(Error::Shadowed {
                prefix: rule.prefix.clone(),
                by: earlier.prefix.clone(),
            });
        }
    }
    Ok(())
}

/// Partitions samples into buckets with a fixed rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    /// Create a new [`Classifier`] evaluating `rules` in order.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rule table, in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The bucket `name` routes to, if any rule matches.
    #[must_use]
    pub fn bucket_of(&self, name: &str) -> Option<Bucket> {
        self.rules
            .iter()
            .find(|rule| name.starts_with(rule.prefix.as_str()))
            .map(|rule| rule.bucket)
    }

    /// Partition `samples` into a [`Snapshot`], preserving their order within
    /// each bucket.
    #[must_use]
    pub fn classify(&self, samples: impl IntoIterator<Item = Sample>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let mut unclassified = 0_usize;

        for sample in samples {
            match self.bucket_of(&sample.name) {
                Some(Bucket::Custom) => snapshot.custom.push(sample),
                Some(Bucket::ServerRequest) => snapshot.server_request.push(sample),
                Some(Bucket::Runtime) => snapshot.runtime.push(sample),
                None => unclassified += 1,
            }
        }

        debug!(
            custom = snapshot.custom.len(),
            server_request = snapshot.server_request.len(),
            runtime = snapshot.runtime.len(),
            unclassified,
            "classified samples"
        );
        snapshot
    }

    /// Classify the samples of `exposition`, carrying its family metadata
    /// into the snapshot.
    #[must_use]
    pub fn classify_exposition(&self, exposition: Exposition) -> Snapshot {
        let mut snapshot = self.classify(exposition.samples);
        snapshot.families = exposition.families.into_iter().collect();
        snapshot
    }
}
