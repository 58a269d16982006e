//! Turn Prometheus text exposition into queryable, classified data.
//!
//! The pipeline is three pure stages. [`parser`] folds raw text into samples
//! and family metadata, [`classify`] routes samples into the buckets of a
//! [`Snapshot`] by name prefix, and [`aggregate`] derives sums, averages,
//! rankings and rollups from those buckets. No stage fails, blocks or keeps
//! state between calls; retrieving the text is the caller's business.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod overview;
pub mod parser;
pub mod snapshot;

pub use crate::{
    classify::Classifier,
    overview::Overview,
    snapshot::{Bucket, Family, Labels, MetricType, Sample, Snapshot},
};

/// Parse `text` and classify it with the built-in rule table.
///
/// Never fails: malformed lines are dropped and empty input yields an empty
/// [`Snapshot`].
#[must_use]
pub fn parse(text: &str) -> Snapshot {
    parse_with(text, &Classifier::default())
}

/// Parse `text` and classify it with `classifier`.
#[must_use]
pub fn parse_with(text: &str, classifier: &Classifier) -> Snapshot {
    classifier.classify_exposition(parser::parse_text(text))
}
