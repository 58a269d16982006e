//! Derived views over classified samples.
//!
//! Every function here is pure: it reads a slice of samples, usually one
//! bucket of a [`crate::Snapshot`], and returns a freshly built value.
//! Nothing is cached between calls.
//!
//! Divisions go through [`ratio`], which yields `0.0` for a zero
//! denominator. A provider that has seen no traffic therefore has a failure
//! rate of `0`, and a route with no observations an average of `0`.

use std::{cmp::Ordering, fmt, str::FromStr};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::snapshot::{Labels, Sample};

/// Rankings keep this many entries unless told otherwise.
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
/// Outcome recorded in a status label
pub enum Status {
    /// The request succeeded
    Success,
    /// The request failed
    Failed,
    /// The requested item was not found
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
/// A status label value outside `success`, `failed` and `notfound`.
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "notfound" => Ok(Self::NotFound),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NotFound => "notfound",
        };
        f.write_str(name)
    }
}

/// Divide `numerator` by `denominator`, yielding `0.0` when the denominator
/// is zero.
#[must_use]
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
/// Summed values per status. Every status is present, absent ones are `0`.
pub struct StatusCounts {
    /// Sum of `success` samples
    pub success: f64,
    /// Sum of `failed` samples
    pub failed: f64,
    /// Sum of `notfound` samples
    pub notfound: f64,
}

impl StatusCounts {
    /// A copy of these counts with `value` added under `status`.
    #[must_use]
    pub fn add(mut self, status: Status, value: f64) -> Self {
        match status {
            Status::Success => self.success += value,
            Status::Failed => self.failed += value,
            Status::NotFound => self.notfound += value,
        }
        self
    }

    /// The count recorded for `status`.
    #[must_use]
    pub fn get(&self, status: Status) -> f64 {
        match status {
            Status::Success => self.success,
            Status::Failed => self.failed,
            Status::NotFound => self.notfound,
        }
    }

    /// `success + failed + notfound`
    #[must_use]
    pub fn total(&self) -> f64 {
        self.success + self.failed + self.notfound
    }

    /// Percentage of the total that failed, `0` when the total is zero.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failed, self.total()) * 100.0
    }

    /// Percentage of the total that succeeded, `0` when the total is zero.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.success, self.total()) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Status counts for one value of the grouping label
pub struct StatusGroup {
    /// The grouping label's value, e.g. a provider id
    pub key: String,
    /// Summed values per status
    pub counts: StatusCounts,
}

impl StatusGroup {
    /// See [`StatusCounts::failure_rate`].
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.counts.failure_rate()
    }
}

/// Sum the samples named `name` per value of `group_label`, split by the
/// [`Status`] found in `status_label`.
///
/// Groups come back in order of first appearance. Samples without the
/// grouping label are ignored; samples whose status is missing or unknown
/// still open their group but add nothing to it.
#[must_use]
pub fn group_status_by_label(
    samples: &[Sample],
    name: &str,
    group_label: &str,
    status_label: &str,
) -> Vec<StatusGroup> {
    let (groups, _) = samples
        .iter()
        .filter(|sample| sample.name == name)
        .filter_map(|sample| {
            let key = sample.label(group_label)?;
            let status = sample
                .label(status_label)
                .and_then(|status| status.parse::<Status>().ok());
            Some((key, status, sample.value))
        })
        .fold(
            (Vec::<StatusGroup>::new(), FxHashMap::<&str, usize>::default()),
            |(mut groups, mut index), (key, status, value)| {
                let slot = *index.entry(key).or_insert_with(|| {
                    groups.push(StatusGroup {
                        key: key.to_string(),
                        counts: StatusCounts::default(),
                    });
                    groups.len() - 1
                });
                if let Some(status) = status {
                    groups[slot].counts = groups[slot].counts.add(status, value);
                }
                (groups, index)
            },
        );
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// The average of a `<base>_sum` / `<base>_count` pair sharing one label set
pub struct Average {
    /// The shared label set
    pub labels: Labels,
    /// Value of the `_sum` series
    pub sum: f64,
    /// Value of the `_count` series, `0` when absent
    pub count: f64,
    /// `sum / count`, `0` when the count is zero
    pub average: f64,
}

impl Average {
    /// The average scaled from seconds to milliseconds.
    #[must_use]
    pub fn millis(&self) -> f64 {
        self.average * 1000.0
    }

    /// The values of `keys` in these labels joined by a space, e.g.
    /// `GET /a` for `["method", "route"]`.
    #[must_use]
    pub fn key<S: AsRef<str>>(&self, keys: &[S]) -> String {
        label_key(&self.labels, keys)
    }
}

/// Join the values of `keys` in `labels` by a space. Missing labels
/// contribute an empty string.
#[must_use]
pub fn label_key<S: AsRef<str>>(labels: &Labels, keys: &[S]) -> String {
    keys.iter()
        .map(|key| labels.get(key.as_ref()).map_or("", String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pair every `<base>_sum` sample with the `<base>_count` sample carrying the
/// same labels and compute their average.
///
/// Results follow the order of the `_sum` samples; a repeated label set keeps
/// its first occurrence.
#[must_use]
pub fn averages(samples: &[Sample], base: &str) -> Vec<Average> {
    let sum_name = format!("{base}_sum");
    let count_name = format!("{base}_count");

    let mut counts: FxHashMap<&Labels, f64> = FxHashMap::default();
    for sample in samples.iter().filter(|s| s.name == count_name) {
        counts.entry(&sample.labels).or_insert(sample.value);
    }

    let mut seen: FxHashSet<&Labels> = FxHashSet::default();
    samples
        .iter()
        .filter(|s| s.name == sum_name)
        .filter(|s| seen.insert(&s.labels))
        .map(|s| {
            let count = counts.get(&s.labels).copied().unwrap_or(0.0);
            Average {
                labels: s.labels.clone(),
                sum: s.value,
                count,
                average: ratio(s.value, count),
            }
        })
        .collect()
}

/// Order for ranking: larger first, NaN after every number.
fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Sort `items` descending by `key` and keep the first `n`.
///
/// The sort is stable, tied items keep their relative order.
#[must_use]
pub fn top_n<T, F>(mut items: Vec<T>, n: usize, key: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    items.sort_by(|a, b| descending(key(a), key(b)));
    items.truncate(n);
    items
}

/// The `n` groups with the highest failure rate.
#[must_use]
pub fn failure_ranking(groups: &[StatusGroup], n: usize) -> Vec<StatusGroup> {
    top_n(groups.to_vec(), n, StatusGroup::failure_rate)
}

/// The `n` label sets with the highest average.
#[must_use]
pub fn slowest(averages: &[Average], n: usize) -> Vec<Average> {
    top_n(averages.to_vec(), n, |avg| avg.average)
}

/// The `n` label sets with the highest count.
#[must_use]
pub fn busiest(averages: &[Average], n: usize) -> Vec<Average> {
    top_n(averages.to_vec(), n, |avg| avg.count)
}

/// Sum of the values of every sample named `name`.
#[must_use]
pub fn total(samples: &[Sample], name: &str) -> f64 {
    samples
        .iter()
        .filter(|s| s.name == name)
        .map(|s| s.value)
        .sum()
}

/// Number of distinct values `label` takes across `samples`.
#[must_use]
pub fn distinct_label_values(samples: &[Sample], label: &str) -> usize {
    samples
        .iter()
        .filter_map(|s| s.label(label))
        .collect::<FxHashSet<_>>()
        .len()
}

/// Value of the first sample named `name`, if any.
#[must_use]
pub fn find_value(samples: &[Sample], name: &str) -> Option<f64> {
    samples.iter().find(|s| s.name == name).map(|s| s.value)
}

/// Value of the first sample named `name`, `0` when there is none.
#[must_use]
pub fn value_of(samples: &[Sample], name: &str) -> f64 {
    find_value(samples, name).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_text;
    use proptest::prelude::*;

    fn status_sample(provider: &str, status: &str, value: f64) -> Sample {
        Sample {
            name: "mw_provider_status_count".to_string(),
            labels: [("provider_id", provider), ("status", status)]
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            value,
        }
    }

    #[test]
    fn group_sum_is_dense_over_statuses() {
        let samples = parse_text(
            "mw_provider_status_count{provider_id=\"p1\",status=\"success\"} 10\n\
             mw_provider_status_count{provider_id=\"p1\",status=\"failed\"} 2\n",
        )
        .samples;

        let groups =
            group_status_by_label(&samples, "mw_provider_status_count", "provider_id", "status");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "p1");
        assert_eq!(
            groups[0].counts,
            StatusCounts {
                success: 10.0,
                failed: 2.0,
                notfound: 0.0,
            }
        );
        let rate = groups[0].failure_rate();
        assert!((rate - 16.666_666).abs() < 1e-3, "rate was {rate}");
    }

    #[test]
    fn group_sum_accumulates_and_ignores_unrelated_samples() {
        let samples = vec![
            status_sample("p2", "notfound", 1.0),
            status_sample("p1", "success", 4.0),
            status_sample("p2", "notfound", 2.0),
            status_sample("p1", "teapot", 99.0),
            Sample {
                name: "mw_other".to_string(),
                labels: Labels::new(),
                value: 5.0,
            },
        ];

        let groups =
            group_status_by_label(&samples, "mw_provider_status_count", "provider_id", "status");
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["p2", "p1"]);
        assert_eq!(groups[0].counts.get(Status::NotFound), 3.0);
        assert_eq!(groups[1].counts.total(), 4.0);
    }

    #[test]
    fn zero_denominator_yields_zero() {
        let counts = StatusCounts::default();
        assert_eq!(counts.failure_rate(), 0.0);
        assert_eq!(counts.success_rate(), 0.0);
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(0.0, 0.0), 0.0);
    }

    #[test]
    fn averages_from_sum_and_count() {
        let samples = parse_text(
            "http_request_duration_seconds_sum{method=\"GET\",route=\"/a\"} 5\n\
             http_request_duration_seconds_count{method=\"GET\",route=\"/a\"} 2\n\
             http_request_duration_seconds_sum{method=\"POST\",route=\"/b\"} 3\n",
        )
        .samples;

        let avgs = averages(&samples, "http_request_duration_seconds");
        assert_eq!(avgs.len(), 2);
        assert_eq!(avgs[0].key(&["method", "route"]), "GET /a");
        assert_eq!(avgs[0].average, 2.5);
        assert_eq!(avgs[0].millis(), 2500.0);
        // No `_count` for POST /b.
        assert_eq!(avgs[1].count, 0.0);
        assert_eq!(avgs[1].average, 0.0);
    }

    #[test]
    fn top_n_is_stable_and_truncates() {
        let items = vec![("a", 1.0), ("b", 3.0), ("c", 1.0), ("d", f64::NAN), ("e", 3.0)];
        let ranked = top_n(items, 4, |item| item.1);
        let names: Vec<&str> = ranked.iter().map(|item| item.0).collect();
        assert_eq!(names, vec!["b", "e", "a", "c"]);

        let empty: Vec<f64> = top_n(Vec::new(), DEFAULT_TOP_N, |v: &f64| *v);
        assert!(empty.is_empty());
    }

    #[test]
    fn rankings() {
        let groups = vec![
            StatusGroup {
                key: "quiet".to_string(),
                counts: StatusCounts::default(),
            },
            StatusGroup {
                key: "flaky".to_string(),
                counts: StatusCounts {
                    success: 1.0,
                    failed: 1.0,
                    notfound: 0.0,
                },
            },
        ];
        let ranked = failure_ranking(&groups, DEFAULT_TOP_N);
        assert_eq!(ranked[0].key, "flaky");
        assert_eq!(ranked[1].key, "quiet");

        let avgs = averages(
            &parse_text(
                "d_sum{route=\"/fast\"} 1\nd_count{route=\"/fast\"} 10\n\
                 d_sum{route=\"/slow\"} 9\nd_count{route=\"/slow\"} 3\n",
            )
            .samples,
            "d",
        );
        assert_eq!(slowest(&avgs, 1)[0].key(&["route"]), "/slow");
        assert_eq!(busiest(&avgs, 1)[0].key(&["route"]), "/fast");
    }

    #[test]
    fn scalar_rollups() {
        let samples = vec![
            status_sample("p1", "success", 10.0),
            status_sample("p2", "failed", 2.0),
            status_sample("p1", "failed", 1.0),
        ];
        assert_eq!(total(&samples, "mw_provider_status_count"), 13.0);
        assert_eq!(distinct_label_values(&samples, "provider_id"), 2);
        assert_eq!(value_of(&samples, "mw_provider_status_count"), 10.0);
        assert_eq!(find_value(&samples, "absent"), None);
        assert_eq!(value_of(&samples, "absent"), 0.0);
    }

    #[test]
    fn rollups_over_nothing_are_zero() {
        let empty: Vec<Sample> = Vec::new();
        assert_eq!(total(&empty, "anything"), 0.0);
        assert_eq!(distinct_label_values(&empty, "route"), 0);
        assert_eq!(value_of(&empty, "anything"), 0.0);
        assert!(averages(&empty, "anything").is_empty());
        assert!(group_status_by_label(&empty, "a", "b", "c").is_empty());
    }

    #[test]
    fn label_key_missing_labels() {
        let labels: Labels = [("method".to_string(), "GET".to_string())]
            .into_iter()
            .collect();
        assert_eq!(label_key(&labels, &["method", "route"]), "GET ");
    }

    proptest! {
        #[test]
        fn prop_group_sum_conserves_totals(
            entries in prop::collection::vec(
                (0..4_usize, 0..3_usize, 0..1_000_u32),
                0..64,
            ),
        ) {
            let statuses = ["success", "failed", "notfound"];
            let samples: Vec<Sample> = entries
                .iter()
                .map(|(p, s, v)| status_sample(&format!("p{p}"), statuses[*s], f64::from(*v)))
                .collect();

            let groups = group_status_by_label(
                &samples,
                "mw_provider_status_count",
                "provider_id",
                "status",
            );
            for group in &groups {
                let direct: f64 = samples
                    .iter()
                    .filter(|s| s.label("provider_id") == Some(group.key.as_str()))
                    .map(|s| s.value)
                    .sum();
                prop_assert_eq!(group.counts.total(), direct);
            }
            let grouped: f64 = groups.iter().map(|g| g.counts.total()).sum();
            prop_assert_eq!(grouped, total(&samples, "mw_provider_status_count"));
        }

        #[test]
        fn prop_failure_rate_is_defined(
            success in 0..1_000_u32,
            failed in 0..1_000_u32,
            notfound in 0..1_000_u32,
        ) {
            let counts = StatusCounts {
                success: f64::from(success),
                failed: f64::from(failed),
                notfound: f64::from(notfound),
            };
            let rate = counts.failure_rate();
            prop_assert!(rate.is_finite());
            prop_assert!((0.0..=100.0).contains(&rate));
        }

        #[test]
        fn prop_top_n_ties_keep_input_order(
            keys in prop::collection::vec(0..4_u8, 0..32),
            n in 0..40_usize,
        ) {
            let items: Vec<(usize, f64)> = keys
                .iter()
                .enumerate()
                .map(|(idx, key)| (idx, f64::from(*key)))
                .collect();
            let ranked = top_n(items, n, |item| item.1);

            prop_assert!(ranked.len() <= n);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].1 >= pair[1].1);
                if pair[0].1 == pair[1].1 {
                    prop_assert!(pair[0].0 < pair[1].0);
                }
            }
        }
    }
}
