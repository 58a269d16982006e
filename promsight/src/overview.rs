//! A composite view of one [`Snapshot`], the shape handed to a dashboard.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::{
    aggregate::{self, Average, StatusCounts, StatusGroup},
    config::Views,
    snapshot::Snapshot,
};

const RESIDENT_MEMORY: &str = "process_resident_memory_bytes";
const CPU_SECONDS: &str = "process_cpu_seconds_total";
const EVENTLOOP_LAG: &str = "nodejs_eventloop_lag_seconds";
const HEAP_USED: &str = "nodejs_heap_size_used_bytes";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// Number of samples per bucket
pub struct BucketSizes {
    /// Custom bucket size
    pub custom: usize,
    /// Server request bucket size
    pub server_request: usize,
    /// Runtime bucket size
    pub runtime: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Status counts and failure rate of one provider
pub struct ProviderStatus {
    /// Value of the grouping label
    pub provider: String,
    /// Summed values per status
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Failed share of the total, in percent
    pub failure_rate: f64,
}

impl From<StatusGroup> for ProviderStatus {
    fn from(group: StatusGroup) -> Self {
        Self {
            failure_rate: group.failure_rate(),
            provider: group.key,
            counts: group.counts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Request count and mean response time of one route
pub struct RouteTiming {
    /// Route labels joined by a space, e.g. `GET /a`
    pub route: String,
    /// Observed requests
    pub requests: f64,
    /// Mean response time in milliseconds
    pub average_ms: f64,
}

impl RouteTiming {
    fn new(average: &Average, route_labels: &[String]) -> Self {
        Self {
            route: average.key(route_labels),
            requests: average.count,
            average_ms: average.millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
/// Process and runtime gauges, `0` when the text does not carry them
pub struct RuntimeStats {
    /// `process_resident_memory_bytes`
    pub resident_memory_bytes: f64,
    /// `process_cpu_seconds_total`
    pub cpu_seconds_total: f64,
    /// `nodejs_eventloop_lag_seconds`
    pub eventloop_lag_seconds: f64,
    /// `nodejs_heap_size_used_bytes`
    pub heap_used_bytes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Everything a dashboard shows for one snapshot
pub struct Overview {
    /// Samples per bucket
    pub buckets: BucketSizes,
    /// Providers in order of first appearance
    pub providers: Vec<ProviderStatus>,
    /// Providers with the highest failure rate
    pub failure_ranking: Vec<ProviderStatus>,
    /// Sum of every status sample
    pub total_status_count: f64,
    /// Distinct providers seen in the custom bucket
    pub distinct_providers: usize,
    /// Routes in order of first appearance
    pub routes: Vec<RouteTiming>,
    /// Routes with the highest mean response time
    pub slowest_routes: Vec<RouteTiming>,
    /// Routes with the most requests
    pub busiest_routes: Vec<RouteTiming>,
    /// Sum of every request count
    pub total_requests: f64,
    /// Distinct route keys
    pub distinct_routes: usize,
    /// Runtime gauges
    pub runtime: RuntimeStats,
}

impl Overview {
    /// Build the overview of `snapshot` according to `views`.
    #[must_use]
    pub fn build(snapshot: &Snapshot, views: &Views) -> Self {
        let custom = &snapshot.custom;
        let server = &snapshot.server_request;
        let runtime = &snapshot.runtime;

        let groups = aggregate::group_status_by_label(
            custom,
            &views.status_metric,
            &views.group_label,
            &views.status_label,
        );
        let failure_ranking = aggregate::failure_ranking(&groups, views.top_n)
            .into_iter()
            .map(ProviderStatus::from)
            .collect();

        let averages = aggregate::averages(server, &views.duration_metric);
        let timing = |avgs: &[Average]| -> Vec<RouteTiming> {
            avgs.iter()
                .map(|avg| RouteTiming::new(avg, &views.route_labels))
                .collect()
        };
        let routes = timing(&averages);
        let distinct_routes = routes
            .iter()
            .map(|route| route.route.as_str())
            .collect::<FxHashSet<_>>()
            .len();

        Self {
            buckets: BucketSizes {
                custom: custom.len(),
                server_request: server.len(),
                runtime: runtime.len(),
            },
            providers: groups.into_iter().map(ProviderStatus::from).collect(),
            failure_ranking,
            total_status_count: aggregate::total(custom, &views.status_metric),
            distinct_providers: aggregate::distinct_label_values(custom, &views.group_label),
            slowest_routes: timing(&aggregate::slowest(&averages, views.top_n)),
            busiest_routes: timing(&aggregate::busiest(&averages, views.top_n)),
            total_requests: aggregate::total(server, &format!("{}_count", views.duration_metric)),
            routes,
            distinct_routes,
            runtime: RuntimeStats {
                resident_memory_bytes: aggregate::value_of(runtime, RESIDENT_MEMORY),
                cpu_seconds_total: aggregate::value_of(runtime, CPU_SECONDS),
                eventloop_lag_seconds: aggregate::value_of(runtime, EVENTLOOP_LAG),
                heap_used_bytes: aggregate::value_of(runtime, HEAP_USED),
            },
        }
    }
}
