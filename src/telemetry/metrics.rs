//! Metric definitions

use metrics::describe_counter;

/// Register metric descriptions so a recorder exposes HELP lines from startup.
pub fn describe_metrics() {
    describe_counter!(
        "pdv_access_decisions_total",
        "Access decisions by outcome (allow/deny) and matching rule"
    );
    describe_counter!(
        "pdv_access_cache_total",
        "Permission cache lookups by result (hit/miss/coalesced)"
    );
    describe_counter!(
        "pdv_access_source_errors_total",
        "Permission source failures by error kind"
    );
}
