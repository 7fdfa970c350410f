// Metric name constants
pub const ADDED: &str = "list_lru_added_total";
pub const DELETED: &str = "list_lru_deleted_total";
pub const ISOLATED: &str = "list_lru_isolated_total";
pub const WALKED: &str = "list_lru_walked_total";
pub const REPARENTED_ITEMS: &str = "list_lru_reparented_items_total";
pub const MEMCG_ALLOC_FAILURES: &str = "list_lru_memcg_alloc_failures_total";

pub const INSTANCES: &str = "list_lru_instances";

/// Registers descriptions for every list metric with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(ADDED, metrics::Unit::Count, "Items linked onto a list");
    metrics::describe_counter!(DELETED, metrics::Unit::Count, "Items unlinked by del");
    metrics::describe_counter!(ISOLATED, metrics::Unit::Count, "Items isolated by walk callbacks");
    metrics::describe_counter!(WALKED, metrics::Unit::Count, "Items visited by walks");
    metrics::describe_counter!(
        REPARENTED_ITEMS,
        metrics::Unit::Count,
        "Items moved to a parent cgroup's lists"
    );
    metrics::describe_counter!(
        MEMCG_ALLOC_FAILURES,
        metrics::Unit::Count,
        "Failed per-cgroup list allocations"
    );
    metrics::describe_gauge!(INSTANCES, metrics::Unit::Count, "Registered cgroup-aware lists");
}

/// Adds linked items.
pub fn add_added(value: u64) {
    metrics::counter!(ADDED).increment(value);
}

/// Adds unlinked items.
pub fn add_deleted(value: u64) {
    metrics::counter!(DELETED).increment(value);
}

/// Adds isolated items.
pub fn add_isolated(value: u64) {
    if value > 0 {
        metrics::counter!(ISOLATED).increment(value);
    }
}

/// Adds visited items.
pub fn add_walked(value: u64) {
    if value > 0 {
        metrics::counter!(WALKED).increment(value);
    }
}

pub fn add_reparented(value: u64) {
    metrics::counter!(REPARENTED_ITEMS).increment(value);
}

pub fn add_memcg_alloc_failures(value: u64) {
    metrics::counter!(MEMCG_ALLOC_FAILURES).increment(value);
}

pub fn inc_instances() {
    metrics::gauge!(INSTANCES).increment(1.0);
}

pub fn dec_instances() {
    metrics::gauge!(INSTANCES).decrement(1.0);
}
