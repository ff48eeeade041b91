use tracing::trace;

// Trace-based counters; the Prometheus recorder renders whatever is installed.

pub fn inc_requests(route: &'static str) {
    trace!(target = "forge.metrics", route = route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "forge.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn enrichment_finished(processed: usize, failed: usize, elapsed_ms: u128) {
    trace!(
        target = "forge.metrics",
        processed = processed as u64,
        failed = failed as u64,
        elapsed_ms = elapsed_ms as u64,
        "enrichment_batch"
    );
}
