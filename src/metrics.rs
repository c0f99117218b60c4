use tracing::trace;

// Trace-channel counters; the Prometheus recorder installed in main exports
// process defaults without pulling metrics macros into every handler.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "market.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn picture_uploaded(backend: &'static str) {
    trace!(
        target = "market.metrics",
        backend = backend,
        "pictures_uploaded_inc"
    );
}
