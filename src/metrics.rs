use crate::models::StageReport;
use tracing::trace;

// Trace-only metrics; a recorder can subscribe to the `lister.metrics` target.

pub fn stage_recorded(report: &StageReport) {
    trace!(
        target = "lister.metrics",
        stage = %report.name,
        elapsed_ms = u64::try_from(report.elapsed_ms).unwrap_or(u64::MAX),
        finished_at = %report.timestamp,
        "stage_recorded"
    );
}

pub fn counter_advanced(value: u64) {
    trace!(target = "lister.metrics", value = value, "counter_advanced");
}

pub fn field_warning(field: &'static str) {
    trace!(target = "lister.metrics", field = field, "field_parse_warning");
}

pub fn price_samples(usable: usize, skipped: usize) {
    trace!(
        target = "lister.metrics",
        usable = usable as u64,
        skipped = skipped as u64,
        "price_samples"
    );
}
