use once_cell::sync::OnceCell;
use std::error::Error;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub const PROVIDER_REQUESTS: &str = "signal_desk_provider_requests_total";
pub const SYMBOLS_SCANNED: &str = "signal_desk_symbols_scanned_total";
pub const PICKS_RETURNED: &str = "signal_desk_picks_returned_total";
pub const SCAN_DURATION: &str = "signal_desk_scan_duration_seconds";
pub const FILLS_ANALYZED: &str = "signal_desk_fills_analyzed_total";

/// Install the global Prometheus recorder. Calling it again after the first
/// success is a no-op. Without it, emitted metrics go nowhere.
pub fn init() -> Result<(), Box<dyn Error + Send + Sync>> {
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    describe_counter!(PROVIDER_REQUESTS, "Provider calls by provider and outcome");
    describe_counter!(SYMBOLS_SCANNED, "Symbols evaluated by pick scans");
    describe_counter!(PICKS_RETURNED, "Signals returned by pick scans");
    describe_histogram!(SCAN_DURATION, Unit::Seconds, "Wall time of a pick scan");
    describe_counter!(FILLS_ANALYZED, "Fills analyzed and recorded");
    Ok(())
}

/// Prometheus exposition text, or `None` before [`init`].
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|h| h.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::increment_counter;

    #[test]
    fn init_is_idempotent_and_renders() {
        init().unwrap();
        init().unwrap();
        increment_counter!(PICKS_RETURNED, "style" => "day:SAFE");
        let text = render().unwrap();
        assert!(text.contains(PICKS_RETURNED));
    }
}
