//! Quote engine metrics.

use metrics::{counter, histogram};

/// Static recorder for freight quote metrics
pub struct QuoteMetrics;

impl QuoteMetrics {
    /// Record one finished quote. `mode` is "auto", "pinned" or "recommendation".
    pub fn record_quote(mode: &'static str, outcome: &'static str, duration_secs: f64) {
        counter!("freight_quotes_total", "mode" => mode, "outcome" => outcome).increment(1);
        histogram!("freight_quote_duration_seconds", "mode" => mode).record(duration_secs);

        tracing::debug!(mode, outcome, duration_secs, "Recorded freight quote");
    }

    /// A crossing point was dropped from an automatic comparison
    pub fn record_candidate_failure(crossing: &str, reason: &'static str) {
        counter!(
            "freight_candidate_failures_total",
            "crossing" => crossing.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    /// A distance lookup failed and the candidate continued with zero distance
    pub fn record_distance_fallback(crossing: &str) {
        counter!("freight_distance_fallbacks_total", "crossing" => crossing.to_string())
            .increment(1);
    }

    /// Which link of the exchange-rate fallback chain served a snapshot
    pub fn record_exchange_rate_source(source: &'static str) {
        counter!("freight_exchange_rate_source_total", "source" => source).increment(1);
    }
}
