//! Request telemetry
//!
//! Structured `tracing` events plus `metrics` counters for every HTTP call
//! and every authorized request. Without an installed recorder the metric
//! calls are no-ops. Nothing here influences control flow.
//!
//! - `bakalari_requests_total` (counter): labels `method`, `outcome`
//! - `bakalari_request_duration_seconds` (histogram): label `method`
//! - `bakalari_token_refresh_total` (counter): label `result`

use std::time::Duration;

use tracing::debug;

/// One executed HTTP call. `outcome` is the status code or an error tag.
pub(crate) fn api_request(
    url: &str,
    method: &str,
    elapsed: Duration,
    retries: u32,
    outcome: Outcome<'_>,
) {
    let latency_ms = round_ms(elapsed);
    match outcome {
        Outcome::Status(status) => {
            debug!(event = "api_request", url, method, latency_ms, retries, status, "api_request");
        }
        Outcome::Error(error) => {
            debug!(event = "api_request", url, method, latency_ms, retries, error, "api_request");
        }
    }
    record_request(method, &outcome.label(), elapsed.as_secs_f64());
}

/// Terminal outcome of an authorized request, covering all of its retries.
pub(crate) fn authorized_request(
    url: &str,
    method: &str,
    elapsed: Duration,
    retries: u32,
    error: Option<&str>,
) {
    let latency_ms = round_ms(elapsed);
    match error {
        Some(error) => debug!(
            event = "authorized_request",
            url, method, latency_ms, retries, error, "authorized_request"
        ),
        None => debug!(
            event = "authorized_request",
            url, method, latency_ms, retries, "authorized_request"
        ),
    }
}

/// Record a call in the request counter and latency histogram.
pub fn record_request(method: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "bakalari_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("bakalari_request_duration_seconds", "method" => method.to_string())
        .record(duration_secs);
}

/// Record a token refresh round-trip (`result` is `ok` or an error tag).
pub fn record_token_refresh(result: &str) {
    metrics::counter!("bakalari_token_refresh_total", "result" => result.to_string())
        .increment(1);
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome<'a> {
    Status(u16),
    Error(&'a str),
}

impl Outcome<'_> {
    fn label(&self) -> String {
        match self {
            Outcome::Status(status) => status.to_string(),
            Outcome::Error(error) => (*error).to_string(),
        }
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("GET", "200", 0.05);
        record_token_refresh("ok");
        api_request(
            "https://school.example/api",
            "GET",
            Duration::from_millis(12),
            0,
            Outcome::Error("timeout"),
        );
    }

    #[test]
    fn api_request_records_outcome_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        api_request(
            "https://school.example/api/3/marks",
            "GET",
            Duration::from_millis(40),
            0,
            Outcome::Status(200),
        );
        api_request(
            "https://school.example/api/login",
            "POST",
            Duration::from_millis(10_000),
            0,
            Outcome::Error("timeout"),
        );

        let output = handle.render();
        assert!(output.contains("bakalari_requests_total"), "got: {output}");
        assert!(output.contains("outcome=\"200\""), "got: {output}");
        assert!(output.contains("outcome=\"timeout\""), "got: {output}");
        assert!(output.contains("method=\"POST\""), "got: {output}");
    }

    #[test]
    fn token_refresh_counter_carries_result() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_token_refresh("ok");
        record_token_refresh("refresh_token_expired");

        let output = handle.render();
        assert!(output.contains("bakalari_token_refresh_total"));
        assert!(output.contains("result=\"ok\""));
        assert!(output.contains("result=\"refresh_token_expired\""));
    }

    #[test]
    fn api_request_event_carries_status_or_error() {
        let (events, _guard) = crate::test_support::capture_events();

        api_request(
            "https://school.example/api/3/marks",
            "GET",
            Duration::from_micros(12_346),
            0,
            Outcome::Status(200),
        );
        api_request(
            "https://school.example/api/3/marks",
            "GET",
            Duration::from_secs(10),
            1,
            Outcome::Error("timeout"),
        );

        let logged = events.named("api_request");
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0]["url"], "https://school.example/api/3/marks");
        assert_eq!(logged[0]["method"], "GET");
        assert_eq!(logged[0]["latency_ms"], "12.35");
        assert_eq!(logged[0]["retries"], "0");
        assert_eq!(logged[0]["status"], "200");
        assert!(!logged[0].contains_key("error"));

        assert_eq!(logged[1]["retries"], "1");
        assert_eq!(logged[1]["error"], "timeout");
        assert!(!logged[1].contains_key("status"));
    }

    #[test]
    fn authorized_request_event_reports_retries() {
        let (events, _guard) = crate::test_support::capture_events();

        authorized_request("https://school.example/api", "GET", Duration::from_millis(5), 0, None);
        authorized_request(
            "https://school.example/api",
            "POST",
            Duration::from_millis(5),
            2,
            Some("invalid_token"),
        );

        let logged = events.named("authorized_request");
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0]["retries"], "0");
        assert!(logged[0].contains_key("latency_ms"));
        assert!(!logged[0].contains_key("error"));
        assert_eq!(logged[1]["method"], "POST");
        assert_eq!(logged[1]["retries"], "2");
        assert_eq!(logged[1]["error"], "invalid_token");
    }

    #[test]
    fn latency_is_rounded_to_hundredths_of_a_millisecond() {
        assert_eq!(round_ms(Duration::from_micros(12_346)), 12.35);
        assert_eq!(round_ms(Duration::from_secs(1)), 1000.0);
    }
}
