//! Pipeline metrics
//!
//! Emitted through the `metrics` facade; the binary decides where they go.
//!
//! - `pipeline_tasks_total` (counter): label `outcome`
//! - `pipeline_generate_duration_seconds` (histogram): label `result`
//! - `pipeline_rate_limit_waits_total` (counter)
//! - `pipeline_rate_limit_wait_millis_total` (counter)

/// Record how a taken unit was settled: `completed`, `dropped`,
/// `skipped_empty`, `requeued_quota` or `requeued_exhausted`.
pub fn record_outcome(outcome: &str) {
    metrics::counter!("pipeline_tasks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the duration of one generation call.
pub fn record_generate_duration(result: &str, duration_secs: f64) {
    metrics::histogram!("pipeline_generate_duration_seconds", "result" => result.to_string())
        .record(duration_secs);
}

/// Record one wait on a full rate-limit window.
pub fn record_rate_limit_wait(wait_secs: f64) {
    metrics::counter!("pipeline_rate_limit_waits_total").increment(1);
    metrics::counter!("pipeline_rate_limit_wait_millis_total")
        .increment((wait_secs * 1000.0) as u64);
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
        record_outcome("completed");
        record_generate_duration("ok", 0.5);
        record_rate_limit_wait(1.0);
    }

    #[test]
    fn outcome_counter_carries_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_outcome("completed");
        record_outcome("completed");
        record_outcome("dropped");

        let output = handle.render();
        assert!(
            output.contains("pipeline_tasks_total{outcome=\"completed\"} 2"),
            "got: {output}"
        );
        assert!(output.contains("pipeline_tasks_total{outcome=\"dropped\"} 1"));
    }

    #[test]
    fn rate_limit_wait_counts_waits_and_millis() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_rate_limit_wait(1.5);
        record_rate_limit_wait(0.25);

        let output = handle.render();
        assert!(output.contains("pipeline_rate_limit_waits_total 2"), "got: {output}");
        assert!(output.contains("pipeline_rate_limit_wait_millis_total 1750"));
    }

    #[test]
    fn generate_duration_is_recorded() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_generate_duration("ok", 0.2);

        let output = handle.render();
        assert!(output.contains("pipeline_generate_duration_seconds"));
        assert!(output.contains("result=\"ok\""));
    }
}
