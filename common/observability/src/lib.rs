use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ClaimsMetrics {
    registry: Registry,
    operations_total: IntCounterVec,
    mirror_divergence: IntCounter,
    compensations_total: IntCounterVec,
    http_errors_total: IntCounterVec,
}

impl ClaimsMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "claims_operations_total",
                "Claims manager operations grouped by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let mirror_divergence = IntCounter::new(
            "claims_mirror_divergence_total",
            "Mirror writes that failed after the identity claims were set",
        )?;
        registry.register(Box::new(mirror_divergence.clone()))?;

        let compensations_total = IntCounterVec::new(
            Opts::new(
                "claims_compensations_total",
                "Attempts to restore previous claims after a mirror failure",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(compensations_total.clone()))?;

        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            mirror_divergence,
            compensations_total,
            http_errors_total,
        })
    }

    pub fn operation(&self, operation: &str, outcome: &str) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn mirror_divergence(&self) {
        self.mirror_divergence.inc();
    }

    pub fn compensation(&self, outcome: &str) {
        self.compensations_total.with_label_values(&[outcome]).inc();
    }

    pub fn http_error(&self, service: &str, code: &str, status: u16) {
        self.http_errors_total
            .with_label_values(&[service, code, &status.to_string()])
            .inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn divergence_count(&self) -> u64 {
        self.mirror_divergence.get()
    }

    pub fn compensation_count(&self, outcome: &str) -> u64 {
        self.compensations_total.with_label_values(&[outcome]).get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_output() {
        let metrics = ClaimsMetrics::new().expect("metrics");
        metrics.operation("assign_staff_role", "success");
        metrics.mirror_divergence();
        metrics.compensation("restored");

        assert_eq!(metrics.operation_count("assign_staff_role", "success"), 1);
        assert_eq!(metrics.divergence_count(), 1);
        assert_eq!(metrics.compensation_count("restored"), 1);

        let text = metrics.render().expect("render");
        assert!(text.contains("claims_operations_total"));
        assert!(text.contains("claims_mirror_divergence_total 1"));
    }
}
