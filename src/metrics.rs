//! Prometheus metrics and tracing span helpers.
//!
//! Both halves are feature-gated: `metrics` pulls in the `prometheus`
//! registry behind `GET /metrics`, `tracing` adds spans around queries,
//! transactions and ledger operations.

#[cfg(feature = "metrics")]
pub use self::prom::{render, StockroomMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use prometheus::{
        Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<StockroomMetrics> = Lazy::new(StockroomMetrics::init);

    pub struct StockroomMetrics {
        registry: Registry,
        queries_total: IntCounter,
        query_errors_total: IntCounter,
        query_duration: Histogram,
        pool_wait_duration: Histogram,
        http_requests_total: IntCounterVec,
        ledger_operations_total: IntCounterVec,
    }

    impl StockroomMetrics {
        pub fn init() -> Self {
            let registry = Registry::new_custom(Some("stockroom".into()), None)
                .expect("valid registry prefix");

            let queries_total = IntCounter::new("queries_total", "Total queries executed")
                .expect("valid metric");
            let query_errors_total =
                IntCounter::new("query_errors_total", "Queries that returned an error")
                    .expect("valid metric");
            let query_duration = Histogram::with_opts(HistogramOpts::new(
                "query_duration_seconds",
                "Duration of queries",
            ))
            .expect("valid metric");
            let pool_wait_duration = Histogram::with_opts(HistogramOpts::new(
                "pool_wait_seconds",
                "Time spent waiting for a pooled connection",
            ))
            .expect("valid metric");
            let http_requests_total = IntCounterVec::new(
                Opts::new("http_requests_total", "HTTP requests by method and status"),
                &["method", "status"],
            )
            .expect("valid metric");
            let ledger_operations_total = IntCounterVec::new(
                Opts::new(
                    "ledger_operations_total",
                    "Ledger operations by movement type and outcome",
                ),
                &["type", "outcome"],
            )
            .expect("valid metric");

            for collector in [
                Box::new(queries_total.clone()) as Box<dyn prometheus::core::Collector>,
                Box::new(query_errors_total.clone()),
                Box::new(query_duration.clone()),
                Box::new(pool_wait_duration.clone()),
                Box::new(http_requests_total.clone()),
                Box::new(ledger_operations_total.clone()),
            ] {
                registry.register(collector).expect("unique metric names");
            }

            Self {
                registry,
                queries_total,
                query_errors_total,
                query_duration,
                pool_wait_duration,
                http_requests_total,
                ledger_operations_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.inc();
            self.query_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.inc();
        }

        pub fn observe_pool_wait(&self, waited: Duration) {
            self.pool_wait_duration.observe(waited.as_secs_f64());
        }

        pub fn record_http(&self, method: &str, status: u16) {
            self.http_requests_total
                .with_label_values(&[method, &status.to_string()])
                .inc();
        }

        pub fn record_ledger(&self, movement_type: &str, outcome: &str) {
            self.ledger_operations_total
                .with_label_values(&[movement_type, outcome])
                .inc();
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render() -> Vec<u8> {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&METRICS.registry().gather(), &mut buffer) {
            log::warn!("failed to encode metrics: {e}");
        }
        buffer
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    const MAX_STATEMENT_LEN: usize = 120;

    fn statement_summary(query: &str) -> &str {
        let trimmed = query.trim();
        match trimmed.char_indices().nth(MAX_STATEMENT_LEN) {
            Some((idx, _)) => &trimmed[..idx],
            None => trimmed,
        }
    }

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("db.query", db.statement = statement_summary(query))
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("db.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("db.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("db.transaction.rollback")
    }

    pub fn ledger_span(operation: &'static str) -> Span {
        tracing::info_span!("ledger", operation)
    }

}
