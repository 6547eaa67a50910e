use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};

#[derive(Clone)]
pub struct LoanMetrics {
    pub registry: Registry,
    pub reservations_total: IntCounter,
    pub insufficient_stock_total: IntCounter,
    pub approvals_total: IntCounter,
    pub rejections_total: IntCounter,
    pub returns_total: IntCounter,
    pub notify_failures_total: IntCounter,
    pub decision_duration_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl LoanMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let reservations_total = IntCounter::new(
            "loan_reservations_total",
            "Stock reservations made at submission time",
        ).unwrap();
        let insufficient_stock_total = IntCounter::new(
            "loan_insufficient_stock_total",
            "Submissions aborted because stock was insufficient",
        ).unwrap();
        let approvals_total = IntCounter::new(
            "loan_approvals_total",
            "Loan requests approved (asset loans and material conversions)",
        ).unwrap();
        let rejections_total = IntCounter::new(
            "loan_rejections_total",
            "Loan requests rejected with stock restored",
        ).unwrap();
        let returns_total = IntCounter::new(
            "loan_returns_total",
            "Approved asset loans closed by return",
        ).unwrap();
        let notify_failures_total = IntCounter::new(
            "loan_notify_failures_total",
            "Notification sink delivery failures",
        ).unwrap();
        let decision_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "loan_decision_duration_seconds",
                "Duration of an approve/reject transaction",
            ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0])
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        ).unwrap();
        let _ = registry.register(Box::new(reservations_total.clone()));
        let _ = registry.register(Box::new(insufficient_stock_total.clone()));
        let _ = registry.register(Box::new(approvals_total.clone()));
        let _ = registry.register(Box::new(rejections_total.clone()));
        let _ = registry.register(Box::new(returns_total.clone()));
        let _ = registry.register(Box::new(notify_failures_total.clone()));
        let _ = registry.register(Box::new(decision_duration_seconds.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        LoanMetrics {
            registry,
            reservations_total,
            insufficient_stock_total,
            approvals_total,
            rejections_total,
            returns_total,
            notify_failures_total,
            decision_duration_seconds,
            http_errors_total,
        }
    }
}

impl Default for LoanMetrics {
    fn default() -> Self { Self::new() }
}
