use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Per-test log capture. Events from the test thread go to the libtest writer and only
/// show up for failing tests (or with `--nocapture`).
pub struct TestTracing {
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("dashrouter=debug"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .finish();
        Self {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
