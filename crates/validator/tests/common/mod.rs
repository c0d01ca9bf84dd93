#![allow(dead_code)]

use std::sync::Once;

use tracecheck_core::DataRecord;

static TRACING: Once = Once::new();

/// Install a test-writer `fmt` subscriber honouring `RUST_LOG`, once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn request(host: &str, path: &str) -> DataRecord {
    DataRecord::new("http", "request", "handled")
        .with("host", host)
        .with("path", path)
}

/// The five-event feed shared by the scenario tests.
pub fn scenario_feed() -> Vec<DataRecord> {
    [
        ("abc", "/1"),
        ("def", "/1"),
        ("abc", "/2"),
        ("def", "/2"),
        ("ghi", "/1"),
    ]
    .into_iter()
    .map(|(host, path)| request(host, path))
    .collect()
}
