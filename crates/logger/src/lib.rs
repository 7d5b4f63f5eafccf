use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Sets up logging for a sensor service.
///
/// Filtering follows `RUST_LOG`, for example:
/// `RUST_LOG=air_sensors::drivers::sgp30=trace,info` logs every raw frame
/// of the sgp30 driver while the rest stays at info. Without `RUST_LOG`
/// everything at info or above is logged.
///
/// # Note
/// Under systemd output goes to the journal, try:
/// `journalctl -fu air-sensors@ccs811 --output-fields=CODE_FILE,CODE_LINE,MESSAGE -o cat`
pub fn setup() {
    let journal = libsystemd::logging::connected_to_journal()
        .then(tracing_journald::layer)
        .transpose();

    let registry = Registry::default().with(ErrorLayer::default());
    match journal {
        Ok(Some(journal)) => {
            registry.with(journal.with_filter(env_filter())).init();
            tracing::debug!("logging to journald");
        }
        Ok(None) => {
            registry.with(stderr().with_filter(env_filter())).init();
            tracing::debug!("logging to stderr");
        }
        Err(err) => {
            registry.with(stderr().with_filter(env_filter())).init();
            tracing::error!("Could not connect to journald, using stderr instead: {err}");
        }
    }
}

fn stderr<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
}

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Safe to call from every test, only the first call installs anything.
pub fn setup_for_tests() {
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // another test harness may have installed one already
        let _ = color_eyre::install();

        let test_writer = fmt::layer()
            .with_test_writer()
            .with_line_number(true)
            .with_target(false)
            .with_filter(EnvFilter::from_default_env());
        let _ = tracing_subscriber::registry()
            .with(test_writer)
            .with(ErrorLayer::default())
            .try_init();
    })
}
