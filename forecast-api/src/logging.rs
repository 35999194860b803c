use forecast_core::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Level comes from `RUST_LOG`, defaulting to
/// `info`. Output goes to stderr so command output on stdout stays clean.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
