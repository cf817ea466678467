use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
///
/// Spans are bridged to OpenTelemetry through the global tracer provider, which
/// stays a no-op unless one was installed. Use [`TelemetryGuard::init`] instead
/// when exporting to an OTLP collector; it installs the same subscriber.
///
/// [`TelemetryGuard::init`]: crate::TelemetryGuard::init
pub fn setup_logging(environment: Environment) -> anyhow::Result<()> {
    install(environment, tracing_opentelemetry::layer())
}

/// Install the global subscriber: `extra` first, then the `RUST_LOG` filter and
/// the formatter matching `environment`.
pub(crate) fn install<L>(environment: Environment, extra: L) -> anyhow::Result<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(extra).with(env_filter);

    match environment {
        Environment::Production => registry
            .with(tracing_subscriber::fmt::layer().json().with_level(true))
            .try_init()?,
        Environment::Development => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
            .try_init()?,
    }
    Ok(())
}
