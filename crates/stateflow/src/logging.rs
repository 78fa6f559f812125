use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber for an embedding process.
///
/// The filter defaults to `info` for everything and the given level for this
/// crate, overridable through `RUST_LOG` as usual. Script `print` output is
/// emitted under the `stateflow::script` target, so embedders can raise or
/// silence it independently.
pub fn setup_global_logging(log_level: &tracing::Level, with_ansi: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::builder().parse(format!("info,stateflow={}", log_level.as_str())))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(with_ansi)
                .with_filter(filter),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
