//! Tracing setup driven by the engine's `[log]` config section.

use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogConfig, LogFormat};

/// Install the global subscriber per `config`.
///
/// `RUST_LOG` takes precedence over `config.level`; an unparsable directive
/// string falls back to `info`. Returns whether this call installed the
/// subscriber (a second call in the same process is a no-op and returns
/// false).
pub fn init_tracing(config: &LogConfig) -> bool {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let records: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = match config.format {
        LogFormat::Full => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().with_target(false).json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(records)
        .try_init()
        .is_ok()
}
