//! Tracing subscriber bootstrap: one switch this engine actually needs,
//! human-readable vs JSON, driven by `--json`.

use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Installs a global `tracing` subscriber. `RUST_LOG` wins if set; otherwise
/// falls back to `level` scoped to this workspace's crates.
pub fn init(level: LogLevel, json: bool) {
    let level_str = level.as_str();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sykli={level_str},sykli_core={level_str},sykli_scheduler={level_str},sykli_verify={level_str},sykli_graph={level_str}"
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true);
        registry.with(layer).init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        registry.with(layer).init();
    }
}
