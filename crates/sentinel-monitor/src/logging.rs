//! Logging setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Console log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Setup logging with the given level.
///
/// `RUST_LOG` overrides `level`. When `file` is set, logs are also written
/// to a daily rolling file next to it; keep the returned guard alive until
/// shutdown so buffered lines are flushed.
pub fn setup_logging(level: &str, format: LogFormat, file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![match format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    }];

    let guard = file.map(|path| {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sentinel.log".to_string());

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(match format {
            LogFormat::Json => layer.json().boxed(),
            _ => layer.boxed(),
        });
        guard
    });

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry().with(layers).with(filter).try_init();
    guard
}
