//! Tracing setup: console layer plus an optional rolling JSON file layer.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use warden_config::LoggingConfig;

const VERBOSE_FILTER: &str = concat!(
    "warden=debug,warden_session=debug,warden_server=debug,",
    "warden_config=debug,tower_http=debug,info"
);

const FILE_FILTER: &str = "warden=trace,warden_session=trace,warden_server=trace,info";

/// Console filter directive. `RUST_LOG` wins when set.
fn console_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        VERBOSE_FILTER.to_string()
    } else {
        config.level.clone()
    }
}

fn console_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(config: &LoggingConfig, verbose: bool, json_override: bool) -> Option<WorkerGuard> {
    let directive = console_directive(config, verbose);
    let json = json_override || config.json;

    let plain = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(console_filter(&directive))
    });
    let structured = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(console_filter(&directive))
    });

    let (file, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "warden.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(plain)
        .with(structured)
        .with(file)
        .init();

    guard
}
