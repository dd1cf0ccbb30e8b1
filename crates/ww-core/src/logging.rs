//! Logging setup
//!
//! `RUST_LOG` wins when it is set; otherwise the configured level applies.
//! Log lines go to stderr so stdout stays free for reports.

use crate::config::LogLevel;
use std::io;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

/// Subscriber builder writing to stderr
pub type LogBuilder = SubscriberBuilder<DefaultFields, Format, EnvFilter, fn() -> io::Stderr>;

/// Build the filter used by [`init`]
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Subscriber configuration installed by [`init`]
pub fn builder(level: LogLevel) -> LogBuilder {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .with_writer(io::stderr as fn() -> io::Stderr)
}

/// Install the global tracing subscriber
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(level: LogLevel) {
    if builder(level).try_init().is_ok() {
        tracing::debug!("Logging initialized at {}", level.as_filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_writes_to_stderr() {
        // Fails to compile if the writer is changed away from stderr
        let builder: SubscriberBuilder<_, _, _, fn() -> io::Stderr> = builder(LogLevel::Info);
        let subscriber = builder.finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("stderr only");
        });
    }

    #[test]
    fn test_init_twice() {
        init(LogLevel::Warn);
        init(LogLevel::Debug);
    }
}
