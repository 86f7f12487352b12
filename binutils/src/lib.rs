//! Helpers shared by the command line tools: argument styling, verbosity
//! flags and log initialization.

pub use clap;
pub use clap_verbosity_flag as verbose;

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Colour scheme of the `--help` output.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Map the `-v` count to a tracing level. No flag means errors only.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global subscriber. Logs go to stderr, or as JSON lines into
/// `log_file` when one is given.
pub fn logging_setup(level: &tracing::Level, log_file: Option<std::fs::File>) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);
    match log_file {
        Some(file) => builder
            .json()
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        None => builder
            .without_time()
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_mapping() {
        assert_eq!(verbose_level_to_trace(None), &tracing::Level::ERROR);
        assert_eq!(
            verbose_level_to_trace(Some(verbose::Level::Info)),
            &tracing::Level::DEBUG
        );
        assert_eq!(
            verbose_level_to_trace(Some(verbose::Level::Trace)),
            &tracing::Level::TRACE
        );
    }
}
