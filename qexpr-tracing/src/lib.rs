//! Logging configuration for programs and tests using the query expression crates.
//!
//! All logging goes through [tracing]; this crate only installs a subscriber. Programs embed
//! [`Options`] in their command line arguments and call [`Options::init`], tests call
//! [`init_test_logging`].

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod error;
pub use error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Corresponds to [`tracing_subscriber::fmt::format::Compact`]
    Compact,

    /// Corresponds to [`tracing_subscriber::fmt::format::Full`]
    Full,

    /// Corresponds to [`tracing_subscriber::fmt::format::Pretty`]
    Pretty,

    /// Corresponds to [`tracing_subscriber::fmt::format::Json`]
    Json,
}

/// Logging options for a binary embedding the normalizer, meant to be `#[command(flatten)]`ed into
/// its command line arguments before calling [`Options::init`] once at startup. Tests use
/// [`init_test_logging`] instead.
#[derive(Debug, Parser)]
pub struct Options {
    /// Format to use when emitting log events.
    #[arg(long, env = "LOG_FORMAT", default_value = "full", value_enum)]
    pub log_format: LogFormat,

    /// Log level filter for spans and events. The log level filter string is a comma separated
    /// list of directives.
    /// See [`tracing_subscriber::EnvFilter`] for full documentation on the directive syntax.
    ///
    /// Examples:
    ///
    /// Log at INFO level for all crates.
    /// ```bash
    /// LOG_LEVEL=info
    /// ```
    ///
    /// Log the tree after every normalization pass, and nothing else below INFO.
    /// ```bash
    /// LOG_LEVEL=info,qexpr_passes=trace
    /// ```
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Full,
            log_level: "info".to_owned(),
        }
    }
}

impl Options {
    /// Install a global subscriber configured by these options
    pub fn init(&self) -> Result<(), Error> {
        let filter = EnvFilter::try_new(&self.log_level)?;
        let s = tracing_subscriber::fmt().with_env_filter(filter);

        match self.log_format {
            LogFormat::Compact => tracing::subscriber::set_global_default(s.compact().finish())?,
            LogFormat::Full => tracing::subscriber::set_global_default(s.finish())?,
            LogFormat::Pretty => tracing::subscriber::set_global_default(s.pretty().finish())?,
            LogFormat::Json => tracing::subscriber::set_global_default(
                s.json().with_current_span(true).finish(),
            )?,
        }

        #[cfg(debug_assertions)]
        tracing::warn!("Running a debug build");

        Ok(())
    }
}

/// Configure the global tracing subscriber for logging inside of tests
pub fn init_test_logging() {
    // This errors out if it's already been called within the scope of a process, which we don't
    // care about, so we just discard the result
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("LOG_LEVEL"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options() {
        let options =
            Options::try_parse_from(["normalize", "--log-format", "json", "--log-level", "trace"])
                .unwrap();
        assert_eq!(options.log_format, LogFormat::Json);
        assert_eq!(options.log_level, "trace");
    }

    #[test]
    fn flattens_into_program_arguments() {
        #[derive(Parser)]
        struct Args {
            #[arg(long)]
            query: String,

            #[command(flatten)]
            logging: Options,
        }

        let args = Args::try_parse_from(["qexpr", "--query", "customers", "--log-format", "pretty"])
            .unwrap();
        assert_eq!(args.query, "customers");
        assert_eq!(args.logging.log_format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_log_format() {
        assert!(Options::try_parse_from(["normalize", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn invalid_filter_is_an_error() {
        let options = Options {
            log_level: "qexpr_passes=notalevel".to_owned(),
            ..Default::default()
        };
        assert!(matches!(options.init(), Err(Error::Parse(_))));
    }
}
