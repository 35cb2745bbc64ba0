//! Log output for the harness's own test binaries.
//!
//! Lifecycle runs are long and mostly silent, so the tests install a
//! subscriber that writes through libtest's capture: a passing test stays
//! quiet and a failing one prints the steps it got through. Every
//! `#[tokio::test]` in a binary shares one process and therefore one global
//! subscriber; whichever test gets there first installs it.
//!
//! `RUST_LOG` replaces the default filter entirely, e.g.
//! `RUST_LOG=infratest_core=trace` to see every command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable selecting [`LogFormat`].
pub const LOG_FORMAT_ENV: &str = "INFRATEST_LOG_FORMAT";

/// Line format for harness logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One short line per event, for people reading `cargo test` output.
    #[default]
    Compact,
    /// Newline-delimited JSON with the enclosing span's fields, for CI log
    /// collectors.
    Json,
}

impl LogFormat {
    /// `json` (any case) selects [`LogFormat::Json`]; anything else is compact.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

/// Harness crates at `level`, everything else (provider SDKs, hyper) at warn.
fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    EnvFilter::new(format!(
        "warn,infratest_core={level},infratest_suite={level}"
    ))
}

/// Install the subscriber for this test process, unless one already is.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let compact = (format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_test_writer()
            .with_target(false)
    });
    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_test_writer()
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json)
        .try_init();
    if installed.is_err() {
        tracing::debug!(?format, "log subscriber already installed");
    }
}

/// [`init_tracing`] at `INFO`, format from `INFRATEST_LOG_FORMAT`.
pub fn init_from_env() {
    init_tracing(LogFormat::from_env(), Level::INFO);
}
