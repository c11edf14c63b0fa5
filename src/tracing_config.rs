//! Tracing configuration for the service binary
//!
//! The library only emits events (`tracing` in the service layer, `log` in
//! the backends). The binary installs one subscriber through this module;
//! `log` records are bridged into it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Crates whose output is capped regardless of verbosity
const QUIET_CRATES: &[&str] = &["ort=warn", "hyper=warn", "reqwest=warn"];

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable console output with colors
    #[default]
    Console,
    /// Compact console output without colors, for CI and containers
    Compact,
    /// JSON structured logging for log aggregation
    #[cfg(feature = "tracing-json")]
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format '{other}'")),
        }
    }
}

/// Subscriber settings collected from the command line
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Count of `-v` flags
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit directives; wins over both `RUST_LOG` and `verbosity`
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Base level for the `-v` count
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: startup, requests, shutdown
            1 => "debug", // -v: per-stage details
            _ => "trace", // -vv+: everything
        }
    }

    /// Filter directives used when no explicit filter is configured
    #[must_use]
    pub fn default_directives(&self) -> String {
        std::iter::once(self.verbosity_to_filter())
            .chain(QUIET_CRATES.iter().copied())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Resolve the filter: explicit filter, then `RUST_LOG`, then verbosity
    ///
    /// # Errors
    /// - Invalid filter directives
    pub fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(env_filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(env_filter)?);
        }

        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
            _ => Ok(EnvFilter::try_new(self.default_directives())?),
        }
    }

    /// Install the global subscriber
    ///
    /// Compact and JSON output also log each closed span with its busy time.
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt::{self, format::FmtSpan};

        let filter = self.build_filter()?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => registry
                .with(fmt::layer().with_ansi(true).with_target(true).compact())
                .try_init()?,

            TracingFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .compact(),
                )
                .try_init()?,

            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init()?,
        }

        tracing::debug!(
            verbosity = self.verbosity,
            format = ?self.format,
            "Tracing initialized"
        );

        Ok(())
    }
}
