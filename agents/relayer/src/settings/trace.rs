use eyre::Result;
use serde::Deserialize;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Warn
    Warn = 2,
    /// Debug
    Debug = 4,
    /// Trace
    Trace = 5,
    /// Info
    #[serde(other)]
    #[default]
    Info = 3,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Output format of the stdout log layer
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Multi-line, human readable
    #[default]
    Pretty,
    /// Single line, abbreviated
    Compact,
    /// Single line with every span field
    Full,
    /// One JSON object per event
    Json,
}

impl Style {
    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = tracing_subscriber::fmt::layer();
        match self {
            Style::Pretty => layer.pretty().boxed(),
            Style::Compact => layer.compact().boxed(),
            Style::Full => layer.boxed(),
            Style::Json => layer.json().boxed(),
        }
    }
}

/// Configuration for the tracing subscriber of the relayer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracingConfig {
    /// Log output format
    #[serde(default)]
    pub fmt: Style,
    /// Most verbose level logged
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    fn targets(&self) -> Targets {
        let mut targets = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            targets = targets.with_target("hyper", Level::Info);
            targets = targets.with_target("reqwest", Level::Info);
            targets = targets.with_target("h2", Level::Info);
        }
        targets
    }

    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let subscriber = tracing_subscriber::Registry::default()
            .with(self.targets())
            .with(self.fmt.layer())
            .with(tracing_error::ErrorLayer::default());

        subscriber.try_init()?;
        Ok(())
    }
}
