use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::Spanned;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::format_diagnostics;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::LoadError;
use super::diagnostics::SourceInfo;
use super::diagnostics::ValidationError;
use super::partial::PartialConfig;
use crate::measurements::RowOrder;
use crate::pagination::PageSizeOption;
use crate::range::parse_instant;
use crate::range::TimeRange;

/// Backend used when no config sets `backend.base_url`.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub measurements: MeasurementsConfig,
}

// Deserialize is needed because PartialLoggingConfig wraps it in toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"homeview::backend" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter for these settings.
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Root URL of the REST backend
    pub base_url: String,

    /// Per-request timeout; unset means requests may wait indefinitely
    pub timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementsConfig {
    pub page_size: PageSizeOption,
    pub row_order: RowOrder,
    pub default_range: TimeRange,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Formatted diagnostics for every merge and validation error found
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Returns the config together with any warnings. Fails if any file
    /// can't be loaded or any merge/validation error was found, reporting
    /// all of them at once.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;
        let (partial, diagnostics) = PartialConfig::merge(configs);
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a merged PartialConfig to a Config, validating all fields
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let mut validation = Validation {
            source: partial.source.clone(),
            field_sources: partial.field_sources,
            errors: Vec::new(),
        };

        let logging = partial
            .logging
            .map(|logging| LoggingConfig {
                level: logging.level.map(Spanned::into_inner).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let backend = match partial.backend {
            Some(backend) => {
                let base_url = match backend.base_url {
                    Some(url) => validation.base_url(url),
                    None => DEFAULT_BASE_URL.to_string(),
                };
                let timeout = backend
                    .timeout_secs
                    .and_then(|secs| validation.timeout(secs));
                BackendConfig { base_url, timeout }
            }
            None => BackendConfig::default(),
        };

        let measurements = match partial.measurements {
            Some(m) => MeasurementsConfig {
                page_size: m.page_size.map(Spanned::into_inner).unwrap_or_default(),
                row_order: m.row_order.map(Spanned::into_inner).unwrap_or_default(),
                default_range: validation.range(m.start, m.end),
            },
            None => MeasurementsConfig::default(),
        };

        diagnostics.extend(
            validation
                .errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ConfigError::Invalid(format_diagnostics(&diagnostics)));
        }

        Ok((
            Config {
                logging,
                backend,
                measurements,
            },
            diagnostics,
        ))
    }
}

/// Collects validation errors; each check returns a usable fallback so the
/// remaining fields are still checked.
struct Validation {
    source: Option<SourceInfo>,
    field_sources: HashMap<String, SourceInfo>,
    errors: Vec<ValidationError>,
}

impl Validation {
    /// The file that set `field_path`, falling back to the first file loaded.
    fn source_of(&self, field_path: &str) -> Option<SourceInfo> {
        self.field_sources
            .get(field_path)
            .cloned()
            .or_else(|| self.source.clone())
    }

    fn push<T>(&mut self, field_path: &str, message: String, value: &Spanned<T>) {
        self.errors.push(ValidationError {
            field_path: field_path.to_string(),
            message,
            span: Some(value.span()),
            source: self.source_of(field_path),
        });
    }

    fn base_url(&mut self, url: Spanned<String>) -> String {
        let value = url.get_ref().trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            return value.to_string();
        }
        self.push(
            "backend.base_url",
            format!("'{}' must start with http:// or https://", value),
            &url,
        );
        DEFAULT_BASE_URL.to_string()
    }

    fn timeout(&mut self, secs: Spanned<i64>) -> Option<Duration> {
        match u64::try_from(*secs.get_ref()) {
            Ok(s) if s > 0 => Some(Duration::from_secs(s)),
            _ => {
                self.push(
                    "backend.timeout_secs",
                    format!("must be a positive number of seconds, got {}", secs.get_ref()),
                    &secs,
                );
                None
            }
        }
    }

    fn range(&mut self, start: Option<Spanned<String>>, end: Option<Spanned<String>>) -> TimeRange {
        let default = TimeRange::default();

        let mut instant = |field: &str, value: Option<Spanned<String>>, fallback| match value {
            Some(v) => match parse_instant(v.get_ref()) {
                Ok(instant) => Some(instant),
                Err(e) => {
                    self.push(field, e.to_string(), &v);
                    None
                }
            },
            None => Some(fallback),
        };

        let start = instant("measurements.start", start, default.start());
        let end = instant("measurements.end", end, default.end());

        match (start, end) {
            (Some(start), Some(end)) => TimeRange::new(start, end).unwrap_or_else(|e| {
                self.errors.push(ValidationError {
                    field_path: "measurements.start".to_string(),
                    message: e.to_string(),
                    span: None,
                    source: self.source_of("measurements.start"),
                });
                default
            }),
            _ => default,
        }
    }
}
