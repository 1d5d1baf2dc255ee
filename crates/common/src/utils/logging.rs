use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => anyhow::bail!("unknown log format '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `spout_client=debug,info`
    pub level: String,
    pub format: LogFormat,
    /// Mirror output to a daily-rolling file under `log_dir`
    pub file_logging: bool,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file_logging: false,
            log_dir: PathBuf::from("logs"),
            log_file: "spout.log".to_string(),
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// The configured level with any `RUST_LOG` directives appended, so the
    /// environment can narrow or widen individual targets.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = match std::env::var("RUST_LOG") {
            Ok(rust_log) if !rust_log.trim().is_empty() => format!("{},{}", self.level, rust_log),
            _ => self.level.clone(),
        };
        Ok(EnvFilter::try_new(directives)?)
    }
}

/// Installs the global subscriber.
///
/// Keep the returned guard alive for the whole process: dropping it stops the
/// file writer. `None` when file logging is off.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let console = match config.format {
        LogFormat::Json => fmt::layer().json().with_target(config.include_target).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(config.include_target).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(config.include_target).boxed(),
    };

    let mut guard = None;
    let file = if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
        let (writer, worker) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.log_dir, &config.log_file));
        guard = Some(worker);
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.include_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::info!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(guard)
}

/// Test-writer subscriber at debug level. Later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.file_logging);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("fancy".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_file, "spout.log");
        assert!(config.include_target);
    }

    #[test]
    fn test_env_filter() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.env_filter().unwrap().to_string().contains("warn"));

        let bad = LoggingConfig {
            level: "spout=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert!(bad.env_filter().is_err());
    }
}
