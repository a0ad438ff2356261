//! Command line and configuration file handling
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults, an optional YAML file, then flags / environment.
//!
//! ```yaml
//! source: /var/lib/optail/oplog.jsonl
//! filter: "orders.*"
//! label: etl1
//! checkpoint_file: /var/lib/optail/checkpoints.json
//! workers: 4
//! retry:
//!   max_retries: -1
//!   initial_delay_ms: 500
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use optail::common::RetryBudget;
use optail::{RetryConfig, TailerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Default location of the checkpoint file
pub const DEFAULT_CHECKPOINT_FILE: &str = "optail-checkpoints.json";

/// optail - tail a replication log and log every insert, update and delete
#[derive(Parser, Debug)]
#[command(name = "optail")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON-lines oplog file to tail
    #[arg(short, long, env = "OPTAIL_SOURCE")]
    pub source: Option<PathBuf>,

    /// Namespace filter (regular expression)
    #[arg(short, long, env = "OPTAIL_FILTER")]
    pub filter: Option<String>,

    /// Checkpoint label
    #[arg(short, long, env = "OPTAIL_LABEL")]
    pub label: Option<String>,

    /// Checkpoint file
    #[arg(long, env = "OPTAIL_CHECKPOINT_FILE")]
    pub checkpoint_file: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, env = "OPTAIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dispatch workers
    #[arg(short, long, env = "OPTAIL_WORKERS")]
    pub workers: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "OPTAIL_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<PathBuf>,
    pub filter: Option<String>,
    pub label: Option<String>,
    pub checkpoint_file: Option<PathBuf>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub reconnect_await_ms: Option<u64>,
    pub checkpoint_interval_ms: Option<u64>,
    pub retry: Option<RetryFileConfig>,
}

/// `retry:` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryFileConfig {
    /// -1 retries forever, 0 disables reconnects
    pub max_retries: Option<i32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

impl RetryFileConfig {
    fn to_retry_config(&self) -> RetryConfig {
        let mut builder = RetryConfig::builder();
        if let Some(max_retries) = self.max_retries {
            builder = builder.budget(RetryBudget::from_signed(max_retries.into()));
        }
        if let Some(ms) = self.initial_delay_ms {
            builder = builder.retry_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_delay_ms {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = self.jitter {
            builder = builder.jitter(jitter);
        }
        builder.build()
    }
}

impl FileConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&expanded).context("Failed to parse config")
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: PathBuf,
    pub checkpoint_file: PathBuf,
    pub poll_interval: Option<Duration>,
    pub tailer: TailerConfig,
}

impl Settings {
    /// Merge flags over the file configuration.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let Some(source) = cli.source.clone().or(file.source) else {
            bail!("No log source given: pass --source or set `source` in the config file");
        };
        let Some(label) = cli.label.clone().or(file.label) else {
            bail!("No checkpoint label given: pass --label or set `label` in the config file");
        };
        let filter = cli.filter.clone().or(file.filter).unwrap_or_default();

        let mut builder = TailerConfig::builder().filter_pattern(filter).label(label);
        if let Some(workers) = cli.workers.or(file.workers) {
            builder = builder.workers(workers);
        }
        if let Some(capacity) = file.queue_capacity {
            builder = builder.queue_capacity(capacity);
        }
        if let Some(ms) = file.reconnect_await_ms {
            builder = builder.reconnect_await(Duration::from_millis(ms));
        }
        if let Some(ms) = file.checkpoint_interval_ms {
            builder = builder.checkpoint_interval(Duration::from_millis(ms));
        }
        if let Some(retry) = &file.retry {
            builder = builder.retry(retry.to_retry_config());
        }

        Ok(Self {
            source,
            checkpoint_file: cli
                .checkpoint_file
                .clone()
                .or(file.checkpoint_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_FILE)),
            poll_interval: file.poll_interval_ms.map(Duration::from_millis),
            tailer: builder.build().context("Invalid tailer configuration")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("optail").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_only() {
        let cli = parse(&["--source", "oplog.jsonl", "--filter", "orders.*", "--label", "etl1"]);
        let settings = Settings::resolve(&cli, FileConfig::default()).unwrap();

        assert_eq!(settings.source, PathBuf::from("oplog.jsonl"));
        assert_eq!(settings.checkpoint_file, PathBuf::from(DEFAULT_CHECKPOINT_FILE));
        assert_eq!(settings.tailer.filter_pattern, "orders.*");
        assert_eq!(settings.tailer.label, "etl1");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig::from_yaml(
            r#"
source: /data/oplog.jsonl
filter: "users.*"
label: from-file
workers: 8
reconnect_await_ms: 250
retry:
  max_retries: 3
  initial_delay_ms: 10
"#,
        )
        .unwrap();
        let cli = parse(&["--label", "from-flag", "--workers", "2"]);
        let settings = Settings::resolve(&cli, file).unwrap();

        assert_eq!(settings.source, PathBuf::from("/data/oplog.jsonl"));
        assert_eq!(settings.tailer.filter_pattern, "users.*");
        assert_eq!(settings.tailer.label, "from-flag");
        assert_eq!(settings.tailer.workers, 2);
        assert_eq!(settings.tailer.reconnect_await, Duration::from_millis(250));
        assert_eq!(settings.tailer.retry.max_retries(), Some(3));
        assert_eq!(settings.tailer.retry.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_missing_label_rejected() {
        let cli = parse(&["--source", "oplog.jsonl"]);
        let err = Settings::resolve(&cli, FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("label"));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let cli = parse(&["--source", "x", "--label", "a", "--filter", "orders["]);
        assert!(Settings::resolve(&cli, FileConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(FileConfig::from_yaml("lable: typo\n").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(FileConfig::from_yaml("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("OPTAIL_TEST_LABEL", "expanded");
        let file = FileConfig::from_yaml(
            "label: ${OPTAIL_TEST_LABEL}\nfilter: ${OPTAIL_TEST_UNSET_FILTER:-orders}\n",
        )
        .unwrap();

        assert_eq!(file.label.as_deref(), Some("expanded"));
        assert_eq!(file.filter.as_deref(), Some("orders"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("optail.yaml");
        std::fs::write(&path, "source: oplog.jsonl\nlabel: disk\npoll_interval_ms: 20\n").unwrap();

        let file = FileConfig::from_file(&path).unwrap();
        let settings = Settings::resolve(&parse(&[]), file).unwrap();
        assert_eq!(settings.tailer.label, "disk");
        assert_eq!(settings.poll_interval, Some(Duration::from_millis(20)));
    }
}
