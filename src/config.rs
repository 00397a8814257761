//! Configuration for rss2epub.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (and their RSS2EPUB_* environment variables)
//! 2. Config file (--config FILE, or .rss2epub/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .rss2epub/config.yaml
//! - Paths in config file are relative to the directory holding .rss2epub/
//!   (or to the file's own directory when given with --config)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::feed::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
use crate::core::DEFAULT_LANGUAGE;

/// Directory searched for during config discovery
pub const CONFIG_DIR: &str = ".rss2epub";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_FEED_LIST: &str = "rss_feed.txt";
pub const DEFAULT_HISTORY_DIR: &str = "history";
pub const DEFAULT_HISTORY_FILE: &str = "seen_posts.txt";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Errors that can occur loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Output directory for EPUB files
    pub output: Option<String>,
    /// Feed list file (monitor mode)
    pub feed_list: Option<String>,
    /// Directory holding per-feed history files (monitor mode)
    pub history_dir: Option<String>,
    /// History file (single-shot mode)
    pub history_file: Option<String>,
    /// Seconds between monitor cycles
    pub interval_seconds: Option<f64>,
    /// dc:language of generated books
    pub language: Option<String>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchConfig {
    pub timeout_seconds: Option<f64>,
    pub user_agent: Option<String>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub feed_list: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub interval: Option<Duration>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub feed_list: PathBuf,
    pub history_dir: PathBuf,
    pub history_file: PathBuf,
    pub interval: Duration,
    pub language: String,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    /// Path to config file (if one was used)
    pub config_file: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from the command line and an optional config file.
    ///
    /// With no explicit `config_path`, the current directory and its parents
    /// are searched.
    pub fn load(overrides: &Overrides, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        match config_path {
            Some(path) => {
                let config = load_config_file(&path)?;
                tracing::debug!(path = %path.display(), "Loaded config file");
                Self::resolve(overrides, Some((path.as_path(), &config)))
            }
            None => Self::resolve(overrides, None),
        }
    }

    /// Combine overrides, a parsed config file and defaults
    pub fn resolve(
        overrides: &Overrides,
        config: Option<(&Path, &ConfigFile)>,
    ) -> Result<Self, ConfigError> {
        let empty = ConfigFile::default();
        let (file, base_dir) = match config {
            Some((path, file)) => (file, Some(config_base_dir(path))),
            None => (&empty, None),
        };

        let path_setting = |cli: &Option<PathBuf>, from_file: &Option<String>, default: &str| {
            if let Some(path) = cli {
                path.clone()
            } else if let (Some(value), Some(base)) = (from_file, &base_dir) {
                resolve_path(base, value)
            } else {
                PathBuf::from(default)
            }
        };

        let interval = match (overrides.interval, file.interval_seconds) {
            (Some(interval), _) => interval,
            (None, Some(secs)) => positive_duration(secs).map_err(|reason| ConfigError::Invalid {
                field: "interval_seconds",
                reason,
            })?,
            (None, None) => DEFAULT_INTERVAL,
        };

        let fetch_timeout = match file.fetch.timeout_seconds {
            Some(secs) => positive_duration(secs).map_err(|reason| ConfigError::Invalid {
                field: "fetch.timeout_seconds",
                reason,
            })?,
            None => DEFAULT_FETCH_TIMEOUT,
        };

        let language = match file.language.as_deref().map(str::trim) {
            Some("") => {
                return Err(ConfigError::Invalid {
                    field: "language",
                    reason: "must not be empty".to_string(),
                })
            }
            Some(language) => language.to_string(),
            None => DEFAULT_LANGUAGE.to_string(),
        };

        Ok(Self {
            output_dir: path_setting(&overrides.output, &file.output, DEFAULT_OUTPUT_DIR),
            feed_list: path_setting(&overrides.feed_list, &file.feed_list, DEFAULT_FEED_LIST),
            history_dir: path_setting(&overrides.history_dir, &file.history_dir, DEFAULT_HISTORY_DIR),
            history_file: path_setting(
                &overrides.history_file,
                &file.history_file,
                DEFAULT_HISTORY_FILE,
            ),
            interval,
            language,
            fetch_timeout,
            user_agent: file
                .fetch
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            config_file: config.map(|(path, _)| path.to_path_buf()),
        })
    }
}

/// Parse a positive number of seconds (fractions allowed)
pub fn parse_interval(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    positive_duration(secs)
}

fn positive_duration(secs: f64) -> Result<Duration, String> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("must be a positive number of seconds, got {}", secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory relative config paths are resolved against
fn config_base_dir(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));

    // .rss2epub/config.yaml -> project root
    if parent.file_name().map_or(false, |name| name == CONFIG_DIR) {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Resolve a path that may be relative to the config base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::resolve(&Overrides::default(), None).unwrap();

        assert_eq!(settings.output_dir, PathBuf::from("output"));
        assert_eq!(settings.feed_list, PathBuf::from("rss_feed.txt"));
        assert_eq!(settings.history_file, PathBuf::from("seen_posts.txt"));
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.language, "en");
        assert!(settings.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
output: books
feed_list: feeds.txt
interval_seconds: 60
language: fr
fetch:
  timeout_seconds: 10
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.output.as_deref(), Some("books"));
        assert_eq!(config.interval_seconds, Some(60.0));
        assert_eq!(config.fetch.timeout_seconds, Some(10.0));

        let settings =
            Settings::resolve(&Overrides::default(), Some((config_path.as_path(), &config)))
                .unwrap();

        // Relative to the directory holding .rss2epub/
        assert_eq!(settings.output_dir, temp.path().join("books"));
        assert_eq!(settings.feed_list, temp.path().join("feeds.txt"));
        assert_eq!(settings.history_dir, PathBuf::from("history"));
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
        assert_eq!(settings.language, "fr");
        assert_eq!(settings.config_file, Some(config_path));
    }

    #[test]
    fn test_overrides_win() {
        let config = ConfigFile {
            output: Some("from-file".to_string()),
            interval_seconds: Some(60.0),
            ..Default::default()
        };
        let overrides = Overrides {
            output: Some(PathBuf::from("from-cli")),
            interval: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        let settings =
            Settings::resolve(&overrides, Some((Path::new("/etc/rss2epub.yaml"), &config))).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("from-cli"));
        assert_eq!(settings.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_interval_in_file() {
        let config = ConfigFile {
            interval_seconds: Some(0.0),
            ..Default::default()
        };
        let result = Settings::resolve(&Overrides::default(), Some((Path::new("/c.yaml"), &config)));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "interval_seconds",
                ..
            })
        ));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("0.5").unwrap(), Duration::from_millis(500));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-5").is_err());
        assert!(parse_interval("soon").is_err());
        assert!(parse_interval("inf").is_err());
        assert!(parse_interval("NaN").is_err());
    }

    #[test]
    fn test_config_base_dir() {
        assert_eq!(
            config_base_dir(Path::new("/home/user/project/.rss2epub/config.yaml")),
            PathBuf::from("/home/user/project")
        );
        assert_eq!(
            config_base_dir(Path::new("/etc/rss2epub/custom.yaml")),
            PathBuf::from("/etc/rss2epub")
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
