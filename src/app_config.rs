//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

const CONFIG_DIR_NAME: &str = "archive-fetch";
const CONFIG_FILE_NAME: &str = "config.toml";

/// `key = value` file configuration for archive-fetch defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Default destination root.
    pub output_dir: Option<PathBuf>,
    /// Fixed worker count (disables CPU-based sizing).
    pub workers: Option<u8>,
    /// CPU utilization ceiling in percent.
    pub target_utilization: Option<u8>,
    /// Upper bound on the CPU-sized worker count.
    pub max_workers: Option<u8>,
    /// Interval between the two CPU counter readings.
    pub sample_interval_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP idle read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

fn percent_or_count(field: &str, value: u8) -> Result<u8> {
    if !(1..=100).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=100");
    }
    Ok(value)
}

fn sample_interval_ms(value: u64) -> Result<u64> {
    if value > 10_000 {
        bail!("Invalid config value for `sample_interval_ms`: {value}. Expected range: 0..=10000");
    }
    Ok(value)
}

fn timeout_secs(field: &str, value: u64) -> Result<u64> {
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(value)
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor CLI flags decide.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/archive-fetch/config.toml`
/// 2. `$HOME/.config/archive-fetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads configuration.
///
/// An explicit path must exist. The default path is optional: when it is
/// missing, an empty config is returned.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "workers" | "target_utilization" | "max_workers" => {
                let parsed = parse_integer_u8(value)
                    .and_then(|v| percent_or_count(key, v))
                    .with_context(context)?;
                match key {
                    "workers" => cfg.workers = Some(parsed),
                    "target_utilization" => cfg.target_utilization = Some(parsed),
                    _ => cfg.max_workers = Some(parsed),
                }
            }
            "sample_interval_ms" => {
                let parsed = parse_integer_u64(value)
                    .and_then(sample_interval_ms)
                    .with_context(context)?;
                cfg.sample_interval_ms = Some(parsed);
            }
            "connect_timeout_secs" => {
                let parsed = parse_integer_u64(value)
                    .and_then(|v| timeout_secs(key, v))
                    .with_context(context)?;
                cfg.connect_timeout_secs = Some(parsed);
            }
            "read_timeout_secs" => {
                let parsed = parse_integer_u64(value)
                    .and_then(|v| timeout_secs(key, v))
                    .with_context(context)?;
                cfg.read_timeout_secs = Some(parsed);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
workers = 8
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.workers, Some(8));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.output_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
output_dir = "/srv/recitation"
target_utilization = 75
max_workers = 12
sample_interval_ms = 250
connect_timeout_secs = 15
read_timeout_secs = 120
verbosity = "debug"
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/srv/recitation")));
        assert_eq!(cfg.target_utilization, Some(75));
        assert_eq!(cfg.max_workers, Some(12));
        assert_eq!(cfg.sample_interval_ms, Some(250));
        assert_eq!(cfg.connect_timeout_secs, Some(15));
        assert_eq!(cfg.read_timeout_secs, Some(120));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Debug));
    }

    #[test]
    fn test_parse_config_rejects_invalid_workers() {
        let err = parse_config_str("workers = 0").expect_err("invalid workers expected");
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_parse_config_rejects_target_utilization_over_100() {
        let err = parse_config_str("target_utilization = 101")
            .expect_err("invalid target_utilization expected");
        assert!(err.to_string().contains("target_utilization"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_sample_interval() {
        let err = parse_config_str("sample_interval_ms = 10001")
            .expect_err("invalid sample_interval_ms expected");
        assert!(err.to_string().contains("sample_interval_ms"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err =
            parse_config_str("workers = 4 trailing").expect_err("expected trailing token error");
        assert!(err.to_string().contains("workers"));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_reports_line_number() {
        let err = parse_config_str("workers = 4\n\nmax_workers = x")
            .expect_err("expected parse error");
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_config_range_error_reports_line_number() {
        let err = parse_config_str("workers = 2\nmax_workers = 200\n")
            .expect_err("out-of-range max_workers expected");
        assert!(err.to_string().contains("line 2"));
        assert!(format!("{err:#}").contains("Expected range: 1..=100"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
# defaults for the media box
workers = 4 # fixed pool
output_dir = "/data/#recitation" # hash inside quotes is kept
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.workers, Some(4));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/data/#recitation")));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("output_dir = /tmp").expect_err("unquoted string");
        assert!(err.to_string().contains("output_dir"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err =
            parse_config_str("connect_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("workers 4").expect_err("syntax error expected");
        assert!(err.to_string().contains("expected key = value"));
    }

    #[test]
    fn test_verbosity_log_level() {
        assert_eq!(VerbositySetting::Default.log_level(), "info");
        assert_eq!(VerbositySetting::Verbose.log_level(), "debug");
        assert_eq!(VerbositySetting::Debug.log_level(), "debug");
        assert_eq!(VerbositySetting::Quiet.log_level(), "error");
    }

    #[test]
    fn test_load_config_explicit_path() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_workers = 3\n").expect("write config");

        let cfg = load_config(Some(&path)).expect("config should load");
        assert_eq!(cfg.max_workers, Some(3));
    }

    #[test]
    fn test_load_config_explicit_missing_path_fails() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = load_config(Some(&dir.path().join("absent.toml"))).expect_err("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
