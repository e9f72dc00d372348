//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Destination root used when neither the CLI nor the config file sets one.
pub const DEFAULT_OUTPUT_DIR: &str = "downloads/recitation";

/// Mirror every file of an archive item into a local directory.
///
/// Files already present are skipped, partial files are resumed, and an
/// `index.json` manifest records the result of every file.
#[derive(Parser, Debug)]
#[command(name = "archive-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// Item URL (`https://archive.org/details/<id>` or `.../download/<id>`)
    pub item_url: String,

    /// Destination root; files go to `<DIR>/<identifier>/`
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Use exactly N concurrent downloads instead of sizing from CPU load (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// CPU utilization ceiling used to size the worker pool, in percent (1-100)
    #[arg(long, value_name = "PCT", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub target_cpu: Option<u8>,

    /// Upper bound on the CPU-sized worker count (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_workers: Option<u8>,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://archive.org/details/item";

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["archive-fetch", URL]).unwrap();
        assert_eq!(args.item_url, URL);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.no_progress);
        assert!(args.output_dir.is_none());
        assert!(args.workers.is_none());
        assert!(args.target_cpu.is_none());
        assert!(args.max_workers.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_cli_item_url_required() {
        let result = Args::try_parse_from(["archive-fetch"]);
        let err = result.unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["archive-fetch", URL, "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["archive-fetch", URL, "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["archive-fetch", "--verbose", "--verbose", URL]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["archive-fetch", URL, "-q"]).unwrap();
        assert!(args.quiet);

        let args = Args::try_parse_from(["archive-fetch", URL, "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["archive-fetch", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["archive-fetch", "--version"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["archive-fetch", URL, "--invalid-flag"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_output_dir_flags() {
        let args = Args::try_parse_from(["archive-fetch", URL, "-o", "/tmp/out"]).unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));

        let args = Args::try_parse_from(["archive-fetch", URL, "--output-dir", "out"]).unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_cli_workers_short_and_long_flag() {
        let args = Args::try_parse_from(["archive-fetch", URL, "-w", "5"]).unwrap();
        assert_eq!(args.workers, Some(5));

        let args = Args::try_parse_from(["archive-fetch", URL, "--workers", "100"]).unwrap();
        assert_eq!(args.workers, Some(100));
    }

    #[test]
    fn test_cli_workers_zero_rejected() {
        let result = Args::try_parse_from(["archive-fetch", URL, "-w", "0"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_workers_over_max_rejected() {
        let result = Args::try_parse_from(["archive-fetch", URL, "-w", "101"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_target_cpu_range() {
        let args = Args::try_parse_from(["archive-fetch", URL, "--target-cpu", "75"]).unwrap();
        assert_eq!(args.target_cpu, Some(75));

        let err = Args::try_parse_from(["archive-fetch", URL, "--target-cpu", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_max_workers_and_config() {
        let args = Args::try_parse_from([
            "archive-fetch",
            URL,
            "--max-workers",
            "8",
            "--config",
            "/etc/archive-fetch.toml",
            "--no-progress",
        ])
        .unwrap();
        assert_eq!(args.max_workers, Some(8));
        assert_eq!(args.config, Some(PathBuf::from("/etc/archive-fetch.toml")));
        assert!(args.no_progress);
    }
}
