//! End-to-end CLI tests for the archive-fetch binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

fn archive_fetch() -> Command {
    let mut cmd = Command::cargo_bin("archive-fetch").unwrap();
    cmd.env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", "/nonexistent-archive-fetch-config");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    archive_fetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mirror every file of an archive item"))
        .stdout(predicate::str::contains("--workers"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    archive_fetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive-fetch"));
}

/// Test that the item URL is required.
#[test]
fn test_binary_missing_url_returns_error() {
    archive_fetch()
        .assert()
        .failure()
        .stderr(predicate::str::contains("ITEM_URL"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    archive_fetch()
        .args(["https://archive.org/details/x", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that a URL without an item identifier is rejected before any work.
#[test]
fn test_binary_rejects_url_without_identifier() {
    let dir = TempDir::new().unwrap();
    archive_fetch()
        .args(["https://archive.org/search?query=x", "-o"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("identifier"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Test that an out-of-range worker count is rejected by argument parsing.
#[test]
fn test_binary_rejects_zero_workers() {
    archive_fetch()
        .args(["https://archive.org/details/x", "-w", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0"));
}

/// Test that an invalid config file aborts with its line number.
#[test]
fn test_binary_invalid_config_reports_line() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "workers = 2\nmax_workers = 500\n").unwrap();

    archive_fetch()
        .args(["https://archive.org/details/x", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

/// Test a full run against a mock server: files land on disk and the manifest path is printed.
#[tokio::test]
async fn test_binary_downloads_item() -> Result<(), Box<dyn std::error::Error>> {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return socket_skip_return();
    };
    Mock::given(method("GET"))
        .and(path("/download/item-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<table><tr><th>Name</th><th>Date</th><th>Size</th></tr>\
             <tr><td><a href=\"a.mp3\">a.mp3</a></td><td>-</td><td>3</td></tr></table>",
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/download/item-1/a.mp3"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "3"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/item-1/a.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
        .mount(&mock_server)
        .await;
    let dir = TempDir::new()?;
    let item_url = format!("{}/details/item-1", mock_server.uri());
    let output_dir = dir.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        archive_fetch()
            .args([item_url.as_str(), "-w", "1", "--no-progress", "-q", "-o"])
            .arg(&output_dir)
            .assert()
    })
    .await?;

    output
        .success()
        .stdout(predicate::str::contains("1 downloaded"))
        .stdout(predicate::str::contains("index.json"));
    assert_eq!(
        std::fs::read(dir.path().join("item-1").join("a.mp3"))?,
        b"abc"
    );
    Ok(())
}
