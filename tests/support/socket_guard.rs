//! Mock-server startup that tolerates sandboxes without loopback sockets.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "ARCHIVE_FETCH_REQUIRE_SOCKET_TESTS";

/// Starts a wiremock server, or returns `None` when localhost cannot be bound.
///
/// Panics instead of skipping when `ARCHIVE_FETCH_REQUIRE_SOCKET_TESTS` is set
/// to `1`, `true` or `yes`.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let caller = std::panic::Location::caller();
    async move {
        if TcpListener::bind("127.0.0.1:0").is_ok() {
            return Some(MockServer::start().await);
        }
        let required = std::env::var(REQUIRE_ENV)
            .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        assert!(!required, "cannot bind a localhost socket for {caller}");
        eprintln!("skipping {caller}: cannot bind a localhost socket (set {REQUIRE_ENV}=1 to fail)");
        None
    }
}

/// Return value for a test skipped by [`start_mock_server_or_skip`].
pub fn socket_skip_return() -> Result<(), Box<dyn std::error::Error>> {
    Ok(())
}
