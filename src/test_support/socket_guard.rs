use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "NETMON_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }
    let message = "[socket-bound-test] cannot bind localhost socket; wiremock-based test cannot run here";
    if socket_tests_required() {
        panic!("{message}. Set {REQUIRE_ENV}=0 to allow local skip behavior.");
    }
    eprintln!("{message}. Skipping test. Set {REQUIRE_ENV}=1 to fail-fast instead.");
    true
}

pub(crate) async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
