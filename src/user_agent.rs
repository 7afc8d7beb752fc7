//! User-Agent string sent by every outgoing fetch.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/netmon";

/// Default User-Agent for manifest, segment and chunked downloads.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("netmon/{version} (stream-capture; +{PROJECT_UA_URL})")
}
