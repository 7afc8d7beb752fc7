//! Per-session token and the header rewrite convention built on it.
//!
//! Some request headers (`Origin`, `Referer`, ...) cannot be set directly by
//! the code that issues segment fetches. Instead such a header is sent under
//! a session-scoped alias, `x-netmon-<token>-<name>`, and demoted back to
//! `<name>` at send time, replacing any header of that name.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;

use super::event::Header;

const TOKEN_LEN: usize = 16;
const PREFIX_HEAD: &str = "x-netmon-";

/// Random token generated once per process and passed to everything that
/// issues outgoing fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    token: String,
    prefix: String,
}

impl SessionToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        Self::from_token(token)
    }

    /// Builds a session around a known token (tests, replays).
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into().to_ascii_lowercase();
        let prefix = format!("{PREFIX_HEAD}{token}-");
        Self { token, prefix }
    }

    /// The token itself.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Lower-case header-name prefix marking a rewrite alias.
    #[must_use]
    pub fn rewrite_prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the alias under which `name` must be sent.
    #[must_use]
    pub fn prefixed(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_lowercase())
    }

    /// Returns the demoted header name if `name` carries the rewrite prefix.
    #[must_use]
    pub fn demoted_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let head = name.get(..self.prefix.len())?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let target = &name[self.prefix.len()..];
        (!target.is_empty()).then_some(target)
    }

    /// Applies the rewrite convention to an outgoing header list.
    ///
    /// Every prefixed header is demoted to its target name, and any other
    /// header with that name (case-insensitive) is dropped. Demoted headers
    /// are appended after the untouched ones.
    #[must_use]
    pub fn rewrite_headers(&self, headers: &[Header]) -> Vec<Header> {
        let overrides: Vec<Header> = headers
            .iter()
            .filter_map(|h| self.demoted_name(&h.name).map(|n| Header::new(n, h.value.clone())))
            .collect();
        if overrides.is_empty() {
            return headers.to_vec();
        }

        let mut out: Vec<Header> = headers
            .iter()
            .filter(|h| self.demoted_name(&h.name).is_none())
            .filter(|h| !overrides.iter().any(|o| o.name.eq_ignore_ascii_case(&h.name)))
            .cloned()
            .collect();
        out.extend(overrides);
        out
    }

    /// Strips the rewrite prefix from names without deduplicating.
    ///
    /// Used when recording the header list that was actually requested.
    #[must_use]
    pub fn strip_prefix(&self, headers: &[Header]) -> Vec<Header> {
        headers
            .iter()
            .map(|h| match self.demoted_name(&h.name) {
                Some(name) => Header::new(name, h.value.clone()),
                None => h.clone(),
            })
            .collect()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
