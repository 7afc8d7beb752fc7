//! Metadata sidecar written next to a reassembled stream.
//!
//! The sidecar records what is needed to reproduce the download: the
//! user agent, the request headers as the server saw them (session aliases
//! demoted) and the playlist directives.
//!
//! ```json
//! {
//!   "userAgent": "netmon/0.1.0 (...)",
//!   "headerList": [{ "name": "referer", "value": "https://page.example/" }],
//!   "extInfo": { "#EXT-X-TARGETDURATION": "10" }
//! }
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::event::Header;
use crate::capture::session::SessionToken;
use crate::store::StoreError;
use crate::user_agent;

/// Sidecar document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    pub user_agent: String,
    pub header_list: Vec<Header>,
    pub ext_info: BTreeMap<String, String>,
}

impl MetaInfo {
    /// Builds the document for one job.
    ///
    /// `headers` are the job's request headers; alias prefixes are stripped
    /// but duplicates are kept. A `User-Agent` header among them overrides the
    /// client default.
    #[must_use]
    pub fn new(session: &SessionToken, headers: &[Header], ext_info: BTreeMap<String, String>) -> Self {
        let header_list = session.strip_prefix(headers);
        let user_agent = header_list
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case("user-agent"))
            .map_or_else(user_agent::default_user_agent, |h| h.value.clone());
        Self {
            user_agent,
            header_list,
            ext_info,
        }
    }

    /// Pretty JSON bytes, ready for a save target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<Bytes, StoreError> {
        let json = serde_json::to_vec_pretty(self)?;
        debug!(bytes = json.len(), headers = self.header_list.len(), "sidecar serialized");
        Ok(Bytes::from(json))
    }
}
