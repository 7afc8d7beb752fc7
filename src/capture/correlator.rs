//! Merges unordered lifecycle events into one record per request.
//!
//! The browser delivers start, header-send, completion, error and body events
//! for the same request as independent callbacks with no ordering guarantee.
//! Events that arrive before the `request-started` event are stashed by
//! identifier and merged when the record is created.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace};

use super::event::{BodyCapture, Header, LifecycleEvent, RequestId, RequestInfo, TabId};
use crate::classify::{Kind, sniffed_kind};

/// Progress of a request as seen by the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Completed,
    Errored,
}

/// Consolidated view of one request. Consumers only ever see clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: RequestId,
    pub tab_id: TabId,
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    pub request_headers: Vec<Header>,
    pub response_headers: Vec<Header>,
    pub content_type: String,
    pub kind: Kind,
    pub state: RequestState,
    /// Total bytes observed for the body.
    pub size: u64,
    /// Captured body, absent when nothing was captured or the ceiling was hit.
    pub chunks: Option<Vec<Bytes>>,
    /// False when the body tap ended with an error.
    pub body_complete: bool,
}

impl RequestRecord {
    fn from_info(info: RequestInfo) -> Self {
        Self {
            id: info.id,
            tab_id: info.tab_id,
            url: info.url,
            method: info.method,
            status: info.status,
            request_headers: info.request_headers,
            response_headers: info.response_headers,
            content_type: info.content_type,
            kind: info.kind,
            state: RequestState::Pending,
            size: 0,
            chunks: None,
            body_complete: false,
        }
    }

    fn refresh_response(&mut self, info: RequestInfo) {
        self.url = info.url;
        self.method = info.method;
        self.status = info.status;
        self.response_headers = info.response_headers;
        self.content_type = info.content_type;
        let previous = self.kind;
        self.kind = info.kind;
        if !info.request_headers.is_empty() {
            self.request_headers = info.request_headers;
        }
        // A body sniffed earlier still holds: re-apply its promotion quietly.
        if sniffed_kind(self.kind, &self.content_type, self.chunks.as_deref()) == Some(previous) {
            self.kind = previous;
        }
    }

    fn merge_body(&mut self, body: BodyCapture) {
        self.size = body.length;
        self.chunks = body.chunks;
        self.body_complete = body.success;
    }

    /// Promotes `etc` to `streaming` when an untyped body looks like a
    /// manifest. Returns true only on the call that changed the kind.
    pub fn promote_kind(&mut self) -> bool {
        match sniffed_kind(self.kind, &self.content_type, self.chunks.as_deref()) {
            Some(kind) => {
                debug!(id = %self.id, url = %self.url, "untyped body sniffed as manifest");
                self.kind = kind;
                true
            }
            None => false,
        }
    }
}

/// Change applied to an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    /// Snapshot after the change.
    pub row: RequestRecord,
    /// Kind before the change, to detect promotions.
    pub previous_kind: Kind,
}

impl RowUpdate {
    #[must_use]
    pub fn kind_changed(&self) -> bool {
        self.previous_kind != self.row.kind
    }
}

/// Result of feeding one event to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new record was created.
    Created(RequestId),
    /// An existing record changed.
    Updated(RowUpdate),
    /// Held until the matching `request-started` arrives.
    Stashed,
}

/// Primary record map plus one stash per event type that may arrive early.
#[derive(Debug, Default)]
pub struct Correlator {
    records: HashMap<RequestId, RequestRecord>,
    order: Vec<RequestId>,
    body_stash: HashMap<RequestId, BodyCapture>,
    header_stash: HashMap<RequestId, Vec<Header>>,
    state_stash: HashMap<RequestId, RequestState>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event and reports what changed.
    pub fn apply(&mut self, event: LifecycleEvent) -> Applied {
        match event {
            LifecycleEvent::RequestStarted(info) => self.on_started(info),
            LifecycleEvent::RequestHeadersSent(info) => self.on_headers_sent(info),
            LifecycleEvent::RequestCompleted(info) => self.on_finished(&info.id, RequestState::Completed),
            LifecycleEvent::RequestErrored(info) => self.on_finished(&info.id, RequestState::Errored),
            LifecycleEvent::BodyCaptured(body) => self.on_body(body),
        }
    }

    fn on_started(&mut self, info: RequestInfo) -> Applied {
        let id = info.id.clone();
        if let Some(record) = self.records.get_mut(&id) {
            let previous_kind = record.kind;
            record.refresh_response(info);
            trace!(id = %id, "request restarted, response fields refreshed");
            return Applied::Updated(RowUpdate {
                row: record.clone(),
                previous_kind,
            });
        }

        let mut record = RequestRecord::from_info(info);
        if let Some(body) = self.body_stash.remove(&id) {
            trace!(id = %id, "merging stashed body capture");
            record.merge_body(body);
            record.promote_kind();
        }
        if let Some(headers) = self.header_stash.remove(&id) {
            trace!(id = %id, "merging stashed request headers");
            record.request_headers = headers;
        }
        if let Some(state) = self.state_stash.remove(&id) {
            trace!(id = %id, ?state, "merging stashed final state");
            record.state = state;
        }
        self.order.push(id.clone());
        self.records.insert(id.clone(), record);
        Applied::Created(id)
    }

    fn on_headers_sent(&mut self, info: RequestInfo) -> Applied {
        match self.records.get_mut(&info.id) {
            Some(record) => {
                record.request_headers = info.request_headers;
                Applied::Updated(RowUpdate {
                    previous_kind: record.kind,
                    row: record.clone(),
                })
            }
            None => {
                self.header_stash.insert(info.id, info.request_headers);
                Applied::Stashed
            }
        }
    }

    fn on_finished(&mut self, id: &RequestId, state: RequestState) -> Applied {
        let Some(record) = self.records.get_mut(id) else {
            self.state_stash.insert(id.clone(), state);
            return Applied::Stashed;
        };
        record.state = state;
        Applied::Updated(RowUpdate {
            previous_kind: record.kind,
            row: record.clone(),
        })
    }

    fn on_body(&mut self, body: BodyCapture) -> Applied {
        match self.records.get_mut(&body.id) {
            Some(record) => {
                let previous_kind = record.kind;
                record.merge_body(body);
                record.promote_kind();
                Applied::Updated(RowUpdate {
                    row: record.clone(),
                    previous_kind,
                })
            }
            None => {
                self.body_stash.insert(body.id.clone(), body);
                Applied::Stashed
            }
        }
    }

    /// Looks up a record by identifier.
    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<&RequestRecord> {
        self.records.get(id)
    }

    /// All records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &RequestRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of early events still waiting for their record.
    #[must_use]
    pub fn stashed(&self) -> usize {
        self.body_stash.len() + self.header_stash.len() + self.state_stash.len()
    }

    /// Drops every record and stash entry.
    pub fn clear(&mut self) {
        debug!(records = self.records.len(), "clearing captured requests");
        self.records.clear();
        self.order.clear();
        self.body_stash.clear();
        self.header_stash.clear();
        self.state_stash.clear();
    }
}
