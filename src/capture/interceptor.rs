//! Interception context: turns browser callbacks into lifecycle events.
//!
//! The browser's request-filtering primitives are an external capability;
//! whoever hosts them calls the `on_*` methods below and forwards the body
//! stream through [`Interceptor::on_before_request`]. Everything observed is
//! sent one-way to the consumer over an unbounded channel.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, trace};

use super::buffer::{CaptureBuffer, TapReport, TappedStream};
use super::event::{Header, LifecycleEvent, RequestId, RequestInfo, SENTINEL_TAB, TabId};
use super::session::SessionToken;
use crate::classify::{classify_content_type, normalize_content_type};
use crate::settings::CaptureSettings;

/// Settings messages accepted from the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    SetCapture(bool),
    SetBufferLimitKb(u64),
    /// Registers the tab hosting the consumer; replies with the session token.
    RegisterViewer(TabId),
    UnregisterViewer,
}

/// Acknowledgement for a [`ControlMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Ack,
    Session(SessionToken),
}

/// Interception-side state.
#[derive(Debug)]
pub struct Interceptor {
    settings: watch::Sender<Arc<CaptureSettings>>,
    session: SessionToken,
    events: mpsc::UnboundedSender<LifecycleEvent>,
}

impl Interceptor {
    /// Creates the interceptor and the receiving end of its event channel.
    #[must_use]
    pub fn new(
        session: SessionToken,
        initial: CaptureSettings,
    ) -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (settings, _) = watch::channel(Arc::new(initial));
        (
            Self {
                settings,
                session,
                events,
            },
            receiver,
        )
    }

    /// Current settings snapshot.
    #[must_use]
    pub fn settings(&self) -> Arc<CaptureSettings> {
        Arc::clone(&self.settings.borrow())
    }

    /// Subscribes to settings replacements.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CaptureSettings>> {
        self.settings.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// Applies a settings message by publishing a replacement snapshot.
    #[instrument(level = "debug", skip(self))]
    pub fn handle_control(&self, message: ControlMessage) -> ControlReply {
        let mut next = CaptureSettings::clone(&self.settings());
        let reply = match message {
            ControlMessage::SetCapture(enabled) => {
                info!(enabled, "capture toggled");
                next.capture_enabled = enabled;
                ControlReply::Ack
            }
            ControlMessage::SetBufferLimitKb(kb) => {
                next.buffer_limit_bytes = kb.saturating_mul(1024);
                debug!(bytes = next.buffer_limit_bytes, "capture ceiling updated");
                ControlReply::Ack
            }
            ControlMessage::RegisterViewer(tab) => {
                info!(tab = %tab, "viewer tab registered");
                next.viewer_tab = Some(tab);
                ControlReply::Session(self.session.clone())
            }
            ControlMessage::UnregisterViewer => {
                next.viewer_tab = None;
                ControlReply::Ack
            }
        };
        self.settings.send_replace(Arc::new(next));
        reply
    }

    /// True when traffic from `tab` is never captured.
    fn is_excluded(settings: &CaptureSettings, tab: TabId) -> bool {
        tab == SENTINEL_TAB || settings.viewer_tab == Some(tab)
    }

    fn should_capture(&self, tab: TabId) -> bool {
        let settings = self.settings.borrow();
        settings.capture_enabled && !Self::is_excluded(&settings, tab)
    }

    /// Wraps a response body in a transparent capture tap.
    ///
    /// The returned stream yields exactly what `body` yields. When capture is
    /// active for `tab`, a `body-captured` event follows the end of the stream.
    pub fn on_before_request<S>(&self, id: RequestId, tab: TabId, body: S) -> TappedStream<S>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
    {
        if !self.should_capture(tab) {
            trace!(id = %id, tab = %tab, "body not captured");
            return TappedStream::passthrough(body);
        }
        let ceiling = self.settings.borrow().buffer_limit_bytes;
        TappedStream::new(
            body,
            Some(TapReport {
                id,
                tab_id: tab,
                buffer: CaptureBuffer::new(ceiling),
                events: self.events.clone(),
            }),
        )
    }

    /// Header-send hook. Always returns the rewritten header list to send.
    pub fn on_before_send_headers(&self, mut info: RequestInfo) -> Vec<Header> {
        let rewritten = self.session.rewrite_headers(&info.request_headers);
        if self.should_capture(info.tab_id) {
            info.request_headers = rewritten.clone();
            self.emit(LifecycleEvent::RequestHeadersSent(info));
        }
        rewritten
    }

    /// Response headers arrived.
    pub fn on_response_started(&self, info: RequestInfo) {
        self.forward(info, LifecycleEvent::RequestStarted);
    }

    /// Request finished successfully.
    pub fn on_completed(&self, info: RequestInfo) {
        self.forward(info, LifecycleEvent::RequestCompleted);
    }

    /// Request failed at the network level.
    pub fn on_error(&self, info: RequestInfo) {
        self.forward(info, LifecycleEvent::RequestErrored);
    }

    fn forward(&self, mut info: RequestInfo, wrap: fn(RequestInfo) -> LifecycleEvent) {
        if !self.should_capture(info.tab_id) {
            return;
        }
        classify_info(&mut info);
        self.emit(wrap(info));
    }

    fn emit(&self, event: LifecycleEvent) {
        trace!(kind = event.label(), id = %event.request_id(), "emitting event");
        // A closed channel means the consumer went away; nothing to do.
        let _ = self.events.send(event);
    }
}

/// Fills `content_type` and `kind` from the `content-type` response header.
fn classify_info(info: &mut RequestInfo) {
    let raw = info
        .response_headers
        .iter()
        .rev()
        .find(|h| h.name.eq_ignore_ascii_case("content-type"))
        .map(|h| h.value.as_str());
    if let Some(raw) = raw {
        info.content_type = normalize_content_type(raw);
    }
    info.kind = classify_content_type(&info.content_type);
}
