//! End-to-end tests for the capture pipeline: interceptor hooks feed the
//! event channel, and the dispatcher turns it into rows.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use netmon_core::capture::{
    ControlMessage, ControlReply, Dispatcher, Header, Interceptor, RequestId, RequestInfo, RequestRecord,
    RequestState, RowSink, RowUpdate, SessionToken, TabId,
};
use netmon_core::classify::Kind;
use netmon_core::settings::{KindFilter, Settings, ViewSettings};

#[derive(Default)]
struct Probe {
    rows: Mutex<Vec<RequestRecord>>,
}

impl Probe {
    fn ids(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| row.id.as_str().to_string())
            .collect()
    }
}

impl RowSink for Probe {
    fn add_rows(&self, rows: Vec<RequestRecord>) {
        self.rows.lock().unwrap().extend(rows);
    }

    fn update_row(&self, update: RowUpdate) {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|row| row.id == update.row.id) {
            Some(row) => *row = update.row,
            None => rows.push(update.row),
        }
    }

    fn reset(&self, rows: Vec<RequestRecord>) {
        *self.rows.lock().unwrap() = rows;
    }
}

fn response(id: &str, tab: i64, url: &str, content_type: &str) -> RequestInfo {
    let mut info = RequestInfo::new(id, TabId(tab), "GET", url);
    info.status = Some(200);
    if !content_type.is_empty() {
        info.response_headers = vec![Header::new("Content-Type", content_type)];
    }
    info
}

async fn drain_body(interceptor: &Interceptor, id: &str, tab: i64, parts: &[&'static [u8]]) -> Vec<u8> {
    let body = stream::iter(
        parts
            .iter()
            .map(|part| Ok::<Bytes, io::Error>(Bytes::from_static(part)))
            .collect::<Vec<_>>(),
    );
    let mut tapped = interceptor.on_before_request(RequestId::new(id), TabId(tab), body);
    let mut seen = Vec::new();
    while let Some(chunk) = tapped.next().await {
        seen.extend_from_slice(&chunk.unwrap());
    }
    seen
}

#[tokio::test]
async fn test_pipeline_builds_rows_and_skips_viewer_tab() {
    let session = SessionToken::from_token("pipe");
    let (interceptor, receiver) = Interceptor::new(session.clone(), Settings::default().capture());

    let reply = interceptor.handle_control(ControlMessage::RegisterViewer(TabId(99)));
    assert_eq!(reply, ControlReply::Session(session.clone()));

    let probe = Arc::new(Probe::default());
    let dispatcher = Dispatcher::new(probe.clone(), ViewSettings::default());
    let consumer = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.run(receiver).await }
    });

    // Body of a manifest served without a content type arrives before the
    // response event, then the headers are rewritten on the way out.
    let manifest: &'static [u8] = b"#EXTM3U\n#EXTINF:4,\nseg0.ts\n";
    let passed = drain_body(&interceptor, "m", 3, &[&manifest[..8], &manifest[8..]]).await;
    assert_eq!(passed, manifest);

    let mut outgoing = RequestInfo::new("m", TabId(3), "GET", "https://cdn.example/live.m3u8");
    outgoing.request_headers = vec![
        Header::new("Referer", "https://tab.example/"),
        Header::new(session.prefixed("Referer"), "https://player.example/"),
    ];
    let sent = interceptor.on_before_send_headers(outgoing);
    assert_eq!(sent, vec![Header::new("referer", "https://player.example/")]);

    interceptor.on_response_started(response("m", 3, "https://cdn.example/live.m3u8", ""));
    interceptor.on_completed(response("m", 3, "https://cdn.example/live.m3u8", ""));

    // Page traffic in a normal tab, and the viewer's own traffic.
    interceptor.on_response_started(response("p", 3, "https://tab.example/", "text/html; charset=utf-8"));
    interceptor.on_response_started(response("v", 99, "https://viewer.example/", "text/html"));
    let viewer_body = drain_body(&interceptor, "v", 99, &[b"<html>".as_slice()]).await;
    assert_eq!(viewer_body, b"<html>");

    drop(interceptor);
    consumer.await.unwrap();

    let records = dispatcher.records();
    assert_eq!(records.len(), 2);

    let manifest_row = records.iter().find(|r| r.id.as_str() == "m").unwrap();
    assert_eq!(manifest_row.kind, Kind::Streaming);
    assert_eq!(manifest_row.state, RequestState::Completed);
    assert_eq!(manifest_row.size, manifest.len() as u64);
    assert!(manifest_row.body_complete);
    assert_eq!(manifest_row.request_headers, sent);

    let page_row = records.iter().find(|r| r.id.as_str() == "p").unwrap();
    assert_eq!(page_row.kind, Kind::Html);
    assert_eq!(page_row.content_type, "text/html");

    let mut ids = probe.ids();
    ids.sort();
    assert_eq!(ids, ["m", "p"]);
}

#[tokio::test]
async fn test_view_change_and_capture_toggle() {
    let (interceptor, receiver) = Interceptor::new(SessionToken::from_token("view"), Settings::default().capture());
    let probe = Arc::new(Probe::default());
    let dispatcher = Dispatcher::new(probe.clone(), ViewSettings::default());
    let consumer = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.run(receiver).await }
    });

    interceptor.on_response_started(response("a", 1, "https://x/app.js", "application/javascript"));
    interceptor.on_response_started(response("b", 2, "https://x/clip.mp4", "video/mp4"));

    assert_eq!(interceptor.handle_control(ControlMessage::SetCapture(false)), ControlReply::Ack);
    interceptor.on_response_started(response("c", 1, "https://x/ignored.css", "text/css"));
    let body = drain_body(&interceptor, "c", 1, &[b"body{}".as_slice()]).await;
    assert_eq!(body, b"body{}");

    drop(interceptor);
    consumer.await.unwrap();
    assert_eq!(dispatcher.records().len(), 2);

    dispatcher.set_view(ViewSettings {
        kinds: KindFilter::only([Kind::Media]),
        tab_filter: None,
    });
    assert_eq!(probe.ids(), ["b"]);

    dispatcher.set_view(ViewSettings {
        kinds: KindFilter::all(),
        tab_filter: Some(TabId(1)),
    });
    assert_eq!(probe.ids(), ["a"]);

    dispatcher.clear();
    assert!(probe.ids().is_empty());
    assert!(dispatcher.records().is_empty());
}
