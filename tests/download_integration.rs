//! Integration tests for the download side.
//!
//! These tests drive the HLS and chunked downloaders through the real HTTP
//! client against mock servers.

mod support;

use std::sync::Arc;
use std::time::Duration;

use netmon_core::capture::SessionToken;
use netmon_core::fetch::{
    CancelFlag, ChunkedDownloader, ChunkedOutcome, ConcurrentFetcher, FetchError, FetchOptions,
    HlsDownloader, HlsOutcome, HttpClient, LinearBackoff, no_progress,
};
use netmon_core::sidecar::MetaInfo;
use netmon_core::store::{DirectorySaveTarget, LocalFileStore};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    temp_dir: TempDir,
    session: SessionToken,
    store: Arc<LocalFileStore>,
    target: Arc<DirectorySaveTarget>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = Arc::new(LocalFileStore::new(temp_dir.path().join("store")));
        let target = Arc::new(DirectorySaveTarget::new(temp_dir.path().join("saved")));
        Self {
            temp_dir,
            session: SessionToken::from_token("itest"),
            store,
            target,
        }
    }

    fn client(&self) -> HttpClient {
        HttpClient::new(self.session.clone())
    }

    fn hls(&self) -> HlsDownloader {
        HlsDownloader::new(
            Arc::new(self.client()),
            self.store.clone(),
            self.target.clone(),
            self.session.clone(),
        )
        .with_fetcher(
            ConcurrentFetcher::new(2, LinearBackoff::new(3, Duration::from_millis(10)))
                .expect("valid concurrency"),
        )
    }

    fn saved_files(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path().join("saved")).map_or(0, Iterator::count)
    }
}

async fn mount_body(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_master_playlist_variant_is_downloaded_with_rewritten_origin() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let harness = Harness::new();

    mount_body(
        &server,
        "/live/master.m3u8",
        b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=640000,RESOLUTION=640x360\nlow/index.m3u8\n",
    )
    .await;
    mount_body(
        &server,
        "/live/low/index.m3u8",
        b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nseg0.ts\n#EXTINF:6,\nseg1.ts\n#EXTINF:6,\n/abs/seg2.ts\n#EXT-X-ENDLIST\n",
    )
    .await;
    for (route, body) in [
        ("/live/low/seg0.ts", b"zero-" as &[u8]),
        ("/live/low/seg1.ts", b"one-"),
        ("/abs/seg2.ts", b"two"),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("origin", "https://player.example"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let options = FetchOptions::new().rewritten(&harness.session, "Origin", "https://player.example");
    let url = format!("{}/live/master.m3u8", server.uri());
    let hls = harness.hls();

    let first = hls
        .download("show", &url, &options, None, &CancelFlag::new(), &no_progress)
        .await
        .expect("manifest should load");
    let HlsOutcome::NeedsVariant(variants) = first else {
        panic!("expected variant prompt, got {first:?}");
    };
    assert_eq!(variants.len(), 1);

    let outcome = hls
        .download("show", &url, &options, Some(0), &CancelFlag::new(), &no_progress)
        .await
        .expect("variant download should succeed");
    let HlsOutcome::Saved(saved) = outcome else {
        panic!("expected saved stream, got {outcome:?}");
    };

    assert_eq!(std::fs::read(&saved.media).unwrap(), b"zero-one-two");
    assert_eq!(saved.segments, 3);

    let meta: MetaInfo =
        serde_json::from_slice(&std::fs::read(saved.sidecar.expect("sidecar written")).unwrap())
            .unwrap();
    assert_eq!(meta.header_list.len(), 1);
    assert_eq!(meta.header_list[0].name, "origin");
    assert_eq!(meta.ext_info["#EXT-X-TARGETDURATION"], "6");
}

#[tokio::test]
async fn test_transient_segment_failure_is_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let harness = Harness::new();

    mount_body(&server, "/v/index.m3u8", b"#EXTM3U\n#EXTINF:2,\na.ts\n#EXT-X-ENDLIST\n").await;
    Mock::given(method("GET"))
        .and(path("/v/a.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_body(&server, "/v/a.ts", b"payload").await;

    let outcome = harness
        .hls()
        .download(
            "retry",
            &format!("{}/v/index.m3u8", server.uri()),
            &FetchOptions::default(),
            None,
            &CancelFlag::new(),
            &no_progress,
        )
        .await
        .expect("second attempt should succeed");

    let HlsOutcome::Saved(saved) = outcome else {
        panic!("expected saved stream, got {outcome:?}");
    };
    assert_eq!(std::fs::read(saved.media).unwrap(), b"payload");
}

#[tokio::test]
async fn test_missing_segment_fails_without_saving() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let harness = Harness::new();

    mount_body(
        &server,
        "/v/index.m3u8",
        b"#EXTM3U\n#EXTINF:2,\nok.ts\n#EXTINF:2,\ngone.ts\n#EXT-X-ENDLIST\n",
    )
    .await;
    mount_body(&server, "/v/ok.ts", b"fine").await;
    Mock::given(method("GET"))
        .and(path("/v/gone.ts"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = harness
        .hls()
        .download(
            "broken",
            &format!("{}/v/index.m3u8", server.uri()),
            &FetchOptions::default(),
            None,
            &CancelFlag::new(),
            &no_progress,
        )
        .await
        .expect_err("404 segment must fail the job");

    assert!(matches!(err, FetchError::NotFound { .. }), "got {err:?}");
    assert_eq!(harness.saved_files(), 0);
}

#[tokio::test]
async fn test_chunked_download_small_and_large_paths() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let harness = Harness::new();
    mount_body(&server, "/files/notes.txt", b"short text").await;
    mount_body(&server, "/files/movie.mp4", &[9u8; 64 * 1024]).await;

    let downloader = ChunkedDownloader::new(harness.client(), harness.store.clone(), harness.target.clone())
        .with_small_file_threshold(1024);

    let small = downloader
        .download(
            &format!("{}/files/notes.txt", server.uri()),
            &FetchOptions::default(),
            &CancelFlag::new(),
            &no_progress,
        )
        .await
        .expect("small download should succeed");
    let ChunkedOutcome::Saved(path) = small else {
        panic!("expected immediate save, got {small:?}");
    };
    assert_eq!(std::fs::read(path).unwrap(), b"short text");

    let large = downloader
        .download(
            &format!("{}/files/movie.mp4", server.uri()),
            &FetchOptions::default(),
            &CancelFlag::new(),
            &no_progress,
        )
        .await
        .expect("large download should succeed");
    let ChunkedOutcome::Staged(artifact) = large else {
        panic!("expected staged artifact, got {large:?}");
    };
    assert_eq!(artifact.size, 64 * 1024);
    assert_eq!(harness.saved_files(), 1);

    let saved = artifact
        .save(harness.store.as_ref(), harness.target.as_ref())
        .await
        .expect("staged save should succeed");
    assert!(saved.ends_with("movie.mp4"));
    artifact
        .remove(harness.store.as_ref())
        .await
        .expect("temporary file should be removable");
    assert_eq!(harness.saved_files(), 2);
}
