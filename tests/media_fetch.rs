// tests/media_fetch.rs
mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use feed_relay::compose::{Draft, DraftSegment, MediaKind, Segment};
use feed_relay::config::MediaConfig;
use feed_relay::media::MediaFetcher;
use feed_relay::RelayError;
use std::time::{Duration, Instant};

#[tokio::test]
async fn resolve_inlines_the_largest_rendition() {
    let mock = common::spawn_mock().await;
    let fetcher = MediaFetcher::new(&common::media_config(5)).unwrap();

    let inline = fetcher
        .resolve(&mock.url("/img/abc?format=jpg&name=small"))
        .await
        .unwrap();
    assert_eq!(inline, format!("base64://{}", STANDARD.encode("img:abc:large")));
}

#[tokio::test]
async fn non_success_status_is_a_fetch_failure() {
    let mock = common::spawn_mock().await;
    let fetcher = MediaFetcher::new(&common::media_config(5)).unwrap();

    let err = fetcher.fetch(&mock.url("/missing/abc")).await.unwrap_err();
    assert!(matches!(err, RelayError::MediaFetch { .. }), "{err}");
}

#[tokio::test]
async fn slow_media_times_out() {
    let mock = common::spawn_mock().await;
    let fetcher = MediaFetcher::new(&common::media_config(1)).unwrap();

    let t0 = Instant::now();
    let err = fetcher.fetch(&mock.url("/slow")).await.unwrap_err();
    assert!(matches!(err, RelayError::MediaFetch { .. }));
    assert!(t0.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn failed_media_is_dropped_but_text_survives() {
    let mock = common::spawn_mock().await;
    let fetcher = MediaFetcher::new(&common::media_config(5)).unwrap();

    let draft = Draft {
        segments: vec![
            DraftSegment::Text("caption".into()),
            DraftSegment::Media {
                kind: MediaKind::Image,
                url: mock.url("/missing/x"),
            },
        ],
    };
    let msg = fetcher.resolve_draft(draft, "t_u").await.unwrap();
    assert_eq!(msg.segments, vec![Segment::text("caption")]);

    let media_only = Draft {
        segments: vec![DraftSegment::Media {
            kind: MediaKind::VideoPoster,
            url: mock.url("/missing/y"),
        }],
    };
    assert!(fetcher.resolve_draft(media_only, "t_u").await.is_none());
}

#[tokio::test]
async fn video_posters_become_image_segments_and_are_archived() {
    let mock = common::spawn_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = MediaConfig {
        archive_dir: Some(dir.path().join("download")),
        ..common::media_config(5)
    };
    let fetcher = MediaFetcher::new(&cfg).unwrap();

    let draft = Draft {
        segments: vec![DraftSegment::Media {
            kind: MediaKind::VideoPoster,
            url: mock.url("/img/poster"),
        }],
    };
    let msg = fetcher
        .resolve_draft(draft, "2024-01-01 00:00:01_alice_0")
        .await
        .unwrap();
    assert!(matches!(&msg.segments[0], Segment::Image { file } if file.starts_with("base64://")));

    let saved = dir.path().join("download/2024-01-01_00_00_01_alice_0.jpg");
    assert_eq!(std::fs::read(saved).unwrap(), b"img:poster:orig");
}
