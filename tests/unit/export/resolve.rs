use chrono::TimeZone;

use super::*;
use crate::net::testing::{FakeFetcher, png_bytes};
use crate::timeline::builder::{TimelinePolicy, build_timeline};
use crate::timestamp::grammar::Grammar;

fn at(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 19, 18, min, 0).unwrap()
}

fn source(key: &str, label: &str) -> SourceDescriptor {
    SourceDescriptor {
        key: key.to_string(),
        label: label.to_string(),
        base_url: format!("https://img.test/{key}/"),
        grammar: Grammar::CompactMinute,
        extensions: vec!["png".to_string()],
        latest_url: None,
    }
}

fn frame(key: &str, min: u32) -> Frame {
    Frame {
        url: format!("https://img.test/{key}/{min}.png"),
        timestamp: at(min),
        filename: format!("{min}.png"),
        source_key: key.to_string(),
    }
}

fn resolver(fetcher: Arc<FakeFetcher>, proxy: ImageProxy) -> SequenceResolver {
    SequenceResolver::new(fetcher, proxy, Duration::from_secs(1))
}

#[tokio::test]
async fn single_skips_broken_frames_and_keeps_order() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_body("https://img.test/a/0.png", png_bytes(4, 2, [255, 0, 0, 255]))
            .with_body("https://img.test/a/5.png", b"not an image".to_vec())
            .with_body("https://img.test/a/10.png", png_bytes(4, 2, [0, 255, 0, 255])),
    );
    let frames = vec![frame("a", 0), frame("a", 5), frame("a", 10)];
    let seq = resolver(fetcher, ImageProxy::direct())
        .single(&source("a", "Alpha"), &frames, true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(seq.len(), 2);
    assert_eq!(seq.subject_key(), Some("a"));
    let ExportSequence::Single { label, frames, .. } = seq else {
        panic!("expected single-view sequence");
    };
    assert_eq!(label.as_deref(), Some("Alpha"));
    assert_eq!(frames[0].timestamp, at(0));
    assert_eq!(frames[1].timestamp, at(10));
    assert_eq!(frames[1].image.get_pixel(0, 0).0, [0, 255, 0, 255]);
}

#[tokio::test]
async fn single_goes_through_the_proxy() {
    let proxied = "https://proxy.test/image?url=https%3A%2F%2Fimg.test%2Fa%2F0.png";
    let fetcher = Arc::new(FakeFetcher::new().with_body(proxied, png_bytes(2, 2, [1, 2, 3, 255])));
    let seq = resolver(Arc::clone(&fetcher), ImageProxy::new("https://proxy.test/"))
        .single(&source("a", ""), &[frame("a", 0)], false, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(seq.len(), 1);
    assert_eq!(fetcher.calls(proxied), 1);
}

#[tokio::test]
async fn nothing_resolvable_is_a_shortfall() {
    let fetcher = Arc::new(FakeFetcher::new());
    let err = resolver(fetcher, ImageProxy::direct())
        .single(&source("a", ""), &[frame("a", 0)], false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SkyloopError::SynchronizationShortfall { .. }));
}

#[tokio::test]
async fn cancelled_resolution_stops_early() {
    let fetcher = Arc::new(FakeFetcher::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = resolver(Arc::clone(&fetcher), ImageProxy::direct())
        .single(&source("a", ""), &[frame("a", 0), frame("a", 5)], false, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn grid_loads_each_url_once_and_labels_tiles() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_body("https://img.test/a/0.png", png_bytes(2, 2, [255, 0, 0, 255]))
            .with_body("https://img.test/a/5.png", png_bytes(2, 2, [255, 0, 0, 255]))
            .with_body("https://img.test/b/1.png", png_bytes(2, 2, [0, 0, 255, 255])),
    );
    let catalog = Catalog::new(vec![source("a", "Alpha"), source("b", "")]).unwrap();
    let by_source = HashMap::from([
        ("a".to_string(), vec![frame("a", 0), frame("a", 5)]),
        ("b".to_string(), vec![frame("b", 1)]),
    ]);
    let policy = TimelinePolicy::strict()
        .with_tolerance(chrono::Duration::minutes(5))
        .with_min_sources(1);
    let timeline = build_timeline(&by_source, &["a".to_string(), "b".to_string()], &policy);

    let seq = resolver(Arc::clone(&fetcher), ImageProxy::direct())
        .grid(&catalog, &timeline, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(seq.len(), timeline.len());
    assert_eq!(seq.subject_key(), None);
    assert_eq!(fetcher.calls("https://img.test/b/1.png"), 1);
    let ExportSequence::Grid { sources, entries } = seq else {
        panic!("expected grid sequence");
    };
    assert_eq!(
        sources,
        vec![
            TileSource {
                key: "a".to_string(),
                label: "Alpha".to_string()
            },
            TileSource {
                key: "b".to_string(),
                label: "b".to_string()
            },
        ]
    );
    assert!(entries.iter().all(|e| !e.images.is_empty()));
}

#[tokio::test]
async fn strict_grid_drops_entries_that_lose_a_tile() {
    let png = png_bytes(2, 2, [90, 90, 90, 255]);
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_body("https://img.test/a/0.png", png.clone())
            .with_body("https://img.test/a/20.png", png.clone())
            .with_body("https://img.test/b/1.png", png.clone())
            .with_status("https://img.test/b/21.png", 500),
    );
    let catalog = Catalog::new(vec![source("a", "Alpha"), source("b", "Beta")]).unwrap();
    let by_source = HashMap::from([
        ("a".to_string(), vec![frame("a", 0), frame("a", 20)]),
        ("b".to_string(), vec![frame("b", 1), frame("b", 21)]),
    ]);
    let policy = TimelinePolicy::strict().with_tolerance(chrono::Duration::minutes(5));
    let timeline = build_timeline(&by_source, &["a".to_string(), "b".to_string()], &policy);
    assert_eq!(timeline.min_sources, 2);
    assert_eq!(timeline.len(), 4);

    let seq = resolver(Arc::clone(&fetcher), ImageProxy::direct())
        .grid(&catalog, &timeline, &CancellationToken::new())
        .await
        .unwrap();

    let ExportSequence::Grid { entries, .. } = seq else {
        panic!("expected grid sequence");
    };
    let kept: Vec<_> = entries.iter().map(|e| e.timestamp).collect();
    assert_eq!(kept, vec![at(0), at(1)]);
    assert!(entries.iter().all(|e| e.images.len() == 2));
}
