use chrono::TimeZone;

use super::*;
use crate::foundation::clock::ManualClock;
use crate::net::testing::FakeFetcher;
use crate::timestamp::grammar::Grammar;

const BASE: &str = "https://img.test/enlil/";

const LISTING: &str = r#"
<a href="enlil_20260119T183000.png">a</a>
<a href="enlil_20260119T121500.png">too old</a>
<a href="enlil_latest.png">latest</a>
<a href="enlil_20260119T150000.png">b</a>
<a href="enlil_garbage.png">unparseable</a>
<a href="enlil_20260119T150000.PNG">same instant</a>
<a href="enlil_20260119T163000.gif">wrong extension</a>
"#;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 19, 19, 0, 0).unwrap()
}

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(vec![SourceDescriptor {
            key: "enlil".to_string(),
            label: "WSA-Enlil".to_string(),
            base_url: BASE.to_string(),
            grammar: Grammar::CompactSecond,
            extensions: vec!["png".to_string()],
            latest_url: None,
        }])
        .unwrap(),
    )
}

fn lister(fetcher: Arc<FakeFetcher>, clock: ManualClock, backend: ListingBackend) -> FrameLister {
    FrameLister::new(
        catalog(),
        fetcher,
        backend,
        Arc::new(clock),
        &ListingSettings::default(),
    )
}

#[test]
fn parse_listing_filters_sorts_and_dedups() {
    let catalog = catalog();
    let source = catalog.require("enlil").unwrap();
    let cutoff = now() - Duration::hours(6);
    let frames = parse_listing(source, &catalog.grammar_table(), LISTING, cutoff);

    let names: Vec<_> = frames.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(
        names,
        vec!["enlil_20260119T150000.png", "enlil_20260119T183000.png"]
    );
    assert!(frames.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(frames.iter().all(|f| f.source_key == "enlil"));
    assert_eq!(frames[0].url, format!("{BASE}enlil_20260119T150000.png"));
}

#[tokio::test]
async fn cached_within_ttl_and_refetched_once_after_expiry() {
    let fetcher = Arc::new(FakeFetcher::new().with_body(BASE, LISTING));
    let clock = ManualClock::new(now());
    let lister = lister(fetcher.clone(), clock.clone(), ListingBackend::Directory);

    let first = lister.list("enlil", 6).await;
    assert_eq!(first.len(), 2);
    assert_eq!(fetcher.calls(BASE), 1);

    clock.advance(Duration::minutes(4));
    let second = lister.list("enlil", 6).await;
    assert_eq!(second, first);
    assert_eq!(fetcher.calls(BASE), 1);

    clock.advance(Duration::minutes(1));
    lister.list("enlil", 6).await;
    assert_eq!(fetcher.calls(BASE), 2);
    lister.list("enlil", 6).await;
    assert_eq!(fetcher.calls(BASE), 2);
}

#[tokio::test(start_paused = true)]
async fn overlapping_calls_share_one_fetch() {
    let fetcher = Arc::new(FakeFetcher::new().with_delayed_body(
        BASE,
        LISTING,
        std::time::Duration::from_millis(200),
    ));
    let lister = lister(fetcher.clone(), ManualClock::new(now()), ListingBackend::Directory);

    let (a, b) = tokio::join!(lister.list("enlil", 6), lister.list("enlil", 6));
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);
    assert_eq!(fetcher.calls(BASE), 1);
    assert!(lister.lock_in_flight().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overlapping_failures_retry_after_the_first() {
    let fetcher = Arc::new(FakeFetcher::new().with_status(BASE, 503));
    let lister = lister(fetcher.clone(), ManualClock::new(now()), ListingBackend::Directory);

    let (a, b) = tokio::join!(lister.list("enlil", 6), lister.list("enlil", 6));
    assert!(a.is_empty() && b.is_empty());
    assert_eq!(fetcher.calls(BASE), 2);
}

#[tokio::test]
async fn hours_back_is_part_of_the_cache_key() {
    let fetcher = Arc::new(FakeFetcher::new().with_body(BASE, LISTING));
    let lister = lister(fetcher.clone(), ManualClock::new(now()), ListingBackend::Directory);

    assert_eq!(lister.list("enlil", 6).await.len(), 2);
    assert_eq!(lister.list("enlil", 8).await.len(), 3);
    assert_eq!(fetcher.calls(BASE), 2);
}

#[tokio::test]
async fn failures_are_absorbed_and_not_cached() {
    let fetcher = Arc::new(FakeFetcher::new().with_status(BASE, 502));
    let lister = lister(fetcher.clone(), ManualClock::new(now()), ListingBackend::Directory);

    assert!(lister.list("enlil", 6).await.is_empty());
    assert!(lister.list("enlil", 6).await.is_empty());
    assert_eq!(fetcher.calls(BASE), 2);

    assert!(lister.list("no_such_source", 6).await.is_empty());
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let fetcher = Arc::new(FakeFetcher::new().with_body(BASE, LISTING));
    let lister = lister(fetcher.clone(), ManualClock::new(now()), ListingBackend::Directory);
    lister.list("enlil", 6).await;
    lister.invalidate("enlil");
    lister.list("enlil", 6).await;
    assert_eq!(fetcher.calls(BASE), 2);
}

#[tokio::test]
async fn service_backend_filters_and_sorts() {
    let url = "https://svc.test/frames/enlil?hours=6";
    let body = r#"{
        "source": "enlil",
        "frames": [
            {"url": "u2", "timestamp": 1768847400000, "filename": "enlil_20260119T183000.png"},
            {"url": "u0", "timestamp": 1768824900000, "filename": "enlil_20260119T121500.png"},
            {"url": "u1", "timestamp": 1768834800000, "filename": "enlil_20260119T150000.png"},
            {"url": "ul", "timestamp": 1768848000000, "filename": "enlil_latest.png"}
        ]
    }"#;
    let fetcher = Arc::new(FakeFetcher::new().with_body(url, body));
    let client = FrameServiceClient::new("https://svc.test", fetcher.clone());
    let lister = lister(
        fetcher.clone(),
        ManualClock::new(now()),
        ListingBackend::Service(client),
    );

    let frames = lister.list("enlil", 6).await;
    let urls: Vec<_> = frames.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2"]);
    lister.list("enlil", 6).await;
    assert_eq!(fetcher.calls(url), 1);
}
