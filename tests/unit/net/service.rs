use std::sync::Arc;

use super::*;
use crate::net::testing::FakeFetcher;

#[test]
fn frames_url_encodes_key_and_hours() {
    let client = FrameServiceClient::new("https://svc.test/api/", Arc::new(FakeFetcher::new()));
    assert_eq!(
        client.frames_url("lasco_c3", 12).unwrap(),
        "https://svc.test/api/frames/lasco_c3?hours=12"
    );
}

#[tokio::test]
async fn fetch_decodes_contract_and_fills_source_key() {
    let body = r#"{
        "source": "ovation_north",
        "baseUrl": "https://img.test/ovation/",
        "latestUrl": "https://img.test/latest.jpg",
        "frames": [
            {"url": "https://img.test/ovation/a_2026-01-19_1200.jpg", "timestamp": 1768824000000, "filename": "a_2026-01-19_1200.jpg"}
        ],
        "fetchedAt": "2026-01-19T12:05:00Z"
    }"#;
    let fetcher = FakeFetcher::new().with_body(
        "https://svc.test/frames/ovation_north?hours=6",
        body,
    );
    let client = FrameServiceClient::new("https://svc.test", Arc::new(fetcher));
    let resp = client.fetch("ovation_north", 6).await.unwrap();
    assert_eq!(resp.frames.len(), 1);
    assert_eq!(resp.frames[0].source_key, "ovation_north");
    assert_eq!(resp.frames[0].epoch_ms(), 1_768_824_000_000);
    assert_eq!(resp.latest_url.as_deref(), Some("https://img.test/latest.jpg"));
}

#[tokio::test]
async fn non_success_status_is_an_acquisition_error() {
    let fetcher = FakeFetcher::new().with_status("https://svc.test/frames/x?hours=1", 503);
    let client = FrameServiceClient::new("https://svc.test", Arc::new(fetcher));
    let err = client.fetch("x", 1).await.unwrap_err();
    assert!(matches!(err, SkyloopError::Acquisition(_)));
}

#[test]
fn proxy_encodes_target_url() {
    let proxy = ImageProxy::new("https://proxy.test/");
    let out = proxy.proxied("https://img.test/a b.png?x=1&y=2").unwrap();
    assert!(out.starts_with("https://proxy.test/image?url="));
    assert!(out.contains("https%3A%2F%2Fimg.test%2Fa+b.png%3Fx%3D1%26y%3D2"));

    let direct = ImageProxy::from_config(None);
    assert_eq!(
        direct.proxied("https://img.test/a.png").unwrap(),
        "https://img.test/a.png"
    );
}
