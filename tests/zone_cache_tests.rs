mod common;

use bifrost::backend::MemoryGateway;
use bifrost::error::DnsError;
use common::*;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_cold_loads_share_one_fetch() {
    let gateway = Arc::new(MemoryGateway::with_latency(Duration::from_millis(20)));
    seed_example_org(&gateway);
    let cache = zone_cache(gateway.clone());

    let loads = (0..16).map(|_| cache.load("example.org."));
    let zones = join_all(loads).await;

    assert_eq!(gateway.scan_count(), 1);
    let first = zones[0].as_ref().unwrap();
    for zone in &zones {
        assert!(Arc::ptr_eq(first, zone.as_ref().unwrap()));
    }
}

#[tokio::test]
async fn test_concurrent_loads_from_spawned_tasks() {
    let gateway = Arc::new(MemoryGateway::with_latency(Duration::from_millis(20)));
    seed_example_org(&gateway);
    let cache = zone_cache(gateway.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load("EXAMPLE.org").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(gateway.scan_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cold_failures_share_one_fetch() {
    let gateway = Arc::new(MemoryGateway::with_latency(Duration::from_secs(5)));
    seed_example_org(&gateway);
    gateway.set_unavailable(true);
    let cache = zone_cache(gateway.clone());

    let started = tokio::time::Instant::now();
    let results = join_all((0..8).map(|_| cache.load("example.org."))).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(DnsError::BackendUnavailable(_)))));
    assert_eq!(gateway.scan_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(6));

    // A later load is a new attempt, not a replay of the old failure
    gateway.set_unavailable(false);
    assert!(cache.load("example.org.").await.is_ok());
    assert_eq!(gateway.scan_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_entry_is_reused() {
    let gateway = seeded_gateway();
    let cache = zone_cache(gateway.clone());

    let first = cache.load("example.org.").await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    let second = cache.load("example.org.").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(gateway.scan_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_after_expiry_is_equal() {
    let gateway = seeded_gateway();
    let cache = zone_cache(gateway.clone());

    let first = cache.load("example.org.").await.unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;
    let second = cache.load("example.org.").await.unwrap();

    assert_eq!(gateway.scan_count(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
    assert_eq!(second.record_count(), EXAMPLE_ORG_RECORDS);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_previous_entry() {
    let gateway = seeded_gateway();
    let cache = zone_cache(gateway.clone());

    let first = cache.load("example.org.").await.unwrap();
    gateway.set_unavailable(true);
    tokio::time::advance(Duration::from_secs(301)).await;

    assert!(matches!(
        cache.load("example.org.").await,
        Err(DnsError::BackendUnavailable(_))
    ));
    let retained = cache.cached("example.org.").unwrap();
    assert!(Arc::ptr_eq(&retained.zone, &first));

    // Recovery picks the zone up again
    gateway.set_unavailable(false);
    let reloaded = cache.load("example.org.").await.unwrap();
    assert_eq!(*reloaded, *first);
}

#[tokio::test]
async fn test_cold_failure_caches_nothing() {
    let gateway = seeded_gateway();
    gateway.set_unavailable(true);
    let cache = zone_cache(gateway);

    assert!(cache.load("example.org.").await.is_err());
    assert!(cache.cached("example.org.").is_none());
}

#[tokio::test]
async fn test_backend_changes_show_after_invalidate() {
    let gateway = seeded_gateway();
    let cache = zone_cache(gateway.clone());

    let zone = cache.load("example.org.").await.unwrap();
    assert!(zone.contains("www"));

    gateway.remove("www:example.org.");
    cache.invalidate("example.org.");
    let zone = cache.load("example.org.").await.unwrap();
    assert!(!zone.contains("www"));
}

#[tokio::test]
async fn test_unencodable_location_is_skipped() {
    use bifrost::dns::DNSPacket;
    use bifrost::zone::transfer::ordered_records;

    let gateway = seeded_gateway();
    gateway.insert("bad:example.org.", r#"{"cname": [{"host": "a..b"}]}"#);
    let cache = zone_cache(gateway);

    let zone = cache.load("example.org.").await.unwrap();
    assert!(!zone.contains("bad"));
    assert_eq!(zone.record_count(), EXAMPLE_ORG_RECORDS);

    // Everything that did load still encodes
    let mut message = DNSPacket::default();
    message.answers = ordered_records(&zone, GLOBAL_TTL).collect();
    assert!(message.serialize().is_ok());
}

#[tokio::test]
async fn test_prefix_and_suffix_are_honoured() {
    use bifrost::backend::KeySchema;
    use bifrost::zone::ZoneCache;

    let gateway = Arc::new(MemoryGateway::new());
    gateway.insert(
        "dns:@:example.org.:v1",
        r#"{"soa": [{"ns": "ns1", "mbox": "hostmaster"}]}"#,
    );
    gateway.insert("dns:www:example.org.:v1", r#"{"a": [{"ip": "203.0.113.5"}]}"#);
    gateway.insert("other:www:example.org.", r#"{"a": [{"ip": "198.51.100.1"}]}"#);

    let cache = ZoneCache::new(
        gateway,
        KeySchema::new("dns:", ":v1"),
        Duration::from_secs(60),
    );
    assert_eq!(&cache.zone_names().await.unwrap()[..], ["example.org."]);

    let zone = cache.load("example.org.").await.unwrap();
    assert_eq!(zone.location_count(), 2);
    assert_eq!(zone.record_count(), 2);
}
