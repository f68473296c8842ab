mod common;

use bifrost::dns::{DNSPacket, MAX_TCP_MESSAGE, enums::DNSResourceType};
use bifrost::zone::transfer::{MAX_ENVELOPE_BYTES, ordered_records, pack};
use bifrost::zone::{Envelope, TransferEngine};
use common::*;
use std::time::Duration;

#[tokio::test]
async fn test_records_start_with_soa_then_apex_ns() {
    let cache = zone_cache(seeded_gateway());
    let zone = cache.load("example.org.").await.unwrap();
    let records: Vec<_> = ordered_records(&zone, GLOBAL_TTL).collect();

    assert_eq!(records.len(), EXAMPLE_ORG_RECORDS);
    assert_eq!(records[0].rtype, DNSResourceType::SOA);
    assert_eq!(records[1].rtype, DNSResourceType::NS);
    assert_eq!(records[2].rtype, DNSResourceType::NS);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.rtype == DNSResourceType::SOA)
            .count(),
        1
    );

    // Remaining apex sets follow in kind order, then the other locations by name
    let rest: Vec<String> = records[3..]
        .iter()
        .map(|r| format!("{} {:?}", r.name, r.rtype))
        .collect();
    assert_eq!(
        rest,
        vec![
            "example.org. MX",
            "example.org. CAA",
            "*.wild.example.org. TXT",
            "_sip._tcp.example.org. SRV",
            "alias.example.org. CNAME",
            "mail.example.org. A",
            "ns1.example.org. A",
            "www.example.org. A",
            "www.example.org. AAAA",
        ]
    );
}

#[tokio::test]
async fn test_envelopes_reassemble_the_zone() {
    let cache = zone_cache(seeded_gateway());
    let zone = cache.load("example.org.").await.unwrap();
    let expected: Vec<_> = ordered_records(&zone, GLOBAL_TTL).collect();

    let engine = TransferEngine::new(120, 2, GLOBAL_TTL);
    let mut stream = engine.transfer(zone.clone());
    let mut envelopes: Vec<Envelope> = Vec::new();
    while let Some(envelope) = stream.next().await {
        envelopes.push(envelope);
    }

    assert!(envelopes.len() > 1);
    for envelope in &envelopes {
        assert!(!envelope.records.is_empty());
        assert!(envelope.wire_len() <= 120 || envelope.records.len() == 1);
    }
    let streamed: Vec<_> = envelopes.into_iter().flat_map(|e| e.records).collect();
    assert_eq!(streamed, expected);
}

#[tokio::test]
async fn test_oversized_records_are_not_split() {
    let cache = zone_cache(seeded_gateway());
    let zone = cache.load("example.org.").await.unwrap();
    let records: Vec<_> = ordered_records(&zone, GLOBAL_TTL).collect();

    // Every record is larger than the unit, so each travels alone
    let envelopes = pack(records.clone(), 10);
    assert_eq!(envelopes.len(), records.len());
    assert!(envelopes.iter().all(|e| e.records.len() == 1));
}

#[tokio::test]
async fn test_large_zone_envelopes_fit_tcp_messages() {
    let gateway = seeded_gateway();
    let addresses: Vec<String> = (0..6000)
        .map(|i| format!(r#"{{"ip": "10.0.{}.{}"}}"#, i / 256, i % 256))
        .collect();
    gateway.insert("bulk:example.org.", format!(r#"{{"a": [{}]}}"#, addresses.join(",")));
    let zone = zone_cache(gateway).load("example.org.").await.unwrap();

    let engine = TransferEngine::new(200_000, 4, GLOBAL_TTL);
    let mut stream = engine.transfer(zone);
    let mut records = 0;
    while let Some(envelope) = stream.next().await {
        assert!(envelope.wire_len() <= MAX_ENVELOPE_BYTES);
        records += envelope.records.len();

        let message = DNSPacket {
            answers: envelope.records,
            ..Default::default()
        };
        let wire = message.serialize().unwrap();
        assert!(wire.len() <= MAX_TCP_MESSAGE);
    }
    assert_eq!(records, EXAMPLE_ORG_RECORDS + 6000);
}

#[tokio::test]
async fn test_cancel_stops_producer() {
    let cache = zone_cache(seeded_gateway());
    let zone = cache.load("example.org.").await.unwrap();

    // One record per envelope and room for a single envelope in the channel
    let engine = TransferEngine::new(1, 1, GLOBAL_TTL);
    let mut stream = engine.transfer(zone);
    let first = stream.next().await.unwrap();
    assert_eq!(first.records[0].rtype, DNSResourceType::SOA);

    stream.cancel();
    assert!(stream.next().await.is_none());

    tokio::time::timeout(Duration::from_secs(1), async {
        while !stream.is_producer_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("producer should exit after cancellation");
}

#[tokio::test]
async fn test_cancel_token_is_shared() {
    let cache = zone_cache(seeded_gateway());
    let zone = cache.load("example.org.").await.unwrap();

    let engine = TransferEngine::new(1, 1, GLOBAL_TTL);
    let mut stream = engine.transfer(zone);
    let token = stream.cancel_token();
    token.cancel();

    assert!(stream.next().await.is_none());
}
