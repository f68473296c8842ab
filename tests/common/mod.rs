//! Shared fixtures for the integration tests: a seeded in-memory backend
//! holding `example.org.` and helpers to build queries.

#![allow(dead_code)] // Each test binary uses a different subset

use bifrost::backend::{KeySchema, MemoryGateway};
use bifrost::dispatcher::{Dispatch, QueryDispatcher};
use bifrost::dns::{
    DNSPacket, enums::DNSResourceType, header::DNSHeader, question::DNSQuestion,
};
use bifrost::zone::{AnswerSynthesizer, TransferEngine, ZoneCache};
use std::sync::Arc;
use std::time::Duration;

pub const GLOBAL_TTL: u32 = 300;

/// Number of records stored for example.org. by `seed_example_org`
pub const EXAMPLE_ORG_RECORDS: usize = 12;

pub fn seed_example_org(gateway: &MemoryGateway) {
    gateway.insert(
        "@:example.org.",
        r#"{
            "soa": [{"ns": "ns1.example.org.", "mbox": "hostmaster.example.org.",
                     "serial": 2024010101, "refresh": 3600, "retry": 900,
                     "expire": 604800, "minttl": 300}],
            "ns": [{"host": "ns1"}, {"host": "ns2.example.net."}],
            "mx": [{"host": "mail", "preference": 10}],
            "caa": [{"flag": 0, "tag": "issue", "value": "letsencrypt.org"}]
        }"#,
    );
    gateway.insert(
        "www:example.org.",
        r#"{"a": [{"ip": "203.0.113.5"}], "aaaa": [{"ip": "2001:db8::5"}]}"#,
    );
    gateway.insert("ns1:example.org.", r#"{"a": [{"ip": "192.0.2.53"}]}"#);
    gateway.insert("mail:example.org.", r#"{"a": [{"ip": "192.0.2.25", "ttl": 60}]}"#);
    gateway.insert("*.wild:example.org.", r#"{"txt": [{"text": "wildcard"}]}"#);
    gateway.insert("alias:example.org.", r#"{"cname": [{"host": "www"}]}"#);
    gateway.insert(
        "_sip._tcp:example.org.",
        r#"{"srv": [{"priority": 10, "weight": 5, "port": 5060, "target": "www"}]}"#,
    );
}

pub fn seeded_gateway() -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());
    seed_example_org(&gateway);
    gateway
}

pub fn zone_cache(gateway: Arc<MemoryGateway>) -> Arc<ZoneCache> {
    Arc::new(ZoneCache::new(
        gateway,
        KeySchema::default(),
        Duration::from_secs(GLOBAL_TTL as u64),
    ))
}

pub fn dispatcher(gateway: Arc<MemoryGateway>) -> QueryDispatcher {
    QueryDispatcher::new(
        zone_cache(gateway),
        AnswerSynthesizer::new(GLOBAL_TTL),
        TransferEngine::new(1000, 4, GLOBAL_TTL),
    )
}

pub fn query(name: &str, qtype: DNSResourceType) -> DNSPacket {
    query_with_id(1234, name, qtype)
}

pub fn query_with_id(id: u16, name: &str, qtype: DNSResourceType) -> DNSPacket {
    DNSPacket {
        header: DNSHeader {
            id,
            rd: true,
            ..Default::default()
        },
        questions: vec![DNSQuestion::new(name, qtype)],
        ..Default::default()
    }
}

pub fn expect_response(dispatch: Dispatch) -> DNSPacket {
    match dispatch {
        Dispatch::Respond(packet) => packet,
        other => panic!("expected a response, got {:?}", other),
    }
}
