use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns::enums::DNSResourceType;
use crate::dns::name;
use crate::dns::resource::RData;
use crate::error::{DnsError, Result};

/// Record types a location can store, in the order they are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    A,
    AAAA,
    CNAME,
    TXT,
    NS,
    MX,
    SRV,
    SOA,
    CAA,
}

impl RecordKind {
    pub const ALL: [RecordKind; 9] = [
        RecordKind::A,
        RecordKind::AAAA,
        RecordKind::CNAME,
        RecordKind::TXT,
        RecordKind::NS,
        RecordKind::MX,
        RecordKind::SRV,
        RecordKind::SOA,
        RecordKind::CAA,
    ];

    pub fn rtype(self) -> DNSResourceType {
        match self {
            RecordKind::A => DNSResourceType::A,
            RecordKind::AAAA => DNSResourceType::AAAA,
            RecordKind::CNAME => DNSResourceType::CNAME,
            RecordKind::TXT => DNSResourceType::TXT,
            RecordKind::NS => DNSResourceType::NS,
            RecordKind::MX => DNSResourceType::MX,
            RecordKind::SRV => DNSResourceType::SRV,
            RecordKind::SOA => DNSResourceType::SOA,
            RecordKind::CAA => DNSResourceType::CAA,
        }
    }
}

/// A stored record: the RDATA plus the per-record TTL override, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub ttl: Option<u32>,
    pub rdata: RData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RRSet {
    pub kind: RecordKind,
    pub records: Vec<StoredRecord>,
}

/// Everything stored under one owner name of a zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Name relative to the zone; "" is the apex
    pub name: String,
    /// Non-empty sets only, ordered by kind
    rrsets: Vec<RRSet>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rrsets: Vec::new(),
        }
    }

    /// Decode a stored JSON document. Relative host names are qualified with `zone`.
    pub fn from_json(location: &str, zone: &str, json: &str) -> Result<Self> {
        let document: LocationDocument =
            serde_json::from_str(json).map_err(|e| DnsError::ZoneDataError {
                location: display_name(location, zone),
                reason: e.to_string(),
            })?;
        document.into_location(location, zone)
    }

    /// Append a record, keeping sets in kind order
    pub fn push(&mut self, kind: RecordKind, record: StoredRecord) {
        match self.rrsets.binary_search_by(|set| set.kind.cmp(&kind)) {
            Ok(index) => self.rrsets[index].records.push(record),
            Err(index) => self.rrsets.insert(
                index,
                RRSet {
                    kind,
                    records: vec![record],
                },
            ),
        }
    }

    pub fn rrset(&self, kind: RecordKind) -> Option<&RRSet> {
        self.rrsets.iter().find(|set| set.kind == kind)
    }

    pub fn records(&self, kind: RecordKind) -> &[StoredRecord] {
        self.rrset(kind)
            .map(|set| set.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn rrsets(&self) -> impl Iterator<Item = &RRSet> {
        self.rrsets.iter()
    }

    pub fn record_count(&self) -> usize {
        self.rrsets.iter().map(|set| set.records.len()).sum()
    }

    pub fn is_apex(&self) -> bool {
        self.name.is_empty()
    }
}

fn display_name(location: &str, zone: &str) -> String {
    if location.is_empty() {
        zone.to_string()
    } else {
        format!("{}.{}", location, zone)
    }
}

// Stored document layout. A `ttl` of 0 or an absent `ttl` means no override.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocationDocument {
    a: Vec<AddressV4>,
    aaaa: Vec<AddressV6>,
    cname: Vec<Host>,
    txt: Vec<Text>,
    ns: Vec<Host>,
    mx: Vec<Mail>,
    srv: Vec<Service>,
    soa: Vec<Authority>,
    caa: Vec<Authorization>,
}

#[derive(Debug, Deserialize)]
struct AddressV4 {
    #[serde(default)]
    ttl: u32,
    ip: Ipv4Addr,
}

#[derive(Debug, Deserialize)]
struct AddressV6 {
    #[serde(default)]
    ttl: u32,
    ip: Ipv6Addr,
}

#[derive(Debug, Deserialize)]
struct Host {
    #[serde(default)]
    ttl: u32,
    host: String,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(default)]
    ttl: u32,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Mail {
    #[serde(default)]
    ttl: u32,
    host: String,
    preference: u16,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(default)]
    ttl: u32,
    priority: u16,
    weight: u16,
    port: u16,
    target: String,
}

#[derive(Debug, Deserialize)]
struct Authority {
    #[serde(default)]
    ttl: u32,
    ns: String,
    #[serde(alias = "MBox")]
    mbox: String,
    #[serde(default)]
    serial: u32,
    #[serde(default)]
    refresh: u32,
    #[serde(default)]
    retry: u32,
    #[serde(default)]
    expire: u32,
    #[serde(default)]
    minttl: u32,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    flag: u8,
    tag: String,
    value: String,
}

fn ttl_override(ttl: u32) -> Option<u32> {
    (ttl != 0).then_some(ttl)
}

impl LocationDocument {
    fn into_location(self, location: &str, zone: &str) -> Result<Location> {
        let invalid = |reason: String| DnsError::ZoneDataError {
            location: display_name(location, zone),
            reason,
        };
        name::check_wire(&name::qualify(location, zone)).map_err(invalid)?;
        let host = |h: &str| -> Result<String> {
            let qualified = name::qualify(h, zone);
            name::check_wire(&qualified).map_err(invalid)?;
            Ok(qualified)
        };

        let mut loc = Location::new(location);

        for r in self.a {
            loc.push(RecordKind::A, stored(r.ttl, RData::A(r.ip)));
        }
        for r in self.aaaa {
            loc.push(RecordKind::AAAA, stored(r.ttl, RData::AAAA(r.ip)));
        }
        for r in self.cname {
            loc.push(RecordKind::CNAME, stored(r.ttl, RData::CNAME(host(&r.host)?)));
        }
        for r in self.txt {
            loc.push(RecordKind::TXT, stored(r.ttl, RData::txt(&r.text)));
        }
        for r in self.ns {
            loc.push(RecordKind::NS, stored(r.ttl, RData::NS(host(&r.host)?)));
        }
        for r in self.mx {
            loc.push(
                RecordKind::MX,
                stored(
                    r.ttl,
                    RData::MX {
                        preference: r.preference,
                        exchange: host(&r.host)?,
                    },
                ),
            );
        }
        for r in self.srv {
            loc.push(
                RecordKind::SRV,
                stored(
                    r.ttl,
                    RData::SRV {
                        priority: r.priority,
                        weight: r.weight,
                        port: r.port,
                        target: host(&r.target)?,
                    },
                ),
            );
        }
        for r in self.soa {
            if r.ns.trim().is_empty() || r.mbox.trim().is_empty() {
                return Err(DnsError::ZoneDataError {
                    location: display_name(location, zone),
                    reason: "SOA requires ns and mbox".to_string(),
                });
            }
            loc.push(
                RecordKind::SOA,
                stored(
                    r.ttl,
                    RData::SOA {
                        mname: host(&r.ns)?,
                        rname: host(&r.mbox)?,
                        serial: r.serial,
                        refresh: r.refresh,
                        retry: r.retry,
                        expire: r.expire,
                        minimum: r.minttl,
                    },
                ),
            );
        }
        for r in self.caa {
            if r.tag.is_empty() {
                return Err(DnsError::ZoneDataError {
                    location: display_name(location, zone),
                    reason: "CAA requires a tag".to_string(),
                });
            }
            loc.push(
                RecordKind::CAA,
                stored(
                    r.ttl,
                    RData::CAA {
                        flags: r.flag,
                        tag: r.tag,
                        value: r.value,
                    },
                ),
            );
        }

        Ok(loc)
    }
}

fn stored(ttl: u32, rdata: RData) -> StoredRecord {
    StoredRecord {
        ttl: ttl_override(ttl),
        rdata,
    }
}
