use std::collections::HashMap;
use tracing::warn;

use super::record::{Location, RecordKind, StoredRecord};
use crate::dns::name;
use crate::dns::resource::{DNSResource, RData};
use crate::error::{DnsError, Result};

/// A fully loaded zone. Immutable once built; a refresh builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Normalized zone name, e.g. "example.org."
    pub name: String,
    /// Apex SOA as stored
    pub soa: StoredRecord,
    /// TTL of the apex SOA entry, applied to records without an override
    pub default_ttl: Option<u32>,
    /// Sorted by location name
    locations: Vec<Location>,
    index: HashMap<String, usize>,
}

impl Zone {
    /// Assemble a zone from its decoded locations. Fails without an apex SOA.
    pub fn new(name: &str, mut locations: Vec<Location>) -> Result<Self> {
        let name = name::normalize(name);

        locations.sort_by(|a, b| a.name.cmp(&b.name));
        locations.dedup_by(|later, kept| {
            let duplicate = later.name == kept.name;
            if duplicate {
                warn!(
                    "Duplicate location '{}' in zone {}, keeping the first",
                    later.name, name
                );
            }
            duplicate
        });

        let soa = locations
            .first()
            .filter(|apex| apex.is_apex())
            .and_then(|apex| apex.records(RecordKind::SOA).first())
            .cloned()
            .ok_or_else(|| DnsError::ZoneDataError {
                location: name.clone(),
                reason: "zone has no apex SOA".to_string(),
            })?;

        let index = locations
            .iter()
            .enumerate()
            .map(|(i, location)| (location.name.clone(), i))
            .collect();

        Ok(Self {
            default_ttl: soa.ttl,
            name,
            soa,
            locations,
            index,
        })
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.index.get(name).map(|&i| &self.locations[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn apex(&self) -> Option<&Location> {
        self.location("")
    }

    /// Locations in name order
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn record_count(&self) -> usize {
        self.locations.iter().map(Location::record_count).sum()
    }

    /// Fully qualified owner name of a location
    pub fn owner_name(&self, location: &str) -> String {
        if location.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", location, self.name)
        }
    }

    /// Record override, then zone default, then `global_ttl`
    pub fn ttl_for(&self, record: &StoredRecord, global_ttl: u32) -> u32 {
        record.ttl.or(self.default_ttl).unwrap_or(global_ttl)
    }

    /// Materialize a stored record under `owner`
    pub fn resource(&self, owner: &str, record: &StoredRecord, global_ttl: u32) -> DNSResource {
        DNSResource::new(owner, self.ttl_for(record, global_ttl), record.rdata.clone())
    }

    /// The apex SOA as a resource record
    pub fn soa_record(&self, global_ttl: u32) -> DNSResource {
        self.resource(&self.name, &self.soa, global_ttl)
    }

    /// SOA serial, for logging transfers
    pub fn serial(&self) -> u32 {
        match &self.soa.rdata {
            RData::SOA { serial, .. } => *serial,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soa() -> StoredRecord {
        StoredRecord {
            ttl: Some(3600),
            rdata: RData::SOA {
                mname: "ns1.example.org.".to_string(),
                rname: "hostmaster.example.org.".to_string(),
                serial: 42,
                refresh: 3600,
                retry: 600,
                expire: 86400,
                minimum: 300,
            },
        }
    }

    fn a(ip: &str, ttl: Option<u32>) -> StoredRecord {
        StoredRecord {
            ttl,
            rdata: RData::A(ip.parse().unwrap()),
        }
    }

    #[test]
    fn test_zone_requires_apex_soa() {
        let mut www = Location::new("www");
        www.push(RecordKind::A, a("203.0.113.5", None));
        assert!(matches!(
            Zone::new("example.org", vec![www]),
            Err(DnsError::ZoneDataError { .. })
        ));
    }

    #[test]
    fn test_locations_sorted_and_indexed() {
        let mut apex = Location::new("");
        apex.push(RecordKind::SOA, soa());
        let mut www = Location::new("www");
        www.push(RecordKind::A, a("203.0.113.5", None));
        let mut mail = Location::new("mail");
        mail.push(RecordKind::A, a("203.0.113.25", None));

        let zone = Zone::new("Example.org", vec![www, apex, mail]).unwrap();
        assert_eq!(zone.name, "example.org.");
        assert_eq!(zone.serial(), 42);
        let names: Vec<&str> = zone.locations().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["", "mail", "www"]);
        assert!(zone.contains("www"));
        assert_eq!(zone.owner_name("www"), "www.example.org.");
        assert_eq!(zone.record_count(), 3);
    }

    #[test]
    fn test_ttl_precedence() {
        let mut apex = Location::new("");
        apex.push(RecordKind::SOA, soa());
        let zone = Zone::new("example.org.", vec![apex.clone()]).unwrap();

        assert_eq!(zone.ttl_for(&a("192.0.2.1", Some(10)), 300), 10);
        assert_eq!(zone.ttl_for(&a("192.0.2.1", None), 300), 3600);

        let mut plain = Location::new("");
        plain.push(
            RecordKind::SOA,
            StoredRecord {
                ttl: None,
                ..soa()
            },
        );
        let zone = Zone::new("example.org.", vec![plain]).unwrap();
        assert_eq!(zone.ttl_for(&a("192.0.2.1", None), 300), 300);
    }
}
