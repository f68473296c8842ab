//! Per-type answer synthesis for a resolved location.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::trace;

use super::Zone;
use super::locate;
use super::record::{Location, RecordKind};
use crate::dns::enums::DNSResourceType;
use crate::dns::name;
use crate::dns::resource::{DNSResource, RData};
use crate::error::{DnsError, Result};
use crate::reverse::ReverseIndex;

/// Query types this server can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    A = 0,
    AAAA,
    CNAME,
    TXT,
    NS,
    MX,
    SRV,
    SOA,
    CAA,
    PTR,
}

impl QueryKind {
    pub fn from_rtype(rtype: DNSResourceType) -> Option<Self> {
        Some(match rtype {
            DNSResourceType::A => QueryKind::A,
            DNSResourceType::AAAA => QueryKind::AAAA,
            DNSResourceType::CNAME => QueryKind::CNAME,
            DNSResourceType::TXT => QueryKind::TXT,
            DNSResourceType::NS => QueryKind::NS,
            DNSResourceType::MX => QueryKind::MX,
            DNSResourceType::SRV => QueryKind::SRV,
            DNSResourceType::SOA => QueryKind::SOA,
            DNSResourceType::CAA => QueryKind::CAA,
            DNSResourceType::PTR => QueryKind::PTR,
            _ => return None,
        })
    }
}

/// Answer and additional sections for one query. Empty answers mean NODATA.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub answers: Vec<DNSResource>,
    pub extras: Vec<DNSResource>,
}

struct Request<'a> {
    synthesizer: &'a AnswerSynthesizer,
    qname: &'a str,
    zone: &'a Zone,
    location: &'a Location,
}

type Synthesize = fn(&Request<'_>) -> Result<Answer>;

/// Indexed by `QueryKind as usize`
const SYNTHESIS: [Synthesize; 10] = [
    |req| Ok(req.records(RecordKind::A)),
    |req| Ok(req.records(RecordKind::AAAA)),
    |req| Ok(req.records(RecordKind::CNAME)),
    |req| Ok(req.records(RecordKind::TXT)),
    |req| Ok(req.with_glue(RecordKind::NS)),
    |req| Ok(req.with_glue(RecordKind::MX)),
    |req| Ok(req.with_glue(RecordKind::SRV)),
    |req| Ok(req.records(RecordKind::SOA)),
    |req| Ok(req.records(RecordKind::CAA)),
    ptr,
];

pub struct AnswerSynthesizer {
    global_ttl: u32,
    reverse: Option<Arc<dyn ReverseIndex>>,
}

impl AnswerSynthesizer {
    /// `global_ttl` applies to records with no override in zones with no default
    pub fn new(global_ttl: u32) -> Self {
        Self {
            global_ttl,
            reverse: None,
        }
    }

    /// Answer PTR queries from `index`
    pub fn with_reverse_index(mut self, index: Arc<dyn ReverseIndex>) -> Self {
        self.reverse = Some(index);
        self
    }

    pub fn global_ttl(&self) -> u32 {
        self.global_ttl
    }

    pub fn synthesize(
        &self,
        qtype: DNSResourceType,
        qname: &str,
        zone: &Zone,
        location: &Location,
    ) -> Result<Answer> {
        let kind = QueryKind::from_rtype(qtype).ok_or(DnsError::UnsupportedType(qtype))?;
        let request = Request {
            synthesizer: self,
            qname,
            zone,
            location,
        };
        let answer = SYNTHESIS[kind as usize](&request)?;
        trace!(
            "{:?} {} -> {} answers, {} extras",
            kind,
            qname,
            answer.answers.len(),
            answer.extras.len()
        );
        Ok(answer)
    }

    /// Whether a PTR query for `qname` can be answered from the reverse index
    /// even though no stored location covers it
    pub fn knows_reverse(&self, qtype: DNSResourceType, qname: &str) -> bool {
        qtype == DNSResourceType::PTR
            && self
                .reverse_hosts(qname)
                .is_some_and(|hosts| !hosts.is_empty())
    }

    fn reverse_hosts(&self, qname: &str) -> Option<Vec<String>> {
        let index = self.reverse.as_ref()?;
        let addr: IpAddr = name::reverse_to_addr(qname)?;
        Some(index.lookup(addr))
    }
}

impl Request<'_> {
    /// The stored set of `kind` under the query name, or the location's CNAME
    /// when it has no such set
    fn records(&self, kind: RecordKind) -> Answer {
        let mut stored = self.location.records(kind);
        if stored.is_empty() && kind != RecordKind::CNAME {
            stored = self.location.records(RecordKind::CNAME);
        }

        let answers = stored
            .iter()
            .map(|record| {
                self.zone
                    .resource(self.qname, record, self.synthesizer.global_ttl)
            })
            .collect();
        Answer {
            answers,
            extras: Vec::new(),
        }
    }

    /// Records of `kind` plus A/AAAA glue for their in-zone targets
    fn with_glue(&self, kind: RecordKind) -> Answer {
        let mut answer = self.records(kind);
        let mut glued: Vec<String> = Vec::new();

        for record in &answer.answers {
            let target = match &record.rdata {
                RData::NS(host) => host,
                RData::MX { exchange, .. } => exchange,
                RData::SRV { target, .. } => target,
                _ => continue,
            };
            let target = name::normalize(target);
            if glued.contains(&target) || !name::is_subdomain(&target, &self.zone.name) {
                continue;
            }

            if let Some(location) = locate::resolve(&target, self.zone)
                .and_then(|found| self.zone.location(&found))
            {
                for glue_kind in [RecordKind::A, RecordKind::AAAA] {
                    for glue in location.records(glue_kind) {
                        answer.extras.push(self.zone.resource(
                            &target,
                            glue,
                            self.synthesizer.global_ttl,
                        ));
                    }
                }
            }
            glued.push(target);
        }

        answer
    }
}

fn ptr(request: &Request<'_>) -> Result<Answer> {
    if request.synthesizer.reverse.is_none() {
        return Err(DnsError::UnsupportedType(DNSResourceType::PTR));
    }

    let ttl = request
        .zone
        .default_ttl
        .unwrap_or(request.synthesizer.global_ttl);
    let answers = request
        .synthesizer
        .reverse_hosts(request.qname)
        .unwrap_or_default()
        .into_iter()
        .map(|host| DNSResource::new(request.qname, ttl, RData::PTR(host)))
        .collect();

    Ok(Answer {
        answers,
        extras: Vec::new(),
    })
}
