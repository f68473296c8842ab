//! Per-query orchestration: zone match, zone load, location lookup, synthesis.
//!
//! Every request ends in exactly one [`Dispatch`]: delegate to the next
//! handler, answer with a single message, or stream a zone transfer.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dns::enums::{DNSResourceClass, DNSResourceType, ResponseCode};
use crate::dns::name;
use crate::dns::resource::DNSResource;
use crate::dns::DNSPacket;
use crate::error::DnsError;
use crate::zone::{
    locate, match_zone, AnswerSynthesizer, TransferEngine, TransferStream, Zone, ZoneCache,
};

/// Outcome of dispatching one request
pub enum Dispatch {
    /// Not authoritative here; hand the query to the next handler unchanged
    Delegate,
    /// A single response message
    Respond(DNSPacket),
    /// A running zone transfer
    Transfer(TransferSession),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Delegate => write!(f, "Delegate"),
            Dispatch::Respond(packet) => write!(f, "Respond({:?})", packet.rcode()),
            Dispatch::Transfer(session) => write!(f, "Transfer({})", session.zone.name),
        }
    }
}

pub struct QueryDispatcher {
    cache: Arc<ZoneCache>,
    synthesizer: AnswerSynthesizer,
    transfer: TransferEngine,
}

impl QueryDispatcher {
    pub fn new(cache: Arc<ZoneCache>, synthesizer: AnswerSynthesizer, transfer: TransferEngine) -> Self {
        Self {
            cache,
            synthesizer,
            transfer,
        }
    }

    pub fn cache(&self) -> &Arc<ZoneCache> {
        &self.cache
    }

    pub async fn dispatch(&self, query: &DNSPacket) -> Dispatch {
        if query.header.qr {
            debug!("Received DNS response instead of query");
            return Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::FormatError));
        }
        let Some(question) = query.question() else {
            debug!("Query without a question");
            return Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::FormatError));
        };
        if query.header.opcode != 0 {
            debug!("Unsupported opcode {}", query.header.opcode);
            return Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::NotImplemented));
        }
        // Stored data is IN only
        if !matches!(question.qclass, DNSResourceClass::IN | DNSResourceClass::ANY) {
            debug!("Refusing {:?} class query", question.qclass);
            return Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::Refused));
        }

        let qname = name::normalize(&question.name);
        let qtype = question.qtype;
        debug!("Handling {:?} {}", qtype, qname);

        let zones = match self.cache.zone_names().await {
            Ok(zones) => zones,
            Err(e) => {
                error!("Failed to load zone list: {}", e);
                return Dispatch::Delegate;
            }
        };
        let Some(zone_name) = match_zone(&qname, zones.iter()) else {
            debug!("No zone for {}, delegating", qname);
            return Dispatch::Delegate;
        };

        let zone = match self.cache.load(zone_name).await {
            Ok(zone) => zone,
            Err(e) => {
                error!("Failed to load zone {}: {}", zone_name, e);
                return Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::ServerFailure));
            }
        };

        if qtype == DNSResourceType::AXFR {
            info!("AXFR of {} requested", zone.name);
            let stream = self.transfer.transfer(zone.clone());
            return Dispatch::Transfer(TransferSession::new(
                query,
                zone,
                stream,
                self.synthesizer.global_ttl(),
            ));
        }

        let location = match locate::resolve(&qname, &zone) {
            Some(location) => location,
            None if self.synthesizer.knows_reverse(qtype, &qname) => String::new(),
            None => {
                debug!("{}", DnsError::NameError(qname.clone()));
                return Dispatch::Respond(self.negative(query, &zone, ResponseCode::NameError));
            }
        };
        let Some(stored) = zone.location(&location) else {
            return Dispatch::Respond(self.negative(query, &zone, ResponseCode::NameError));
        };

        match self.synthesizer.synthesize(qtype, &qname, &zone, stored) {
            Ok(answer) if answer.answers.is_empty() => {
                Dispatch::Respond(self.negative(query, &zone, ResponseCode::NoError))
            }
            Ok(answer) => {
                let mut response = DNSPacket::reply(query);
                response.answers = answer.answers;
                response.resources = answer.extras;
                Dispatch::Respond(response)
            }
            Err(DnsError::UnsupportedType(rtype)) => {
                debug!("Unsupported query type {:?} for {}", rtype, qname);
                Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::NotImplemented))
            }
            Err(e) => {
                warn!("Failed to answer {:?} {}: {}", qtype, qname, e);
                Dispatch::Respond(DNSPacket::error_reply(query, ResponseCode::ServerFailure))
            }
        }
    }

    /// NXDOMAIN or NODATA carrying the zone SOA in the authority section
    fn negative(&self, query: &DNSPacket, zone: &Zone, rcode: ResponseCode) -> DNSPacket {
        let mut response = DNSPacket::error_reply(query, rcode);
        response
            .authorities
            .push(zone.soa_record(self.synthesizer.global_ttl()));
        response
    }
}

/// One AXFR in progress: a message per envelope, then the closing SOA
pub struct TransferSession {
    query: DNSPacket,
    zone: Arc<Zone>,
    stream: TransferStream,
    closing_soa: Option<DNSResource>,
    messages: usize,
}

impl TransferSession {
    fn new(query: &DNSPacket, zone: Arc<Zone>, stream: TransferStream, global_ttl: u32) -> Self {
        let closing_soa = Some(zone.soa_record(global_ttl));
        Self {
            query: query.clone(),
            zone,
            stream,
            closing_soa,
            messages: 0,
        }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    /// Next message to send, or None when the transfer is complete or cancelled
    pub async fn next_message(&mut self) -> Option<DNSPacket> {
        let records = match self.stream.next().await {
            Some(envelope) => envelope.records,
            None => {
                if self.stream.cancel_token().is_cancelled() {
                    return None;
                }
                let soa = self.closing_soa.take()?;
                debug!(
                    "Transfer of {} complete after {} messages",
                    self.zone.name,
                    self.messages + 1
                );
                vec![soa]
            }
        };

        let mut message = DNSPacket::reply(&self.query);
        if self.messages > 0 {
            // Only the first message repeats the question
            message.questions.clear();
        }
        message.answers = records;
        self.messages += 1;
        Some(message)
    }

    /// Stop the producer; used when the client goes away
    pub fn cancel(&self) {
        self.stream.cancel();
    }
}
