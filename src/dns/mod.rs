pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::{PacketComponent, WireReader, WireWriter};
use edns::EdnsOpt;
use enums::{DNSResourceType, ResponseCode};
use header::{DNSHeader, HEADER_LEN};
use question::DNSQuestion;
use resource::DNSResource;
use thiserror::Error;
use tracing::{debug, trace};

pub use edns::MIN_UDP_PAYLOAD;

/// Largest message a TCP length prefix can frame
pub const MAX_TCP_MESSAGE: usize = 65535;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
    /// EDNS0 OPT record if present (extracted from additional records)
    pub edns: Option<EdnsOpt>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("header shorter than {HEADER_LEN} bytes")]
    InvalidHeader,
    #[error("malformed name label")]
    InvalidLabel,
    #[error("malformed question section")]
    InvalidQuestionSection,
    #[error("malformed answer section")]
    InvalidAnswerSection,
    #[error("bad RDATA: {0}")]
    InvalidRData(String),
    #[error("message ended early")]
    UnexpectedEnd,
    #[error("bit stream: {0}")]
    InvalidBitStream(#[from] std::io::Error),
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        if buf.len() < HEADER_LEN {
            return Err(ParseError::InvalidHeader);
        }

        let mut packet = DNSPacket::default();
        let mut bits = BitReader::<_, BigEndian>::new(&buf[..HEADER_LEN]);
        packet.header.read(&mut bits)?;
        debug!(
            "Parsed DNS header: id={}, qr={}, opcode={}, questions={}",
            packet.header.id, packet.header.qr, packet.header.opcode, packet.header.qdcount
        );

        let mut reader = WireReader::new(buf, HEADER_LEN);
        for _ in 0..packet.header.qdcount {
            packet.questions.push(DNSQuestion::read(&mut reader)?);
        }
        for _ in 0..packet.header.ancount {
            packet.answers.push(DNSResource::read(&mut reader)?);
        }
        for _ in 0..packet.header.nscount {
            packet.authorities.push(DNSResource::read(&mut reader)?);
        }
        for _ in 0..packet.header.arcount {
            let start = reader.position();
            let owner = reader.read_name()?;
            let rtype: DNSResourceType = reader.read_u16()?.into();

            if rtype == DNSResourceType::OPT && owner == "." {
                let class = reader.read_u16()?;
                let ttl = reader.read_u32()?;
                let len = reader.read_u16()? as usize;
                let rdata = reader.read_bytes(len)?;
                packet.edns = Some(EdnsOpt::from_resource(class, ttl, rdata));
                continue;
            }

            let mut record_reader = WireReader::new(buf, start);
            packet.resources.push(DNSResource::read(&mut record_reader)?);
            reader = record_reader;
        }

        Ok(packet)
    }

    /// Serialize with name compression; section counts are taken from the sections
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.resources.len() as u16 + self.edns.is_some() as u16;

        let mut header_bytes = Vec::with_capacity(HEADER_LEN);
        {
            let mut bits: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut header_bytes);
            header.write(&mut bits)?;
        }

        let mut writer = WireWriter::new(true);
        writer.put_bytes(&header_bytes);
        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.resources)
        {
            record.write(&mut writer)?;
        }
        if let Some(edns) = &self.edns {
            edns.write(&mut writer)?;
        }

        Ok(writer.into_inner())
    }

    /// Serialize so the message fits `max_size`: additional records go first,
    /// then authority, and finally the answers with TC set.
    pub fn serialize_within(&self, max_size: usize) -> Result<Vec<u8>, ParseError> {
        let wire = self.serialize()?;
        if wire.len() <= max_size {
            return Ok(wire);
        }

        let mut trimmed = self.clone();
        trimmed.resources.clear();
        let wire = trimmed.serialize()?;
        if wire.len() <= max_size {
            debug!("Dropped additional section to fit {} bytes", max_size);
            return Ok(wire);
        }

        trimmed.authorities.clear();
        let wire = trimmed.serialize()?;
        if wire.len() <= max_size {
            return Ok(wire);
        }

        debug!("Response exceeds {} bytes, truncating", max_size);
        trimmed.answers.clear();
        trimmed.header.tc = true;
        trimmed.serialize()
    }

    /// Skeleton authoritative reply: question copied, AA set, RA cleared
    pub fn reply(query: &DNSPacket) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                aa: true,
                tc: false,
                rd: query.header.rd,
                ra: false,
                z: 0,
                rcode: ResponseCode::NoError as u8,
                ..Default::default()
            },
            questions: query.questions.clone(),
            edns: query.edns.as_ref().map(|_| EdnsOpt::default()),
            ..Default::default()
        }
    }

    pub fn error_reply(query: &DNSPacket, rcode: ResponseCode) -> Self {
        let mut response = Self::reply(query);
        response.header.rcode = rcode as u8;
        response
    }

    pub fn question(&self) -> Option<&DNSQuestion> {
        self.questions.first()
    }

    pub fn rcode(&self) -> ResponseCode {
        ResponseCode::from(self.header.rcode)
    }

    /// Largest UDP response the client accepts
    pub fn max_udp_payload_size(&self) -> usize {
        self.edns
            .as_ref()
            .map(|edns| edns.effective_payload_size())
            .unwrap_or(MIN_UDP_PAYLOAD) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resource::RData;

    fn query(name: &str, qtype: DNSResourceType) -> DNSPacket {
        DNSPacket {
            header: DNSHeader {
                id: 4242,
                rd: true,
                ..Default::default()
            },
            questions: vec![DNSQuestion::new(name, qtype)],
            ..Default::default()
        }
    }

    #[test]
    fn test_query_roundtrip() {
        let mut packet = query("www.example.org.", DNSResourceType::A);
        packet.edns = Some(EdnsOpt::with_payload_size(1232));

        let wire = packet.serialize().unwrap();
        let parsed = DNSPacket::parse(&wire).unwrap();

        assert_eq!(parsed.header.id, 4242);
        assert_eq!(parsed.questions, packet.questions);
        assert_eq!(parsed.max_udp_payload_size(), 1232);
        assert!(parsed.resources.is_empty());
    }

    #[test]
    fn test_response_uses_compression() {
        let q = query("www.example.org.", DNSResourceType::A);
        let mut response = DNSPacket::reply(&q);
        for i in 1..=3 {
            response.answers.push(DNSResource::new(
                "www.example.org.",
                300,
                RData::A(format!("203.0.113.{}", i).parse().unwrap()),
            ));
        }

        let wire = response.serialize().unwrap();
        // header 12, question 17 + 4, each answer is a 2 byte pointer + 10 + 4
        assert_eq!(wire.len(), 12 + 21 + 3 * 16);

        let parsed = DNSPacket::parse(&wire).unwrap();
        assert!(parsed.header.aa);
        assert!(!parsed.header.ra);
        assert_eq!(parsed.answers, response.answers);
    }

    #[test]
    fn test_serialize_within_truncates() {
        let q = query("big.example.org.", DNSResourceType::TXT);
        let mut response = DNSPacket::reply(&q);
        for _ in 0..4 {
            response
                .answers
                .push(DNSResource::new("big.example.org.", 60, RData::txt(&"t".repeat(200))));
        }
        response.resources.push(DNSResource::new(
            "ns1.example.org.",
            60,
            RData::A("192.0.2.1".parse().unwrap()),
        ));

        let wire = response.serialize_within(512).unwrap();
        assert!(wire.len() <= 512);
        let parsed = DNSPacket::parse(&wire).unwrap();
        assert!(parsed.header.tc);
        assert!(parsed.answers.is_empty());
        assert_eq!(parsed.questions.len(), 1);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        assert!(DNSPacket::parse(&[0u8; 5]).is_err());
    }
}
