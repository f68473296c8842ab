use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{
    ParseError,
    common::{WireReader, WireWriter, name_wire_len},
    enums::{DNSResourceClass, DNSResourceType},
};

/// Fixed part of a resource record after the owner name: TYPE, CLASS, TTL, RDLENGTH
const RR_FIXED_LEN: usize = 10;

/// Longest character-string in TXT RDATA
const TXT_CHUNK_LEN: usize = 255;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DNSResource {
    /// Fully qualified owner name
    pub name: String,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    MX {
        preference: u16,
        exchange: String,
    },
    TXT(Vec<String>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    CAA {
        flags: u8,
        tag: String,
        value: String,
    },
    /// Anything we do not decode is carried verbatim
    Raw(Vec<u8>),
}

impl RData {
    pub fn rtype(&self) -> Option<DNSResourceType> {
        Some(match self {
            RData::A(_) => DNSResourceType::A,
            RData::AAAA(_) => DNSResourceType::AAAA,
            RData::NS(_) => DNSResourceType::NS,
            RData::CNAME(_) => DNSResourceType::CNAME,
            RData::PTR(_) => DNSResourceType::PTR,
            RData::MX { .. } => DNSResourceType::MX,
            RData::TXT(_) => DNSResourceType::TXT,
            RData::SRV { .. } => DNSResourceType::SRV,
            RData::SOA { .. } => DNSResourceType::SOA,
            RData::CAA { .. } => DNSResourceType::CAA,
            RData::Raw(_) => return None,
        })
    }

    /// Split text into the 255 byte character-strings TXT RDATA is made of
    ///
    /// Cuts only on char boundaries, so a chunk may come up short of 255 bytes.
    pub fn txt(text: &str) -> Self {
        let mut chunks = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let mut cut = rest.len().min(TXT_CHUNK_LEN);
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            let (chunk, tail) = rest.split_at(cut);
            chunks.push(chunk.to_string());
            rest = tail;
        }
        if chunks.is_empty() {
            chunks.push(String::new());
        }
        RData::TXT(chunks)
    }

    fn write(&self, writer: &mut WireWriter) -> Result<(), ParseError> {
        match self {
            RData::A(addr) => writer.put_bytes(&addr.octets()),
            RData::AAAA(addr) => writer.put_bytes(&addr.octets()),
            RData::NS(host) | RData::CNAME(host) | RData::PTR(host) => writer.put_name(host)?,
            RData::MX {
                preference,
                exchange,
            } => {
                writer.put_u16(*preference);
                writer.put_name(exchange)?;
            }
            RData::TXT(strings) => {
                for s in strings {
                    if s.len() > 255 {
                        return Err(ParseError::InvalidRData(
                            "TXT character-string exceeds 255 bytes".to_string(),
                        ));
                    }
                    writer.put_u8(s.len() as u8);
                    writer.put_bytes(s.as_bytes());
                }
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                writer.put_u16(*priority);
                writer.put_u16(*weight);
                writer.put_u16(*port);
                writer.put_name_uncompressed(target)?;
            }
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.put_name(mname)?;
                writer.put_name(rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    writer.put_u32(*value);
                }
            }
            RData::CAA { flags, tag, value } => {
                if tag.is_empty() || tag.len() > 255 {
                    return Err(ParseError::InvalidRData("invalid CAA tag".to_string()));
                }
                writer.put_u8(*flags);
                writer.put_u8(tag.len() as u8);
                writer.put_bytes(tag.as_bytes());
                writer.put_bytes(value.as_bytes());
            }
            RData::Raw(bytes) => writer.put_bytes(bytes),
        }
        Ok(())
    }

    fn read(
        rtype: DNSResourceType,
        reader: &mut WireReader<'_>,
        rdlength: usize,
    ) -> Result<Self, ParseError> {
        let end = reader.position() + rdlength;
        let rdata = match rtype {
            DNSResourceType::A if rdlength == 4 => {
                let b = reader.read_bytes(4)?;
                RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            DNSResourceType::AAAA if rdlength == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(reader.read_bytes(16)?);
                RData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::NS => RData::NS(reader.read_name()?),
            DNSResourceType::CNAME => RData::CNAME(reader.read_name()?),
            DNSResourceType::PTR => RData::PTR(reader.read_name()?),
            DNSResourceType::MX => RData::MX {
                preference: reader.read_u16()?,
                exchange: reader.read_name()?,
            },
            DNSResourceType::TXT => {
                let mut strings = Vec::new();
                while reader.position() < end {
                    let len = reader.read_u8()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    strings.push(String::from_utf8_lossy(bytes).into_owned());
                }
                RData::TXT(strings)
            }
            DNSResourceType::SRV => RData::SRV {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_name()?,
            },
            DNSResourceType::SOA => RData::SOA {
                mname: reader.read_name()?,
                rname: reader.read_name()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            DNSResourceType::CAA if rdlength >= 2 => {
                let flags = reader.read_u8()?;
                let tag_len = reader.read_u8()? as usize;
                let tag = String::from_utf8_lossy(reader.read_bytes(tag_len)?).into_owned();
                let value_len = end
                    .checked_sub(reader.position())
                    .ok_or(ParseError::InvalidAnswerSection)?;
                let value = String::from_utf8_lossy(reader.read_bytes(value_len)?).into_owned();
                RData::CAA { flags, tag, value }
            }
            _ => RData::Raw(reader.read_bytes(rdlength)?.to_vec()),
        };

        if reader.position() != end {
            return Err(ParseError::InvalidRData(format!(
                "{:?} RDATA does not match RDLENGTH {}",
                rtype, rdlength
            )));
        }
        Ok(rdata)
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{}", addr),
            RData::AAAA(addr) => write!(f, "{}", addr),
            RData::NS(host) | RData::CNAME(host) | RData::PTR(host) => write!(f, "{}", host),
            RData::MX {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            RData::TXT(strings) => {
                let quoted: Vec<String> = strings.iter().map(|s| format!("\"{}\"", s)).collect();
                write!(f, "{}", quoted.join(" "))
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            RData::CAA { flags, tag, value } => write!(f, "{} {} \"{}\"", flags, tag, value),
            RData::Raw(bytes) => write!(f, "\\# {}", bytes.len()),
        }
    }
}

impl DNSResource {
    pub fn new(name: &str, ttl: u32, rdata: RData) -> Self {
        Self {
            name: super::name::fqdn(name),
            rtype: rdata.rtype().unwrap_or_default(),
            rclass: DNSResourceClass::IN,
            ttl,
            rdata,
        }
    }

    pub fn write(&self, writer: &mut WireWriter) -> Result<(), ParseError> {
        writer.put_name(&self.name)?;
        writer.put_u16(self.rtype.into());
        writer.put_u16(self.rclass.into());
        writer.put_u32(self.ttl);

        let rdlength_at = writer.len();
        writer.put_u16(0);
        self.rdata.write(writer)?;
        let rdlength = writer.len() - rdlength_at - 2;
        if rdlength > u16::MAX as usize {
            return Err(ParseError::InvalidRData("RDATA exceeds 65535 bytes".to_string()));
        }
        writer.patch_u16(rdlength_at, rdlength as u16);
        Ok(())
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError> {
        let name = reader.read_name()?;
        let rtype: DNSResourceType = reader.read_u16()?.into();
        let rclass = reader.read_u16()?.into();
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;
        if rdlength > reader.remaining() {
            return Err(ParseError::UnexpectedEnd);
        }
        let rdata = RData::read(rtype, reader, rdlength)?;
        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }

    /// Uncompressed wire size, the figure zone transfer envelopes are budgeted by
    pub fn wire_len(&self) -> usize {
        let mut writer = WireWriter::new(false);
        match self.rdata.write(&mut writer) {
            Ok(()) => name_wire_len(&self.name) + RR_FIXED_LEN + writer.len(),
            // Unencodable records still occupy an envelope of their own
            Err(_) => usize::MAX,
        }
    }
}

impl fmt::Display for DNSResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {:?} {}",
            self.name, self.ttl, self.rtype, self.rdata
        )
    }
}
