use super::{ParseError, common::WireWriter};

/// Smallest payload a client can advertise (RFC 6891 §6.2.5)
pub const MIN_UDP_PAYLOAD: u16 = 512;

/// Largest UDP payload this server will fill
pub const MAX_UDP_PAYLOAD: u16 = 4096;

/// EDNS0 OPT pseudo-record
/// RFC 6891: https://tools.ietf.org/html/rfc6891
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOpt {
    /// UDP payload size that can be handled by the requestor
    pub udp_payload_size: u16,
    /// Extended RCODE (high 8 bits)
    pub extended_rcode: u8,
    /// EDNS version (currently 0)
    pub version: u8,
    /// EDNS flags (16 bits)
    pub flags: u16,
    /// Raw option data, kept opaque
    pub options: Vec<u8>,
}

impl Default for EdnsOpt {
    fn default() -> Self {
        Self::with_payload_size(MAX_UDP_PAYLOAD)
    }
}

impl EdnsOpt {
    pub fn with_payload_size(payload_size: u16) -> Self {
        Self {
            udp_payload_size: payload_size,
            extended_rcode: 0,
            version: 0,
            flags: 0,
            options: Vec::new(),
        }
    }

    /// Build from the CLASS, TTL and RDATA fields of an OPT record
    pub fn from_resource(class: u16, ttl: u32, rdata: &[u8]) -> Self {
        Self {
            udp_payload_size: class,
            extended_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            flags: ttl as u16,
            options: rdata.to_vec(),
        }
    }

    /// Check if DNSSEC OK (DO) flag is set
    pub fn do_flag(&self) -> bool {
        (self.flags & 0x8000) != 0
    }

    /// Payload size clamped to what we are willing to send
    pub fn effective_payload_size(&self) -> u16 {
        self.udp_payload_size.clamp(MIN_UDP_PAYLOAD, MAX_UDP_PAYLOAD)
    }

    pub fn write(&self, writer: &mut WireWriter) -> Result<(), ParseError> {
        // Root owner name
        writer.put_u8(0);
        writer.put_u16(41);
        writer.put_u16(self.udp_payload_size);
        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | self.flags as u32;
        writer.put_u32(ttl);
        writer.put_u16(self.options.len() as u16);
        writer.put_bytes(&self.options);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size_is_clamped() {
        assert_eq!(EdnsOpt::with_payload_size(100).effective_payload_size(), 512);
        assert_eq!(EdnsOpt::with_payload_size(1232).effective_payload_size(), 1232);
        assert_eq!(EdnsOpt::with_payload_size(65000).effective_payload_size(), 4096);
    }

    #[test]
    fn test_ttl_field_split() {
        let opt = EdnsOpt::from_resource(1232, 0x0000_8000, &[]);
        assert!(opt.do_flag());
        assert_eq!(opt.version, 0);
        assert_eq!(opt.udp_payload_size, 1232);
    }
}
