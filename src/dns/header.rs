use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{ParseError, common::PacketComponent};

/// Size of the fixed DNS header on the wire
pub const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DNSHeader {
    /// QDCOUNT, ANCOUNT, NSCOUNT, ARCOUNT in wire order
    pub fn counts(&self) -> [u16; 4] {
        [self.qdcount, self.ancount, self.nscount, self.arcount]
    }

    fn set_counts(&mut self, [qd, an, ns, ar]: [u16; 4]) {
        self.qdcount = qd;
        self.ancount = an;
        self.nscount = ns;
        self.arcount = ar;
    }
}

impl PacketComponent for DNSHeader {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        writer.write_var::<u16>(16, self.id)?;
        writer.write_bit(self.qr)?;
        writer.write_var::<u8>(4, self.opcode & 0x0F)?;
        for flag in [self.aa, self.tc, self.rd, self.ra] {
            writer.write_bit(flag)?;
        }
        writer.write_var::<u8>(3, self.z & 0x07)?;
        writer.write_var::<u8>(4, self.rcode & 0x0F)?;
        for count in self.counts() {
            writer.write_var::<u16>(16, count)?;
        }
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        self.id = reader.read_var::<u16>(16)?;
        self.qr = reader.read_bit()?;
        self.opcode = reader.read_var::<u8>(4)?;
        self.aa = reader.read_bit()?;
        self.tc = reader.read_bit()?;
        self.rd = reader.read_bit()?;
        self.ra = reader.read_bit()?;
        self.z = reader.read_var::<u8>(3)?;
        self.rcode = reader.read_var::<u8>(4)?;

        let mut counts = [0u16; 4];
        for count in counts.iter_mut() {
            *count = reader.read_var::<u16>(16)?;
        }
        self.set_counts(counts);
        Ok(())
    }
}
