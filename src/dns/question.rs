use super::{
    ParseError,
    common::{WireReader, WireWriter},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    /// Fully qualified name as received, case preserved
    pub name: String,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn new(name: &str, qtype: DNSResourceType) -> Self {
        Self {
            name: super::name::fqdn(name),
            qtype,
            qclass: DNSResourceClass::IN,
        }
    }

    pub fn write(&self, writer: &mut WireWriter) -> Result<(), ParseError> {
        writer.put_name(&self.name)?;
        writer.put_u16(self.qtype.into());
        writer.put_u16(self.qclass.into());
        Ok(())
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ParseError> {
        let name = reader
            .read_name()
            .map_err(|_| ParseError::InvalidQuestionSection)?;
        let qtype = reader.read_u16()?.into();
        let qclass = reader.read_u16()?.into();
        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}
