use bitstream_io::{BitReader, BitWriter, Endianness};
use std::collections::HashMap;

use super::ParseError;

/// Maximum length of a single label
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum wire length of an encoded name
pub const MAX_NAME_LEN: usize = 255;

/// Compression pointers can only address the first 16KiB of a message
const MAX_POINTER_OFFSET: usize = 0x3FFF;

/// Guards against pointer loops in hostile packets
const MAX_POINTER_JUMPS: usize = 16;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;
    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError>;
}

/// Byte-oriented message writer with optional name compression (RFC 1035 §4.1.4)
pub struct WireWriter {
    buf: Vec<u8>,
    names: HashMap<String, u16>,
    compress: bool,
}

impl WireWriter {
    pub fn new(compress: bool) -> Self {
        Self {
            buf: Vec::with_capacity(512),
            names: HashMap::new(),
            compress,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite a previously reserved u16, used for RDLENGTH
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Write a name, pointing at an earlier copy of any suffix when compression is on
    pub fn put_name(&mut self, name: &str) -> Result<(), ParseError> {
        self.write_name(name, self.compress)
    }

    /// Write a name that must never be compressed (e.g. SRV targets, RFC 2782)
    pub fn put_name_uncompressed(&mut self, name: &str) -> Result<(), ParseError> {
        self.write_name(name, false)
    }

    fn write_name(&mut self, name: &str, compress: bool) -> Result<(), ParseError> {
        let labels = split_labels(name);
        if name_wire_len(name) > MAX_NAME_LEN {
            return Err(ParseError::InvalidLabel);
        }

        for i in 0..labels.len() {
            let suffix = labels[i..].join(".").to_ascii_lowercase();
            if compress {
                if let Some(&offset) = self.names.get(&suffix) {
                    self.put_u16(0xC000 | offset);
                    return Ok(());
                }
            }
            if self.buf.len() <= MAX_POINTER_OFFSET {
                self.names.entry(suffix).or_insert(self.buf.len() as u16);
            }

            let label = labels[i];
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(ParseError::InvalidLabel);
            }
            self.put_u8(label.len() as u8);
            self.put_bytes(label.as_bytes());
        }

        self.put_u8(0);
        Ok(())
    }
}

/// Cursor over a received message; names may point anywhere in the buffer
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        let byte = *self.buf.get(self.pos).ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(len).ok_or(ParseError::UnexpectedEnd)?;
        let bytes = self.buf.get(self.pos..end).ok_or(ParseError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a possibly compressed name and return it fully qualified ("www.example.org.")
    pub fn read_name(&mut self) -> Result<String, ParseError> {
        let mut labels: Vec<String> = Vec::new();
        let mut offset = self.pos;
        let mut resume_at = None;
        let mut jumps = 0;

        loop {
            let len = *self.buf.get(offset).ok_or(ParseError::InvalidLabel)? as usize;

            if len & 0xC0 == 0xC0 {
                let low = *self.buf.get(offset + 1).ok_or(ParseError::InvalidLabel)? as usize;
                if resume_at.is_none() {
                    resume_at = Some(offset + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(ParseError::InvalidLabel);
                }
                offset = ((len & 0x3F) << 8) | low;
                continue;
            }

            if len == 0 {
                offset += 1;
                break;
            }
            if len > MAX_LABEL_LEN {
                return Err(ParseError::InvalidLabel);
            }

            let start = offset + 1;
            let label = self
                .buf
                .get(start..start + len)
                .ok_or(ParseError::InvalidLabel)?;
            labels.push(String::from_utf8(label.to_vec()).map_err(|_| ParseError::InvalidLabel)?);
            offset = start + len;
        }

        self.pos = resume_at.unwrap_or(offset);

        if labels.is_empty() {
            return Ok(".".to_string());
        }
        let mut name = labels.join(".");
        name.push('.');
        Ok(name)
    }
}

/// Labels of a name without the root label; "." and "" yield no labels
pub fn split_labels(name: &str) -> Vec<&str> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('.').collect()
}

/// Uncompressed wire length of a name, root label included
pub fn name_wire_len(name: &str) -> usize {
    split_labels(name).iter().map(|l| l.len() + 1).sum::<usize>() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_compression_reuses_suffix() {
        let mut writer = WireWriter::new(true);
        writer.put_name("www.example.org.").unwrap();
        let first_len = writer.len();
        writer.put_name("mail.example.org.").unwrap();

        // "mail" label plus a two byte pointer to "example.org."
        assert_eq!(writer.len() - first_len, 1 + 4 + 2);

        let buf = writer.into_inner();
        let mut reader = WireReader::new(&buf, first_len);
        assert_eq!(reader.read_name().unwrap(), "mail.example.org.");
        assert_eq!(reader.position(), buf.len());
    }

    #[test]
    fn test_uncompressed_writer_never_points() {
        let mut writer = WireWriter::new(false);
        writer.put_name("a.example.org.").unwrap();
        writer.put_name("b.example.org.").unwrap();
        assert_eq!(writer.len(), 2 * name_wire_len("a.example.org."));
    }

    #[test]
    fn test_root_name() {
        let mut writer = WireWriter::new(true);
        writer.put_name(".").unwrap();
        let buf = writer.into_inner();
        assert_eq!(buf, vec![0]);
        assert_eq!(WireReader::new(&buf, 0).read_name().unwrap(), ".");
    }

    #[test]
    fn test_pointer_loop_is_rejected() {
        let buf = [0xC0, 0x00];
        assert!(WireReader::new(&buf, 0).read_name().is_err());
    }

    #[test]
    fn test_label_too_long() {
        let long = format!("{}.example.org.", "a".repeat(64));
        let mut writer = WireWriter::new(true);
        assert!(writer.put_name(&long).is_err());
    }
}
