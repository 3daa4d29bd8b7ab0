use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::wire::Error;

pub const TP_HEADER_SIZE: usize = 4;

/// The 4-byte SOME/IP-TP sub-header: a 28-bit offset (in 16-byte units), 3
/// reserved bits, and a low "more segments" bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpHeader {
    pub offset: u32,
    pub more_segments: bool,
}

impl TpHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let offset_unit = self.offset / 16;
        let word = (offset_unit << 4) | u32::from(self.more_segments);
        out.write_u32::<BigEndian>(word).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < TP_HEADER_SIZE {
            return Err(Error::MalformedTp);
        }
        let word = (&buf[..TP_HEADER_SIZE]).read_u32::<BigEndian>()?;
        let offset_unit = word >> 4;
        let more_segments = word & 0x1 == 1;
        Ok(Self {
            offset: offset_unit * 16,
            more_segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_offset_and_flag() {
        for (offset, more) in [(0u32, true), (16, false), (1392, true), (5000 - 16, false)] {
            let header = TpHeader {
                offset,
                more_segments: more,
            };
            let mut buf = Vec::new();
            header.encode(&mut buf);
            assert_eq!(TpHeader::decode(&buf).unwrap(), header);
        }
    }

    #[test]
    fn more_segments_occupies_the_low_bit() {
        let header = TpHeader {
            offset: 0,
            more_segments: true,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf, vec![0x00, 0x00, 0x00, 0x01]);
    }
}
