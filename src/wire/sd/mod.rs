//! Service Discovery entry/option codecs (§4.1) and SD packet framing.

mod entry;
mod options;

pub use entry::{Entry, EventgroupEntry, OptionRun, ServiceEntry, ENTRY_SIZE};
pub use options::{decode_all, encode_all, SdOption, TransportProtocol};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::wire::Error;

const REBOOT_BIT: u8 = 0x80;
const UNICAST_BIT: u8 = 0x40;

/// The 1-byte SD flags field (§3/§4.1): bit 7 is "reboot detected", bit 6 is
/// "unicast supported". The remaining bits are reserved and always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub reboot: bool,
    pub unicast_supported: bool,
}

impl Flags {
    pub fn new(reboot: bool, unicast_supported: bool) -> Self {
        Self {
            reboot,
            unicast_supported,
        }
    }

    fn to_wire(self) -> u8 {
        (if self.reboot { REBOOT_BIT } else { 0 }) | (if self.unicast_supported { UNICAST_BIT } else { 0 })
    }

    fn from_wire(value: u8) -> Self {
        Self {
            reboot: value & REBOOT_BIT != 0,
            unicast_supported: value & UNICAST_BIT != 0,
        }
    }
}

/// The SD payload carried inside a SOME/IP message with
/// `service_id=0xFFFF, method_id=0x8100, message_type=NOTIFICATION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdPacket {
    pub flags: Flags,
    pub entries: Vec<Entry>,
    pub options: Vec<SdOption>,
}

impl SdPacket {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.write_u8(self.flags.to_wire()).unwrap();
        out.write_all(&[0u8; 3]).unwrap();

        let mut entries_buf = Vec::with_capacity(self.entries.len() * ENTRY_SIZE);
        for entry in &self.entries {
            entry.encode(&mut entries_buf);
        }
        out.write_u32::<BigEndian>(entries_buf.len() as u32).unwrap();
        out.write_all(&entries_buf).unwrap();

        let options_buf = encode_all(&self.options);
        out.write_u32::<BigEndian>(options_buf.len() as u32).unwrap();
        out.write_all(&options_buf).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 8 {
            return Err(Error::MalformedHeader);
        }
        let mut cursor = Cursor::new(buf);
        let flags = Flags::from_wire(cursor.read_u8()?);
        cursor.set_position(cursor.position() + 3);

        let entries_len = cursor.read_u32::<BigEndian>()? as usize;
        let entries_start = cursor.position() as usize;
        let entries_end = entries_start
            .checked_add(entries_len)
            .filter(|&end| end <= buf.len())
            .ok_or(Error::MalformedLength {
                declared: entries_len as u32,
                available: buf.len(),
            })?;
        let mut entries = Vec::new();
        let mut offset = entries_start;
        while offset < entries_end {
            let entry = Entry::decode(&buf[offset..entries_end])?;
            entries.push(entry);
            offset += ENTRY_SIZE;
        }

        cursor.set_position(entries_end as u64);
        let options_len = cursor.read_u32::<BigEndian>()? as usize;
        let options_start = cursor.position() as usize;
        let options_end = options_start
            .checked_add(options_len)
            .filter(|&end| end <= buf.len())
            .ok_or(Error::MalformedLength {
                declared: options_len as u32,
                available: buf.len(),
            })?;
        let options = decode_all(&buf[options_start..options_end])?;

        Ok(Self {
            flags,
            entries,
            options,
        })
    }

    /// The options referenced by `run`, in order, skipping out-of-range indices.
    pub fn resolve(&self, run: OptionRun) -> Vec<&SdOption> {
        if run.count == 0 {
            return Vec::new();
        }
        let start = run.index as usize;
        let end = start + run.count as usize;
        self.options
            .get(start..end.min(self.options.len()))
            .map(|slice| slice.iter().collect())
            .unwrap_or_default()
    }
}

use std::io::Write;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_offer() -> SdPacket {
        SdPacket {
            flags: Flags::new(true, true),
            entries: vec![Entry::OfferService(ServiceEntry {
                first_run: OptionRun { index: 0, count: 1 },
                second_run: OptionRun::default(),
                service_id: 0x1234,
                instance_id: 1,
                major_version: 1,
                ttl: 3,
                minor_version: 0,
            })],
            options: vec![SdOption::Ipv4Endpoint {
                addr: Ipv4Addr::new(192, 168, 1, 1),
                protocol: TransportProtocol::Udp,
                port: 30509,
            }],
        }
    }

    #[test]
    fn round_trips_an_offer_packet() {
        let packet = sample_offer();
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        assert_eq!(SdPacket::decode(&buf).unwrap(), packet);
    }

    #[test]
    fn resolve_returns_the_referenced_option_run() {
        let packet = sample_offer();
        let Entry::OfferService(entry) = &packet.entries[0] else {
            unreachable!()
        };
        let (first, second) = (entry.first_run, entry.second_run);
        assert_eq!(packet.resolve(first).len(), 1);
        assert_eq!(packet.resolve(second).len(), 0);
    }

    #[test]
    fn empty_entries_and_options_round_trip() {
        let packet = SdPacket {
            flags: Flags::default(),
            entries: vec![],
            options: vec![],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        assert_eq!(SdPacket::decode(&buf).unwrap(), packet);
    }
}
