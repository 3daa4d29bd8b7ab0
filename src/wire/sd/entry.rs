use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::wire::Error;

pub const ENTRY_SIZE: usize = 16;

const TYPE_FIND_SERVICE: u8 = 0x00;
const TYPE_OFFER_SERVICE: u8 = 0x01;
const TYPE_SUBSCRIBE_EVENTGROUP: u8 = 0x06;
const TYPE_SUBSCRIBE_EVENTGROUP_ACK: u8 = 0x07;

/// A run of options in the shared options array that an entry refers to,
/// addressed by `index` with `count` entries (0 means "no option run").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionRun {
    pub index: u8,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEntry {
    pub first_run: OptionRun,
    pub second_run: OptionRun,
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
    pub ttl: u32,
    pub minor_version: u32,
}

impl ServiceEntry {
    /// Is this entry, interpreted as an Offer, a Stop-Offer / as a Subscribe,
    /// an unsubscribe?
    pub fn is_stop(&self) -> bool {
        self.ttl == 0
    }

    pub fn find_wildcard(service_id: u16) -> Self {
        Self {
            first_run: OptionRun::default(),
            second_run: OptionRun::default(),
            service_id,
            instance_id: 0xffff,
            major_version: 0xff,
            ttl: 0x00ff_ffff,
            minor_version: 0xffff_ffff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventgroupEntry {
    pub first_run: OptionRun,
    pub second_run: OptionRun,
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
    pub ttl: u32,
    pub eventgroup_id: u16,
}

impl EventgroupEntry {
    pub fn is_stop(&self) -> bool {
        self.ttl == 0
    }
}

/// An SD entry. Variants are flat (not a separate type tag + payload struct)
/// so callers match directly on the operation the entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    FindService(ServiceEntry),
    OfferService(ServiceEntry),
    SubscribeEventgroup(EventgroupEntry),
    SubscribeEventgroupAck(EventgroupEntry),
}

impl Entry {
    pub fn option_runs(&self) -> (OptionRun, OptionRun) {
        match self {
            Entry::FindService(e) | Entry::OfferService(e) => (e.first_run, e.second_run),
            Entry::SubscribeEventgroup(e) | Entry::SubscribeEventgroupAck(e) => {
                (e.first_run, e.second_run)
            }
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let (type_byte, first_run, second_run, service_id, instance_id, major_version, ttl, low_word) =
            match self {
                Entry::FindService(e) => (
                    TYPE_FIND_SERVICE,
                    e.first_run,
                    e.second_run,
                    e.service_id,
                    e.instance_id,
                    e.major_version,
                    e.ttl,
                    e.minor_version,
                ),
                Entry::OfferService(e) => (
                    TYPE_OFFER_SERVICE,
                    e.first_run,
                    e.second_run,
                    e.service_id,
                    e.instance_id,
                    e.major_version,
                    e.ttl,
                    e.minor_version,
                ),
                Entry::SubscribeEventgroup(e) => (
                    TYPE_SUBSCRIBE_EVENTGROUP,
                    e.first_run,
                    e.second_run,
                    e.service_id,
                    e.instance_id,
                    e.major_version,
                    e.ttl,
                    u32::from(e.eventgroup_id),
                ),
                Entry::SubscribeEventgroupAck(e) => (
                    TYPE_SUBSCRIBE_EVENTGROUP_ACK,
                    e.first_run,
                    e.second_run,
                    e.service_id,
                    e.instance_id,
                    e.major_version,
                    e.ttl,
                    u32::from(e.eventgroup_id),
                ),
            };

        out.write_u8(type_byte).unwrap();
        out.write_u8(first_run.index).unwrap();
        out.write_u8(second_run.index).unwrap();
        out.write_u8((first_run.count << 4) | (second_run.count & 0x0f)).unwrap();
        out.write_u16::<BigEndian>(service_id).unwrap();
        out.write_u16::<BigEndian>(instance_id).unwrap();
        let major_ttl = (u32::from(major_version) << 24) | (ttl & 0x00ff_ffff);
        out.write_u32::<BigEndian>(major_ttl).unwrap();
        out.write_u32::<BigEndian>(low_word).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < ENTRY_SIZE {
            return Err(Error::MalformedTp);
        }
        let mut cursor = Cursor::new(buf);
        let type_byte = cursor.read_u8()?;
        let index_first = cursor.read_u8()?;
        let index_second = cursor.read_u8()?;
        let counts = cursor.read_u8()?;
        let first_run = OptionRun {
            index: index_first,
            count: (counts >> 4) & 0x0f,
        };
        let second_run = OptionRun {
            index: index_second,
            count: counts & 0x0f,
        };
        let service_id = cursor.read_u16::<BigEndian>()?;
        let instance_id = cursor.read_u16::<BigEndian>()?;
        let major_ttl = cursor.read_u32::<BigEndian>()?;
        let major_version = (major_ttl >> 24) as u8;
        let ttl = major_ttl & 0x00ff_ffff;
        let low_word = cursor.read_u32::<BigEndian>()?;

        match type_byte {
            TYPE_FIND_SERVICE | TYPE_OFFER_SERVICE => {
                let entry = ServiceEntry {
                    first_run,
                    second_run,
                    service_id,
                    instance_id,
                    major_version,
                    ttl,
                    minor_version: low_word,
                };
                Ok(if type_byte == TYPE_FIND_SERVICE {
                    Entry::FindService(entry)
                } else {
                    Entry::OfferService(entry)
                })
            }
            TYPE_SUBSCRIBE_EVENTGROUP | TYPE_SUBSCRIBE_EVENTGROUP_ACK => {
                let entry = EventgroupEntry {
                    first_run,
                    second_run,
                    service_id,
                    instance_id,
                    major_version,
                    ttl,
                    eventgroup_id: low_word as u16,
                };
                Ok(if type_byte == TYPE_SUBSCRIBE_EVENTGROUP {
                    Entry::SubscribeEventgroup(entry)
                } else {
                    Entry::SubscribeEventgroupAck(entry)
                })
            }
            other => Err(Error::InvalidEntryType(other)),
        }
    }
}
