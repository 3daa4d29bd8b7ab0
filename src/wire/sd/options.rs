use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::wire::Error;

const TYPE_IPV4_ENDPOINT: u8 = 0x04;
const TYPE_IPV6_ENDPOINT: u8 = 0x06;
const TYPE_IPV4_MULTICAST: u8 = 0x14;
const TYPE_IPV6_MULTICAST: u8 = 0x16;

const IPV4_BODY_LEN: u16 = 10; // type + reserved + addr(4) + reserved + protocol + port(2)
const IPV6_BODY_LEN: u16 = 22; // type + reserved + addr(16) + reserved + protocol + port(2)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    fn to_wire(self) -> u8 {
        match self {
            TransportProtocol::Udp => 0x11,
            TransportProtocol::Tcp => 0x06,
        }
    }

    fn from_wire(value: u8) -> Result<Self, Error> {
        match value {
            0x11 => Ok(TransportProtocol::Udp),
            0x06 => Ok(TransportProtocol::Tcp),
            other => Err(Error::UnknownOption {
                option_type: other,
                length: 0,
            }),
        }
    }
}

/// An SD endpoint option. Unicast and multicast variants share a layout;
/// only the type byte distinguishes them. Unrecognised option types decode
/// to `Unknown` and are skipped by callers rather than rejected, per §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdOption {
    Ipv4Endpoint {
        addr: Ipv4Addr,
        protocol: TransportProtocol,
        port: u16,
    },
    Ipv6Endpoint {
        addr: Ipv6Addr,
        protocol: TransportProtocol,
        port: u16,
    },
    Ipv4Multicast {
        addr: Ipv4Addr,
        protocol: TransportProtocol,
        port: u16,
    },
    Ipv6Multicast {
        addr: Ipv6Addr,
        protocol: TransportProtocol,
        port: u16,
    },
    Unknown { option_type: u8, body: Vec<u8> },
}

impl SdOption {
    /// Length field value: number of body bytes including the type byte
    /// itself, per the reconciliation of §4.1/§8/§9 recorded in DESIGN.md.
    fn body_len(&self) -> u16 {
        match self {
            SdOption::Ipv4Endpoint { .. } | SdOption::Ipv4Multicast { .. } => IPV4_BODY_LEN,
            SdOption::Ipv6Endpoint { .. } | SdOption::Ipv6Multicast { .. } => IPV6_BODY_LEN,
            SdOption::Unknown { body, .. } => 1 + body.len() as u16,
        }
    }

    /// Total bytes this option occupies on the wire, length field included.
    pub fn wire_size(&self) -> usize {
        2 + self.body_len() as usize
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.write_u16::<BigEndian>(self.body_len()).unwrap();
        match self {
            SdOption::Ipv4Endpoint { addr, protocol, port }
            | SdOption::Ipv4Multicast { addr, protocol, port } => {
                let type_byte = if matches!(self, SdOption::Ipv4Multicast { .. }) {
                    TYPE_IPV4_MULTICAST
                } else {
                    TYPE_IPV4_ENDPOINT
                };
                out.write_u8(type_byte).unwrap();
                out.write_u8(0).unwrap(); // reserved
                out.write_all(&addr.octets()).unwrap();
                out.write_u8(0).unwrap(); // reserved
                out.write_u8(protocol.to_wire()).unwrap();
                out.write_u16::<BigEndian>(*port).unwrap();
            }
            SdOption::Ipv6Endpoint { addr, protocol, port }
            | SdOption::Ipv6Multicast { addr, protocol, port } => {
                let type_byte = if matches!(self, SdOption::Ipv6Multicast { .. }) {
                    TYPE_IPV6_MULTICAST
                } else {
                    TYPE_IPV6_ENDPOINT
                };
                out.write_u8(type_byte).unwrap();
                out.write_u8(0).unwrap();
                out.write_all(&addr.octets()).unwrap();
                out.write_u8(0).unwrap();
                out.write_u8(protocol.to_wire()).unwrap();
                out.write_u16::<BigEndian>(*port).unwrap();
            }
            SdOption::Unknown { option_type, body } => {
                out.write_u8(*option_type).unwrap();
                out.write_all(body).unwrap();
            }
        }
    }

    /// Decodes a single option starting at `buf[0]` (the length field).
    /// Returns the option and the number of bytes consumed (`2 + length`).
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Error> {
        if buf.len() < 3 {
            return Err(Error::MalformedTp);
        }
        let mut cursor = Cursor::new(buf);
        let length = cursor.read_u16::<BigEndian>()?;
        let consumed = 2 + length as usize;
        if buf.len() < consumed {
            return Err(Error::MalformedTp);
        }
        let option_type = cursor.read_u8()?;
        let body = &buf[3..consumed];

        let option = match option_type {
            TYPE_IPV4_ENDPOINT | TYPE_IPV4_MULTICAST => {
                if length != IPV4_BODY_LEN || body.len() != 9 {
                    return Err(Error::UnknownOption { option_type, length });
                }
                let addr = Ipv4Addr::new(body[1], body[2], body[3], body[4]);
                let protocol = TransportProtocol::from_wire(body[6])?;
                let port = u16::from_be_bytes([body[body.len() - 2], body[body.len() - 1]]);
                if option_type == TYPE_IPV4_MULTICAST {
                    SdOption::Ipv4Multicast { addr, protocol, port }
                } else {
                    SdOption::Ipv4Endpoint { addr, protocol, port }
                }
            }
            TYPE_IPV6_ENDPOINT | TYPE_IPV6_MULTICAST => {
                if length != IPV6_BODY_LEN || body.len() != 21 {
                    return Err(Error::UnknownOption { option_type, length });
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&body[1..17]);
                let addr = Ipv6Addr::from(octets);
                let protocol = TransportProtocol::from_wire(body[18])?;
                let port = u16::from_be_bytes([body[body.len() - 2], body[body.len() - 1]]);
                if option_type == TYPE_IPV6_MULTICAST {
                    SdOption::Ipv6Multicast { addr, protocol, port }
                } else {
                    SdOption::Ipv6Endpoint { addr, protocol, port }
                }
            }
            other => SdOption::Unknown {
                option_type: other,
                body: body.to_vec(),
            },
        };
        Ok((option, consumed))
    }
}

use std::io::Write;

/// Parses the entire options array (already stripped of its own 4-byte
/// length prefix) into the single shared table entries reference by index.
pub fn decode_all(mut buf: &[u8]) -> Result<Vec<SdOption>, Error> {
    let mut options = Vec::new();
    while !buf.is_empty() {
        let (option, consumed) = SdOption::decode(buf)?;
        options.push(option);
        buf = &buf[consumed..];
    }
    Ok(options)
}

pub fn encode_all(options: &[SdOption]) -> Vec<u8> {
    let mut out = Vec::new();
    for option in options {
        option.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_endpoint_round_trips_with_spec_fixture_length() {
        let option = SdOption::Ipv4Endpoint {
            addr: Ipv4Addr::new(192, 168, 1, 10),
            protocol: TransportProtocol::Udp,
            port: 30509,
        };
        let mut buf = Vec::new();
        option.encode(&mut buf);
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 10);
        assert_eq!(option.wire_size(), 12);
        let (decoded, consumed) = SdOption::decode(&buf).unwrap();
        assert_eq!(decoded, option);
        assert_eq!(consumed, 12);
    }

    #[test]
    fn ipv6_endpoint_round_trips_with_spec_fixture_length() {
        let option = SdOption::Ipv6Endpoint {
            addr: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            protocol: TransportProtocol::Tcp,
            port: 30501,
        };
        let mut buf = Vec::new();
        option.encode(&mut buf);
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 22);
        assert_eq!(option.wire_size(), 24);
        let (decoded, consumed) = SdOption::decode(&buf).unwrap();
        assert_eq!(decoded, option);
        assert_eq!(consumed, 24);
    }

    #[test]
    fn multicast_variants_round_trip() {
        let option = SdOption::Ipv4Multicast {
            addr: Ipv4Addr::new(224, 224, 224, 245),
            protocol: TransportProtocol::Udp,
            port: 30490,
        };
        let mut buf = Vec::new();
        option.encode(&mut buf);
        let (decoded, _) = SdOption::decode(&buf).unwrap();
        assert_eq!(decoded, option);
    }

    #[test]
    fn decode_all_advances_uniformly_by_two_plus_length() {
        let a = SdOption::Ipv4Endpoint {
            addr: Ipv4Addr::new(10, 0, 0, 1),
            protocol: TransportProtocol::Udp,
            port: 1,
        };
        let b = SdOption::Ipv6Endpoint {
            addr: Ipv6Addr::LOCALHOST,
            protocol: TransportProtocol::Tcp,
            port: 2,
        };
        let buf = encode_all(&[a.clone(), b.clone()]);
        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn unknown_option_types_are_skipped_not_rejected() {
        let buf = [0x00, 0x03, 0x99, 0xaa, 0xbb, 0xcc];
        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], SdOption::Unknown { option_type: 0x99, .. }));
    }
}
