use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::wire::message_type::MessageType;
use crate::wire::return_code::ReturnCode;
use crate::wire::Error;

pub const HEADER_SIZE: usize = 16;
pub const PROTOCOL_VERSION: u8 = 0x01;

pub const SD_SERVICE_ID: u16 = 0xffff;
pub const SD_METHOD_ID: u16 = 0x8100;

/// The fixed 16-byte SOME/IP message header (PRS_SOMEIPProtocol §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub service_id: u16,
    pub method_id: u16,
    /// Byte count from `client_id` onward, i.e. `8 + payload_size`.
    pub length: u32,
    pub client_id: u16,
    pub session_id: u16,
    pub interface_version: u8,
    pub message_type: MessageType,
    pub return_code: ReturnCode,
}

impl Header {
    pub fn payload_size(&self) -> usize {
        self.length.saturating_sub(8) as usize
    }

    pub fn is_sd(&self) -> bool {
        self.service_id == SD_SERVICE_ID && self.method_id == SD_METHOD_ID
    }

    pub fn set_length_for_payload(&mut self, payload_len: usize) {
        self.length = 8 + payload_len as u32;
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.write_u16::<BigEndian>(self.service_id).unwrap();
        out.write_u16::<BigEndian>(self.method_id).unwrap();
        out.write_u32::<BigEndian>(self.length).unwrap();
        out.write_u16::<BigEndian>(self.client_id).unwrap();
        out.write_u16::<BigEndian>(self.session_id).unwrap();
        out.write_u8(PROTOCOL_VERSION).unwrap();
        out.write_u8(self.interface_version).unwrap();
        out.write_u8(self.message_type.to_wire()).unwrap();
        out.write_u8(self.return_code.to_wire()).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader);
        }
        let mut cursor = Cursor::new(buf);
        let service_id = cursor.read_u16::<BigEndian>()?;
        let method_id = cursor.read_u16::<BigEndian>()?;
        let length = cursor.read_u32::<BigEndian>()?;
        let client_id = cursor.read_u16::<BigEndian>()?;
        let session_id = cursor.read_u16::<BigEndian>()?;
        let protocol_version = cursor.read_u8()?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(Error::InvalidProtocolVersion(protocol_version));
        }
        let interface_version = cursor.read_u8()?;
        let message_type = MessageType::from_wire(cursor.read_u8()?)?;
        let return_code = ReturnCode::from_wire(cursor.read_u8()?)?;

        Ok(Self {
            service_id,
            method_id,
            length,
            client_id,
            session_id,
            interface_version,
            message_type,
            return_code,
        })
    }
}

/// A full message: header plus raw payload bytes. Components above the wire
/// codec interpret the payload (SD body, TP sub-header + segment, user bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(mut header: Header, payload: Vec<u8>) -> Self {
        header.set_length_for_payload(payload.len());
        Self { header, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.encode(&mut out);
        out.write_all(&self.payload).unwrap();
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let header = Header::decode(buf)?;
        let available_payload = buf.len() - HEADER_SIZE;
        let declared_payload = header.payload_size();
        if declared_payload > available_payload {
            return Err(Error::MalformedLength {
                declared: header.length,
                available: buf.len(),
            });
        }
        let mut payload = vec![0u8; declared_payload];
        (&buf[HEADER_SIZE..]).read_exact(&mut payload)?;
        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::message_type::{MessageKind, MessageType};

    fn sample_header() -> Header {
        Header {
            service_id: 0x1001,
            method_id: 0x0001,
            length: 16,
            client_id: 0x0000,
            session_id: 1,
            interface_version: 0x01,
            message_type: MessageType::new(MessageKind::Request, false),
            return_code: ReturnCode::Ok,
        }
    }

    #[test]
    fn decodes_the_specification_fixture() {
        let bytes: Vec<u8> = vec![
            0x10, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x03,
        ];
        let msg = RawMessage::decode(&bytes).unwrap();
        assert_eq!(msg.header.service_id, 0x1001);
        assert_eq!(msg.header.method_id, 0x0001);
        assert_eq!(msg.header.length, 16);
        assert_eq!(msg.header.session_id, 1);
        assert_eq!(msg.header.message_type.kind(), MessageKind::Request);
        assert_eq!(msg.header.return_code, ReturnCode::Ok);
        assert_eq!(msg.payload, vec![0, 0, 0, 5, 0, 0, 0, 3]);
    }

    #[test]
    fn encode_decode_round_trips_header_fields() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let decoded = Header::decode(&buf).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_truncated_buffers() {
        assert!(matches!(Header::decode(&[0u8; 15]), Err(Error::MalformedHeader)));
    }

    #[test]
    fn header_decodes_from_a_bare_16_bytes_even_when_it_declares_a_payload() {
        let mut header = sample_header();
        header.length = 8 + 6000;
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        let decoded = Header::decode(&buf).unwrap();
        assert_eq!(decoded.payload_size(), 6000);
    }

    #[test]
    fn rejects_length_claiming_more_than_is_available() {
        let mut buf = Vec::new();
        sample_header().encode(&mut buf);
        buf[4..8].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            RawMessage::decode(&buf),
            Err(Error::MalformedLength { .. })
        ));
    }

    #[test]
    fn length_reflects_header_minus_8_plus_payload() {
        let msg = RawMessage::new(sample_header(), vec![1, 2, 3, 4]);
        assert_eq!(msg.header.length, 8 + 4);
    }
}
