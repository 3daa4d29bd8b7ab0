use crate::wire::Error;

/// Bit set in the wire value of a message type when the payload carries a
/// SOME/IP-TP sub-header and a segment rather than a whole payload.
pub const TP_FLAG: u8 = 0x20;

/// The SOME/IP message type, independent of whether it is TP-segmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    RequestNoReturn,
    Notification,
    Response,
    Error,
}

impl MessageKind {
    fn base_value(self) -> u8 {
        match self {
            MessageKind::Request => 0x00,
            MessageKind::RequestNoReturn => 0x01,
            MessageKind::Notification => 0x02,
            MessageKind::Response => 0x80,
            MessageKind::Error => 0x81,
        }
    }
}

/// The full wire byte: a [`MessageKind`] plus the TP flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType {
    kind: MessageKind,
    tp: bool,
}

impl MessageType {
    pub fn new(kind: MessageKind, tp: bool) -> Self {
        Self { kind, tp }
    }

    pub fn kind(self) -> MessageKind {
        self.kind
    }

    pub fn is_tp(self) -> bool {
        self.tp
    }

    pub fn is_request(self) -> bool {
        matches!(self.kind, MessageKind::Request | MessageKind::RequestNoReturn)
    }

    pub fn is_reply(self) -> bool {
        matches!(self.kind, MessageKind::Response | MessageKind::Error)
    }

    pub fn to_wire(self) -> u8 {
        self.kind.base_value() | if self.tp { TP_FLAG } else { 0 }
    }

    pub fn from_wire(value: u8) -> Result<Self, Error> {
        let tp = value & TP_FLAG != 0;
        let base = value & !TP_FLAG;
        let kind = match base {
            0x00 => MessageKind::Request,
            0x01 => MessageKind::RequestNoReturn,
            0x02 => MessageKind::Notification,
            0x80 => MessageKind::Response,
            0x81 => MessageKind::Error,
            _ => return Err(Error::InvalidMessageType(value)),
        };
        Ok(Self { kind, tp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_valid_byte() {
        let valid = [0x00, 0x01, 0x02, 0x80, 0x81, 0x20, 0x21, 0x22, 0xA0, 0xA1];
        for byte in valid {
            let mt = MessageType::from_wire(byte).expect("valid byte");
            assert_eq!(mt.to_wire(), byte);
        }
    }

    #[test]
    fn rejects_unknown_base_values() {
        for byte in 0u16..=255 {
            let byte = byte as u8;
            let base = byte & !TP_FLAG;
            let expect_ok = matches!(base, 0x00 | 0x01 | 0x02 | 0x80 | 0x81);
            assert_eq!(MessageType::from_wire(byte).is_ok(), expect_ok, "byte {byte:#x}");
        }
    }

    #[test]
    fn tp_variant_sets_flag_without_changing_kind() {
        let mt = MessageType::from_wire(0xA0).unwrap();
        assert_eq!(mt.kind(), MessageKind::Response);
        assert!(mt.is_tp());
    }
}
