use thiserror::Error;

/// Decode/encode failures confined to a single message. Per §7 these never
/// propagate past the dispatcher: the offending datagram is dropped and
/// counted, not surfaced to a caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("fewer than 16 bytes available for a SOME/IP header")]
    MalformedHeader,

    #[error("header length field {declared} requires more bytes than are available ({available})")]
    MalformedLength { declared: u32, available: usize },

    #[error("malformed TP sub-header or segment")]
    MalformedTp,

    #[error("SD option length {length} does not match option type {option_type:#x}")]
    UnknownOption { option_type: u8, length: u16 },

    #[error("unsupported protocol_version {0:#x}, only 0x01 is accepted")]
    InvalidProtocolVersion(u8),

    #[error("unrecognised message type byte {0:#x}")]
    InvalidMessageType(u8),

    #[error("unrecognised return code byte {0:#x}")]
    InvalidReturnCode(u8),

    #[error("unrecognised SD entry type byte {0:#x}")]
    InvalidEntryType(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
