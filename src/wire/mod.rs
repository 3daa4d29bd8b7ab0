//! The SOME/IP wire codec (C1): the fixed 16-byte message header, the TP
//! sub-header, and Service Discovery entries/options.
//!
//! Every type here is a plain encode/decode pair with no I/O and no state;
//! callers above this module own sockets and buffers.

mod error;
mod header;
mod message_type;
mod return_code;
pub mod sd;
mod tp;

pub use error::Error;
pub use header::{Header, RawMessage, HEADER_SIZE, PROTOCOL_VERSION, SD_METHOD_ID, SD_SERVICE_ID};
pub use message_type::{MessageKind, MessageType, TP_FLAG};
pub use return_code::ReturnCode;
pub use tp::{TpHeader, TP_HEADER_SIZE};
