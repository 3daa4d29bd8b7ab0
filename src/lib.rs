//! # someip-runtime
//!
//! SOME/IP (Scalable service-Oriented Middleware over IP) is an
//! automotive/embedded communication protocol supporting remote procedure
//! calls, event notifications, and the Service Discovery sub-protocol that
//! finds and tracks both over a changing network.
//!
//! This crate is a node runtime: it owns the wire codec, the UDP/TCP
//! transport, the Service Discovery engine, SOME/IP-TP segmentation, and
//! request/response correlation, and exposes [`Runtime`] as the single
//! façade an application drives — offering services, subscribing to
//! eventgroups, and sending requests — without touching any of that
//! machinery directly.
//!
//! This crate targets the R22-11 release of the SOME/IP specification,
//! part of the AUTOSAR standard. It is not affiliated with AUTOSAR.
//!
//! ## Layout
//!
//! - [`wire`] — the 16-byte message header, TP sub-header, and SD
//!   entries/options: pure encode/decode, no I/O.
//! - [`transport`] — resolves interface names to indices, binds every
//!   configured endpoint, and owns the resulting sockets.
//! - [`session`] — per-(service, method) session id allocation.
//! - [`tp`] — splits oversized payloads into SOME/IP-TP segments and
//!   reassembles them on the way back in.
//! - [`correlator`] — suspends a caller on a session key until its
//!   RESPONSE/ERROR arrives or its deadline elapses.
//! - [`sd`] — the Service Discovery engine: offering, finding,
//!   subscribing, and the remote-service/subscription tables it maintains.
//! - [`dispatcher`] — the event loop that reads every bound socket and
//!   routes decoded messages to the pieces above.
//! - [`config`] — the on-disk description of interfaces and instances.
//! - [`runtime`] — [`Runtime`], the public façade.
//!
//! ## References
//!
//! - [SOME/IP Specification R23-11](https://www.autosar.org/fileadmin/standards/R23-11/FO/AUTOSAR_FO_PRS_SOMEIPProtocol.pdf)
//! - [SOME/IP-SD Specification R23-11](https://www.autosar.org/fileadmin/standards/R23-11/FO/AUTOSAR_FO_PRS_SOMEIPServiceDiscoveryProtocol.pdf)

pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod runtime;
pub mod sd;
pub mod session;
pub mod tp;
pub mod transport;
pub mod wire;

pub use config::Config;
pub use error::Error;
pub use runtime::Runtime;

use std::net::Ipv4Addr;

/// Default SOME/IP-SD multicast group (PRS_SOMEIPServiceDiscoveryProtocol §4.1).
pub const SD_MULTICAST_IP: Ipv4Addr = Ipv4Addr::new(224, 224, 224, 245);
/// Default SOME/IP-SD multicast port.
pub const SD_MULTICAST_PORT: u16 = 30490;
