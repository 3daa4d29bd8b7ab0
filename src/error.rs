use thiserror::Error;

use crate::config::ConfigError;
use crate::transport;
use crate::wire;
use crate::wire::ReturnCode;

/// The runtime's top-level error type. Per-packet decode failures
/// ([`wire::Error`]) never reach here — they are logged and counted at the
/// dispatcher. Everything here is either a per-call failure surfaced to a
/// specific caller or a per-node failure that aborts construction/`start`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] transport::Error),

    #[error(transparent)]
    Wire(#[from] wire::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No remote-service entry and no explicit target; the call cannot be sent.
    #[error("no reachable endpoint for service {service_id:#x}/{major_version}")]
    NotReachable { service_id: u16, major_version: u8 },

    /// The pending-request deadline elapsed before a response arrived.
    #[error("request to service {service_id:#x} method {method_id:#x} timed out")]
    Timeout { service_id: u16, method_id: u16 },

    /// The peer replied with message_type=ERROR instead of RESPONSE.
    #[error("request to service {service_id:#x} method {method_id:#x} failed with return code {return_code:?}")]
    RequestFailed {
        service_id: u16,
        method_id: u16,
        return_code: ReturnCode,
    },

    /// The runtime was stopped while a caller was waiting.
    #[error("waiter cancelled: runtime is shutting down")]
    Cancelled,

    /// A request arrived for a service this node does not offer.
    #[error("no handler registered for service {0:#x}")]
    UnknownService(u16),

    /// A request arrived for a method the handler did not recognise.
    #[error("service {service_id:#x} has no method {method_id:#x}")]
    UnknownMethod { service_id: u16, method_id: u16 },

    /// The remote replied to a subscription with TTL=0.
    #[error("subscription to eventgroup {eventgroup_id:#x} of service {service_id:#x} was rejected")]
    SubscriptionRejected { service_id: u16, eventgroup_id: u16 },

    /// A façade call named a `providing`/`required` alias, or an instance,
    /// that does not exist in the loaded configuration.
    #[error("{0:?} is not a configured alias")]
    UnknownAlias(String),
}
