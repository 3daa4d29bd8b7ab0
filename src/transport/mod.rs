//! Endpoint registry (C2): binds every endpoint named in the configuration
//! to a real socket and exposes the bound identity (ip, kernel-assigned
//! port) that must be used in every outbound Offer and log line.
//!
//! IPv4 and IPv6 sockets are always created separately — this runtime never
//! binds a dual-stack socket — mirroring the per-family socket setup the
//! teacher's `client::socket_manager` and `server::mod` both use for their
//! (IPv4-only) SD and unicast sockets, generalized here to both families.

mod iface;

pub use iface::resolve_interface;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};

use crate::config::{Config, IpVersion, Protocol};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {alias:?} on interface {interface:?} to {addr}: {source}")]
    BindFailed {
        interface: String,
        alias: String,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("interface {0:?} does not resolve to a local interface index")]
    InterfaceUnknown(String),

    #[error("failed to join multicast group {group} on interface {interface:?}: {source}")]
    JoinFailed {
        interface: String,
        group: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Key under which a bound endpoint is looked up: the interface it was
/// declared on, plus its alias within that interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub interface: String,
    pub alias: String,
}

impl EndpointKey {
    pub fn new(interface: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            alias: alias.into(),
        }
    }
}

/// The live socket behind a bound endpoint.
#[derive(Debug, Clone)]
pub enum BoundSocket {
    Udp(Arc<UdpSocket>),
    Tcp(Arc<TcpListener>),
}

/// A configured endpoint after binding: the kernel-assigned address (never
/// port 0) and the socket handle backing it.
#[derive(Debug, Clone)]
pub struct BoundEndpoint {
    pub bound_addr: SocketAddr,
    pub protocol: Protocol,
    pub socket: BoundSocket,
}

impl BoundEndpoint {
    pub fn as_udp(&self) -> Option<&Arc<UdpSocket>> {
        match &self.socket {
            BoundSocket::Udp(socket) => Some(socket),
            BoundSocket::Tcp(_) => None,
        }
    }

    pub fn as_tcp_listener(&self) -> Option<&Arc<TcpListener>> {
        match &self.socket {
            BoundSocket::Tcp(listener) => Some(listener),
            BoundSocket::Udp(_) => None,
        }
    }
}

/// Owns every bound socket for this node and the name -> bound-identity map.
pub struct EndpointRegistry {
    endpoints: HashMap<EndpointKey, BoundEndpoint>,
}

impl EndpointRegistry {
    /// Binds every endpoint declared across every configured interface.
    /// SD endpoints additionally join their interface's multicast group with
    /// the given hop limit.
    pub async fn bind_all(config: &Config, multicast_hops: u32) -> Result<Self, Error> {
        let mut endpoints = HashMap::new();

        for (iface_name, iface) in &config.interfaces {
            let sd_aliases: Vec<&str> = [iface.sd.ipv4.as_deref(), iface.sd.ipv6.as_deref()]
                .into_iter()
                .flatten()
                .collect();

            for (alias, endpoint_cfg) in &iface.endpoints {
                let ip: IpAddr = endpoint_cfg.ip.parse().map_err(|_| {
                    Error::BindFailed {
                        interface: iface_name.clone(),
                        alias: alias.clone(),
                        addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), endpoint_cfg.port),
                        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "unparseable IP address"),
                    }
                })?;

                let is_sd = sd_aliases.contains(&alias.as_str());
                let bound = match endpoint_cfg.protocol {
                    Protocol::Udp => {
                        bind_udp(iface_name, alias, ip, endpoint_cfg.port, is_sd, multicast_hops).await?
                    }
                    Protocol::Tcp => bind_tcp(iface_name, alias, ip, endpoint_cfg.port).await?,
                };

                debug_assert_eq!(
                    matches!(endpoint_cfg.version, IpVersion::V4),
                    ip.is_ipv4(),
                    "configured IP family must match the declared version"
                );

                info!(
                    interface = %iface_name,
                    alias = %alias,
                    bound = %bound.bound_addr,
                    "bound endpoint"
                );
                endpoints.insert(EndpointKey::new(iface_name.clone(), alias.clone()), bound);
            }
        }

        Ok(Self { endpoints })
    }

    pub fn get(&self, interface: &str, alias: &str) -> Option<&BoundEndpoint> {
        self.endpoints.get(&EndpointKey::new(interface, alias))
    }

    pub fn bound_addr(&self, interface: &str, alias: &str) -> Option<SocketAddr> {
        self.get(interface, alias).map(|e| e.bound_addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointKey, &BoundEndpoint)> {
        self.endpoints.iter()
    }
}

async fn bind_udp(
    interface: &str,
    alias: &str,
    ip: IpAddr,
    port: u16,
    is_sd: bool,
    multicast_hops: u32,
) -> Result<BoundEndpoint, Error> {
    let bind_ip = if is_sd {
        match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    } else {
        ip
    };
    let bind_addr = SocketAddr::new(bind_ip, port);

    let domain = if bind_ip.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(SockProtocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&bind_addr.into()).map_err(|source| Error::BindFailed {
        interface: interface.to_string(),
        alias: alias.to_string(),
        addr: bind_addr,
        source,
    })?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket)?;

    if is_sd {
        let index = resolve_interface(interface).map_err(|_| Error::InterfaceUnknown(interface.to_string()))?;
        match ip {
            IpAddr::V4(group) => {
                // Joining by local interface address rather than index matches
                // the std API surface for IPv4 multicast (`join_multicast_v4`
                // takes an interface address, not an index).
                let iface_addr = local_ipv4_for_index(index).unwrap_or(Ipv4Addr::UNSPECIFIED);
                socket.join_multicast_v4(group, iface_addr).map_err(|source| Error::JoinFailed {
                    interface: interface.to_string(),
                    group: IpAddr::V4(group),
                    source,
                })?;
                socket.set_multicast_ttl_v4(multicast_hops)?;
            }
            IpAddr::V6(group) => {
                socket.join_multicast_v6(&group, index).map_err(|source| Error::JoinFailed {
                    interface: interface.to_string(),
                    group: IpAddr::V6(group),
                    source,
                })?;
            }
        }
    }

    let bound_addr = socket.local_addr()?;
    Ok(BoundEndpoint {
        bound_addr,
        protocol: Protocol::Udp,
        socket: BoundSocket::Udp(Arc::new(socket)),
    })
}

async fn bind_tcp(interface: &str, alias: &str, ip: IpAddr, port: u16) -> Result<BoundEndpoint, Error> {
    let bind_addr = SocketAddr::new(ip, port);
    let domain = if ip.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(SockProtocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&bind_addr.into()).map_err(|source| Error::BindFailed {
        interface: interface.to_string(),
        alias: alias.to_string(),
        addr: bind_addr,
        source,
    })?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    let listener = TcpListener::from_std(std_listener)?;
    let bound_addr = listener.local_addr()?;
    Ok(BoundEndpoint {
        bound_addr,
        protocol: Protocol::Tcp,
        socket: BoundSocket::Tcp(Arc::new(listener)),
    })
}

/// Best-effort address lookup for the IPv4 multicast join call, which wants
/// a local interface address rather than an index. Falls back to
/// `UNSPECIFIED` (let the kernel pick the default route's interface) when
/// the address can't be resolved, logging a warning since that silently
/// changes which NIC receives SD traffic on multi-homed hosts.
fn local_ipv4_for_index(index: u32) -> Option<Ipv4Addr> {
    match iface::ipv4_address_of_index(index) {
        Ok(addr) => Some(addr),
        Err(err) => {
            warn!(index, error = %err, "could not resolve local IPv4 address for multicast join interface");
            None
        }
    }
}
