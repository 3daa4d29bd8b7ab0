//! Service Discovery engine (C6): offers, finds, subscribes, acknowledges,
//! and ages out services, following the three-duty model of §4.6 (periodic
//! offer emission, inbound SD parsing, TTL aging) as three cooperating
//! tasks around shared, mutex-guarded tables — the same shape the teacher's
//! `server::mod` uses for one duty (offer emission) and one table
//! (subscriptions), generalized here to all three duties and all three
//! tables named in §3.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::session::SessionManager;
use crate::wire::sd::{Entry, EventgroupEntry, OptionRun, SdOption, ServiceEntry, TransportProtocol};
use crate::wire::sd::{Flags, SdPacket};
use crate::wire::{Header, MessageKind, MessageType, RawMessage, ReturnCode, SD_METHOD_ID, SD_SERVICE_ID};

/// TTL value meaning "never expires" (PRS_SOMEIPServiceDiscoveryProtocol).
pub const TTL_FOREVER: u32 = 0x00ff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub service_id: u16,
    pub major_version: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubKey {
    pub service_id: u16,
    pub eventgroup_id: u16,
}

#[derive(Debug, Clone)]
pub struct RemoteService {
    pub addr: SocketAddr,
    pub protocol: TransportProtocol,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Acked,
    Rejected,
}

#[derive(Debug, Clone)]
struct Subscription {
    state: SubscriptionState,
    /// The endpoint that sent the matching ack, once acked — notifications
    /// from any other source are ignored even for an otherwise-acked
    /// subscription (§3 Subscription table).
    acked_endpoint: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct EventgroupOffer {
    pub event_ids: Vec<u16>,
    pub multicast: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct OfferedService {
    pub key: ServiceKey,
    pub minor_version: u32,
    pub ttl_secs: u32,
    /// (endpoint, transport) pairs, one per family this service is offered on.
    pub endpoints: Vec<(SocketAddr, TransportProtocol)>,
    pub eventgroups: HashMap<u16, EventgroupOffer>,
}

/// A bound SD socket plus the multicast group address messages are sent to.
#[derive(Clone)]
pub struct SdSocket {
    pub socket: Arc<UdpSocket>,
    pub group_addr: SocketAddr,
}

pub struct SdEngine {
    session: Arc<SessionManager>,
    sockets_v4: Option<SdSocket>,
    sockets_v6: Option<SdSocket>,
    cycle: Duration,
    client_id: u16,
    interface_version: u8,

    offered: Mutex<HashMap<ServiceKey, OfferRecord>>,
    remote_services: Mutex<HashMap<RemoteKey, RemoteService>>,
    subscriptions: Mutex<HashMap<SubKey, Subscription>>,
    publisher_subs: Mutex<HashMap<SubKey, Vec<SocketAddr>>>,
}

/// An offered service plus the wall-clock timestamp it was last advertised
/// at — offer-due checking is per service, not one shared ticker, so a
/// future config exposing per-service cadence needs no restructuring.
#[derive(Clone)]
struct OfferRecord {
    service: OfferedService,
    last_offered: Option<Instant>,
}

/// How often the offer-emission duty wakes to check each offered service's
/// due time; independent of the per-service `cycle_offer_ms` itself.
const OFFER_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl SdEngine {
    pub fn new(
        session: Arc<SessionManager>,
        sockets_v4: Option<SdSocket>,
        sockets_v6: Option<SdSocket>,
        cycle: Duration,
        client_id: u16,
    ) -> Self {
        Self {
            session,
            sockets_v4,
            sockets_v6,
            cycle,
            client_id,
            interface_version: 1,
            offered: Mutex::new(HashMap::new()),
            remote_services: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            publisher_subs: Mutex::new(HashMap::new()),
        }
    }

    // ---- offering (provider side) ----------------------------------------

    pub fn offer_service(&self, offer: OfferedService) {
        debug!(
            service_id = offer.key.service_id,
            instance_id = offer.key.instance_id,
            major_version = offer.key.major_version,
            "service registered for offering"
        );
        self.offered.lock().unwrap().insert(
            offer.key,
            OfferRecord {
                service: offer,
                last_offered: None,
            },
        );
    }

    /// Removes the service from the offered set and sends a Stop-Offer
    /// immediately, once, on every family it was offered on.
    pub async fn stop_service(&self, key: ServiceKey) {
        let record = self.offered.lock().unwrap().remove(&key);
        let Some(record) = record else { return };
        let offer = record.service;
        for (endpoint, protocol) in &offer.endpoints {
            let packet = self.build_offer_packet(&offer, *endpoint, *protocol, 0);
            let family_socket = self.socket_for_addr(*endpoint);
            if let Some(sd_socket) = family_socket {
                if let Err(err) = self.send_packet(sd_socket, sd_socket.group_addr, &packet).await {
                    warn!(error = %err, "failed to send Stop-Offer");
                }
            }
        }
    }

    /// Runs the offer-emission duty until cancelled: wakes at a short, fixed
    /// poll interval and checks each offered service's own due time against
    /// its configured cycle, rather than driving every service off one
    /// shared ticker. Intended to be `tokio::spawn`ed once by the runtime
    /// façade.
    pub async fn run_offer_loop(self: Arc<Self>) {
        let mut poll = tokio::time::interval(OFFER_POLL_INTERVAL);
        loop {
            poll.tick().await;
            let now = Instant::now();
            let due: Vec<OfferedService> = {
                let mut offered = self.offered.lock().unwrap();
                offered
                    .values_mut()
                    .filter_map(|record| {
                        let is_due = record.last_offered.map_or(true, |t| now.duration_since(t) >= self.cycle);
                        if is_due {
                            record.last_offered = Some(now);
                            Some(record.service.clone())
                        } else {
                            None
                        }
                    })
                    .collect()
            };
            for offer in due {
                for (endpoint, protocol) in &offer.endpoints {
                    let packet = self.build_offer_packet(&offer, *endpoint, *protocol, offer.ttl_secs);
                    if let Some(sd_socket) = self.socket_for_addr(*endpoint) {
                        if let Err(err) = self.send_packet(sd_socket, sd_socket.group_addr, &packet).await {
                            warn!(error = %err, service_id = offer.key.service_id, "failed to send OfferService");
                        }
                    }
                }
            }
        }
    }

    /// Runs the TTL-aging duty until cancelled.
    pub async fn run_ttl_sweep(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let mut table = self.remote_services.lock().unwrap();
            let before = table.len();
            table.retain(|key, entry| match entry.expires_at {
                Some(expiry) => expiry > now,
                None => true,
            });
            if table.len() != before {
                debug!(expired = before - table.len(), "TTL sweep removed remote-service entries");
            }
        }
    }

    fn build_offer_packet(
        &self,
        offer: &OfferedService,
        endpoint: SocketAddr,
        protocol: TransportProtocol,
        ttl: u32,
    ) -> SdPacket {
        let mut options = vec![endpoint_option(endpoint, protocol)];
        let multicast_start = options.len() as u8;
        for eventgroup in offer.eventgroups.values() {
            if let Some(multicast) = eventgroup.multicast {
                options.push(multicast_option(multicast, TransportProtocol::Udp));
            }
        }
        let multicast_count = options.len() as u8 - multicast_start;
        let second_run = if multicast_count > 0 {
            OptionRun { index: multicast_start, count: multicast_count }
        } else {
            OptionRun::default()
        };

        let entries = vec![Entry::OfferService(ServiceEntry {
            first_run: OptionRun { index: 0, count: 1 },
            second_run,
            service_id: offer.key.service_id,
            instance_id: offer.key.instance_id,
            major_version: offer.key.major_version,
            ttl,
            minor_version: offer.minor_version,
        })];

        entries_into_packet(entries, options)
    }

    // ---- finding / subscribing (consumer side) ----------------------------

    pub fn remote_service(&self, service_id: u16, major_version: u8) -> Option<RemoteService> {
        self.remote_services
            .lock()
            .unwrap()
            .get(&RemoteKey { service_id, major_version })
            .cloned()
    }

    pub async fn subscribe_eventgroup(
        &self,
        service_id: u16,
        major_version: u8,
        eventgroup_id: u16,
        own_endpoint: SocketAddr,
        own_protocol: TransportProtocol,
        ttl: u32,
    ) -> Result<(), crate::error::Error> {
        let remote = self
            .remote_service(service_id, major_version)
            .ok_or(crate::error::Error::NotReachable { service_id, major_version })?;

        let key = SubKey { service_id, eventgroup_id };
        self.subscriptions.lock().unwrap().insert(
            key,
            Subscription {
                state: SubscriptionState::Pending,
                acked_endpoint: None,
            },
        );

        let entry = Entry::SubscribeEventgroup(EventgroupEntry {
            first_run: OptionRun { index: 0, count: 1 },
            second_run: OptionRun::default(),
            service_id,
            instance_id: 0xffff,
            major_version,
            ttl,
            eventgroup_id,
        });
        let packet = entries_into_packet(vec![entry], vec![endpoint_option(own_endpoint, own_protocol)]);

        let sd_socket = self
            .socket_for_addr(remote.addr)
            .ok_or(crate::error::Error::NotReachable { service_id, major_version })?;
        self.send_packet(sd_socket, sd_socket.group_addr, &packet).await?;
        Ok(())
    }

    pub async fn unsubscribe_eventgroup(
        &self,
        service_id: u16,
        major_version: u8,
        eventgroup_id: u16,
        own_endpoint: SocketAddr,
        own_protocol: TransportProtocol,
    ) -> Result<(), crate::error::Error> {
        let key = SubKey { service_id, eventgroup_id };
        self.subscriptions.lock().unwrap().remove(&key);

        let Some(remote) = self.remote_service(service_id, major_version) else {
            return Ok(());
        };
        let entry = Entry::SubscribeEventgroup(EventgroupEntry {
            first_run: OptionRun { index: 0, count: 1 },
            second_run: OptionRun::default(),
            service_id,
            instance_id: 0xffff,
            major_version,
            ttl: 0,
            eventgroup_id,
        });
        let packet = entries_into_packet(vec![entry], vec![endpoint_option(own_endpoint, own_protocol)]);
        if let Some(sd_socket) = self.socket_for_addr(remote.addr) {
            self.send_packet(sd_socket, sd_socket.group_addr, &packet).await?;
        }
        Ok(())
    }

    pub fn is_subscription_acked(&self, service_id: u16, eventgroup_id: u16) -> Option<SubscriptionState> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(&SubKey { service_id, eventgroup_id })
            .map(|sub| sub.state)
    }

    /// Whether `source` is the endpoint that acked this subscription — the
    /// dispatcher uses this to drop notifications from any other sender, and
    /// to drop notifications entirely for a subscription that isn't acked.
    pub fn accepts_notification_from(&self, service_id: u16, eventgroup_id: u16, source: SocketAddr) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .get(&SubKey { service_id, eventgroup_id })
            .is_some_and(|sub| sub.state == SubscriptionState::Acked && sub.acked_endpoint == Some(source))
    }

    /// Subscribers who have an active ack for one of our eventgroups — the
    /// fan-out list the dispatcher sends notifications to.
    pub fn subscribers_for(&self, service_id: u16, eventgroup_id: u16) -> Vec<SocketAddr> {
        self.publisher_subs
            .lock()
            .unwrap()
            .get(&SubKey { service_id, eventgroup_id })
            .cloned()
            .unwrap_or_default()
    }

    // ---- inbound parsing ----------------------------------------------------

    /// Entry point for every datagram the dispatcher reads from an SD
    /// socket. `reply_socket` is the *same* socket the datagram arrived on
    /// — per §9 Open Question (b), replies always go out the family the
    /// request arrived on, never an inferred one.
    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr, reply_socket: &SdSocket) {
        let message = match RawMessage::decode(data) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, %source, "dropping malformed SD datagram");
                return;
            }
        };
        if !message.header.is_sd() {
            trace!(%source, "non-SD message on SD socket, ignoring");
            return;
        }
        let packet = match SdPacket::decode(&message.payload) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, %source, "dropping malformed SD payload");
                return;
            }
        };
        self.handle_packet(packet, source, reply_socket).await;
    }

    async fn handle_packet(&self, packet: SdPacket, source: SocketAddr, reply_socket: &SdSocket) {
        for entry in &packet.entries {
            match entry {
                Entry::OfferService(service_entry) => self.handle_offer(service_entry, &packet),
                Entry::FindService(service_entry) => {
                    trace!(service_id = service_entry.service_id, "FindService received, no reactive response implemented");
                }
                Entry::SubscribeEventgroup(eventgroup_entry) => {
                    self.handle_subscribe(eventgroup_entry, &packet, source, reply_socket).await
                }
                Entry::SubscribeEventgroupAck(eventgroup_entry) => self.handle_subscribe_ack(eventgroup_entry, source),
            }
        }
    }

    fn handle_offer(&self, entry: &ServiceEntry, packet: &SdPacket) {
        let key = RemoteKey {
            service_id: entry.service_id,
            major_version: entry.major_version,
        };
        if entry.is_stop() {
            if self.remote_services.lock().unwrap().remove(&key).is_some() {
                debug!(service_id = entry.service_id, "removed remote service on Stop-Offer");
            }
            return;
        }

        let endpoint_option = packet
            .resolve(entry.first_run)
            .into_iter()
            .chain(packet.resolve(entry.second_run))
            .find_map(unicast_endpoint_of);
        let Some((addr, protocol)) = endpoint_option else {
            trace!(service_id = entry.service_id, "Offer has no resolvable unicast endpoint, ignoring");
            return;
        };

        let expires_at = if entry.ttl == TTL_FOREVER {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(u64::from(entry.ttl)))
        };
        self.remote_services.lock().unwrap().insert(
            key,
            RemoteService {
                addr,
                protocol,
                expires_at,
            },
        );
        debug!(service_id = entry.service_id, %addr, "remote service (re)discovered");
    }

    async fn handle_subscribe(
        &self,
        entry: &EventgroupEntry,
        packet: &SdPacket,
        source: SocketAddr,
        reply_socket: &SdSocket,
    ) {
        let owned = {
            let offered = self.offered.lock().unwrap();
            offered
                .values()
                .find(|o| o.key.service_id == entry.service_id && o.key.instance_id == entry.instance_id)
                .cloned()
        };
        let Some(offered) = owned else {
            trace!(service_id = entry.service_id, "Subscribe for a service we don't offer, ignoring");
            return;
        };

        let subkey = SubKey {
            service_id: entry.service_id,
            eventgroup_id: entry.eventgroup_id,
        };

        if entry.is_stop() {
            self.publisher_subs
                .lock()
                .unwrap()
                .entry(subkey)
                .or_default()
                .retain(|addr| *addr != source);
            return;
        }

        if offered.key.major_version != entry.major_version || !offered.eventgroups.contains_key(&entry.eventgroup_id) {
            self.send_subscribe_reply(entry, reply_socket, 0).await;
            return;
        }

        let subscriber_endpoint = packet
            .resolve(entry.first_run)
            .into_iter()
            .chain(packet.resolve(entry.second_run))
            .find_map(unicast_endpoint_of);
        let Some((subscriber_addr, _protocol)) = subscriber_endpoint else {
            self.send_subscribe_reply(entry, reply_socket, 0).await;
            return;
        };

        {
            let mut subs = self.publisher_subs.lock().unwrap();
            let list = subs.entry(subkey).or_default();
            if !list.contains(&subscriber_addr) {
                list.push(subscriber_addr);
            }
        }
        self.send_subscribe_reply(entry, reply_socket, offered.ttl_secs).await;
    }

    async fn send_subscribe_reply(&self, entry: &EventgroupEntry, reply_socket: &SdSocket, ttl: u32) {
        let ack_entry = Entry::SubscribeEventgroupAck(EventgroupEntry {
            first_run: OptionRun::default(),
            second_run: OptionRun::default(),
            service_id: entry.service_id,
            instance_id: entry.instance_id,
            major_version: entry.major_version,
            ttl,
            eventgroup_id: entry.eventgroup_id,
        });
        let packet = entries_into_packet(vec![ack_entry], vec![]);
        if let Err(err) = self.send_packet(reply_socket, reply_socket.group_addr, &packet).await {
            warn!(error = %err, "failed to send SubscribeEventgroupAck/Nack");
        }
    }

    fn handle_subscribe_ack(&self, entry: &EventgroupEntry, source: SocketAddr) {
        let key = SubKey {
            service_id: entry.service_id,
            eventgroup_id: entry.eventgroup_id,
        };
        // Notifications arrive on the provider's offered unicast endpoint, not
        // its SD socket, so the endpoint this ack is trusted to publish from
        // is the one already recorded from that service's Offer — not the
        // literal source address of this ack datagram, which is the sender's
        // SD port.
        let acked_endpoint = self
            .remote_service(entry.service_id, entry.major_version)
            .map(|remote| remote.addr)
            .unwrap_or(source);

        let mut subs = self.subscriptions.lock().unwrap();
        let Some(sub) = subs.get_mut(&key) else {
            trace!(service_id = entry.service_id, "ack for an unknown or already-unsubscribed subscription, ignoring");
            return;
        };
        if entry.ttl > 0 {
            sub.state = SubscriptionState::Acked;
            sub.acked_endpoint = Some(acked_endpoint);
        } else {
            sub.state = SubscriptionState::Rejected;
            sub.acked_endpoint = None;
        }
    }

    fn socket_for_addr(&self, addr: SocketAddr) -> Option<&SdSocket> {
        if addr.is_ipv4() {
            self.sockets_v4.as_ref()
        } else {
            self.sockets_v6.as_ref()
        }
    }

    async fn send_packet(&self, sd_socket: &SdSocket, dest: SocketAddr, packet: &SdPacket) -> std::io::Result<()> {
        let mut sd_payload = Vec::new();
        packet.encode(&mut sd_payload);
        let session_id = self.session.next_session_id(SD_SERVICE_ID, SD_METHOD_ID);
        let header = Header {
            service_id: SD_SERVICE_ID,
            method_id: SD_METHOD_ID,
            length: 0,
            client_id: self.client_id,
            session_id,
            interface_version: self.interface_version,
            message_type: MessageType::new(MessageKind::Notification, false),
            return_code: ReturnCode::Ok,
        };
        let message = RawMessage::new(header, sd_payload);
        let buf = message.encode();
        trace!(bytes = buf.len(), %dest, "sending SD packet");
        sd_socket.socket.send_to(&buf, dest).await.map(|_| ())
    }
}

fn entries_into_packet(entries: Vec<Entry>, options: Vec<SdOption>) -> SdPacket {
    SdPacket {
        flags: Flags::new(false, true),
        entries,
        options,
    }
}

fn endpoint_option(addr: SocketAddr, protocol: TransportProtocol) -> SdOption {
    match addr {
        SocketAddr::V4(v4) => SdOption::Ipv4Endpoint {
            addr: *v4.ip(),
            protocol,
            port: v4.port(),
        },
        SocketAddr::V6(v6) => SdOption::Ipv6Endpoint {
            addr: *v6.ip(),
            protocol,
            port: v6.port(),
        },
    }
}

fn multicast_option(addr: SocketAddr, protocol: TransportProtocol) -> SdOption {
    match addr {
        SocketAddr::V4(v4) => SdOption::Ipv4Multicast {
            addr: *v4.ip(),
            protocol,
            port: v4.port(),
        },
        SocketAddr::V6(v6) => SdOption::Ipv6Multicast {
            addr: *v6.ip(),
            protocol,
            port: v6.port(),
        },
    }
}

fn unicast_endpoint_of(option: &SdOption) -> Option<(SocketAddr, TransportProtocol)> {
    match option {
        SdOption::Ipv4Endpoint { addr, protocol, port } => Some((SocketAddr::new((*addr).into(), *port), *protocol)),
        SdOption::Ipv6Endpoint { addr, protocol, port } => Some((SocketAddr::new((*addr).into(), *port), *protocol)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    async fn sd_socket_pair() -> (SdSocket, SdSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            SdSocket {
                socket: Arc::new(a),
                group_addr: b_addr,
            },
            SdSocket {
                socket: Arc::new(b),
                group_addr: a_addr,
            },
        )
    }

    #[tokio::test]
    async fn offer_then_stop_offer_round_trips_through_remote_table() {
        let (provider_sd, consumer_sd) = sd_socket_pair().await;
        let provider = Arc::new(SdEngine::new(
            Arc::new(SessionManager::new()),
            Some(provider_sd),
            None,
            Duration::from_millis(20),
            0x1111,
        ));
        let consumer = SdEngine::new(
            Arc::new(SessionManager::new()),
            Some(consumer_sd.clone()),
            None,
            Duration::from_millis(20),
            0x2222,
        );

        let service_endpoint = loopback(40000);
        provider.offer_service(OfferedService {
            key: ServiceKey {
                service_id: 0x1234,
                instance_id: 1,
                major_version: 1,
            },
            minor_version: 0,
            ttl_secs: 3,
            endpoints: vec![(service_endpoint, TransportProtocol::Udp)],
            eventgroups: HashMap::new(),
        });

        let offer_loop = tokio::spawn(provider.clone().run_offer_loop());

        let mut buf = vec![0u8; 2048];
        let (len, from) = consumer_sd.socket.recv_from(&mut buf).await.unwrap();
        consumer.handle_datagram(&buf[..len], from, &consumer_sd).await;

        offer_loop.abort();

        let remote = consumer.remote_service(0x1234, 1).expect("offer should populate remote table");
        assert_eq!(remote.addr, service_endpoint);

        provider.stop_service(ServiceKey {
            service_id: 0x1234,
            instance_id: 1,
            major_version: 1,
        }).await;
        let (len, from) = consumer_sd.socket.recv_from(&mut buf).await.unwrap();
        consumer.handle_datagram(&buf[..len], from, &consumer_sd).await;
        assert!(consumer.remote_service(0x1234, 1).is_none());
    }

    #[tokio::test]
    async fn subscribe_ack_and_unknown_eventgroup_nack() {
        let (provider_sd, consumer_sd) = sd_socket_pair().await;
        let provider = SdEngine::new(
            Arc::new(SessionManager::new()),
            Some(provider_sd.clone()),
            None,
            Duration::from_secs(1),
            0x1111,
        );
        provider.offer_service(OfferedService {
            key: ServiceKey {
                service_id: 0x7001,
                instance_id: 1,
                major_version: 1,
            },
            minor_version: 0,
            ttl_secs: 3,
            endpoints: vec![(loopback(41000), TransportProtocol::Udp)],
            eventgroups: HashMap::from([(1, EventgroupOffer { event_ids: vec![0x8001], multicast: None })]),
        });

        let subscribe_entry = Entry::SubscribeEventgroup(EventgroupEntry {
            first_run: OptionRun { index: 0, count: 1 },
            second_run: OptionRun::default(),
            service_id: 0x7001,
            instance_id: 1,
            major_version: 1,
            ttl: 3,
            eventgroup_id: 1,
        });
        let packet = entries_into_packet(vec![subscribe_entry], vec![endpoint_option(loopback(42000), TransportProtocol::Udp)]);
        provider.handle_packet(packet, consumer_sd.socket.local_addr().unwrap(), &provider_sd).await;

        assert_eq!(provider.subscribers_for(0x7001, 1), vec![loopback(42000)]);

        let bad_entry = Entry::SubscribeEventgroup(EventgroupEntry {
            first_run: OptionRun::default(),
            second_run: OptionRun::default(),
            service_id: 0x7001,
            instance_id: 1,
            major_version: 1,
            ttl: 3,
            eventgroup_id: 99,
        });
        let packet = entries_into_packet(vec![bad_entry], vec![]);
        provider.handle_packet(packet, consumer_sd.socket.local_addr().unwrap(), &provider_sd).await;
        assert!(provider.subscribers_for(0x7001, 99).is_empty());
    }
}
