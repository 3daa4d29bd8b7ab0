//! Runtime façade (C8): the public surface of this node — load config, bind
//! every endpoint it names, stand up the dispatcher and SD engine, and offer
//! `offer_service`/`get_client`-style calls over the result. Mirrors the
//! shape of the teacher's `Server`/`Client` split, collapsed into one type
//! because this runtime plays both roles on the same node.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, InstanceConfig, Protocol};
use crate::correlator::{Correlator, PendingKey};
use crate::dispatcher::{Dispatcher, NotificationRouter, ServiceHandler};
use crate::error::Error;
use crate::sd::{EventgroupOffer, OfferedService, SdEngine, SdSocket, ServiceKey};
use crate::session::SessionManager;
use crate::tp::{self, Reassembler};
use crate::transport::EndpointRegistry;
use crate::wire::sd::TransportProtocol;
use crate::wire::{self, Header, MessageKind, MessageType, RawMessage, ReturnCode, HEADER_SIZE};

const DEFAULT_TP_THRESHOLD: usize = 1392;
const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);
const TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const GET_CLIENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What `get_client` hands back once a required service is reachable: enough
/// identity to drive `send_request`/`subscribe_eventgroup` for it. Stub/proxy
/// code generation from an interface definition is out of this crate's scope
/// (§1), so this is a bare identity rather than a generated client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHandle {
    pub service_id: u16,
    pub major_version: u8,
}

/// A running node: everything `start` brought up, kept alive for `stop`.
pub struct Runtime {
    config: Config,
    instance_name: String,
    instance: InstanceConfig,
    client_id: u16,
    interface_version: u8,
    tp_threshold: usize,
    default_timeout: Duration,

    endpoints: EndpointRegistry,
    session: Arc<SessionManager>,
    correlator: Arc<Correlator>,
    reassembler: Arc<Reassembler>,
    sd: Arc<SdEngine>,
    notifications: Arc<NotificationRouter>,
    dispatcher: Arc<Dispatcher>,

    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Loads `config_path`, binds every endpoint the named instance uses,
    /// and starts the dispatcher and SD engine's background duties.
    pub async fn start(config_path: impl AsRef<Path>, instance_name: &str) -> Result<Arc<Self>, Error> {
        let config = Config::load(config_path)?;
        Self::start_with_config(config, instance_name).await
    }

    pub async fn start_with_config(config: Config, instance_name: &str) -> Result<Arc<Self>, Error> {
        let instance = config
            .instances
            .get(instance_name)
            .cloned()
            .ok_or_else(|| Error::UnknownAlias(instance_name.to_string()))?;

        let endpoints = EndpointRegistry::bind_all(&config, instance.sd.multicast_hops).await?;

        let primary_interface = instance
            .unicast_bind
            .keys()
            .next()
            .or_else(|| instance.providing.values().flat_map(|p| p.offer_on.keys()).next())
            .or_else(|| instance.required.values().flat_map(|r| r.find_on.iter()).next())
            .cloned()
            .ok_or_else(|| Error::UnknownAlias(instance_name.to_string()))?;
        let iface_cfg = config
            .interfaces
            .get(&primary_interface)
            .ok_or_else(|| Error::UnknownAlias(primary_interface.clone()))?;

        let sd_v4 = build_sd_socket(iface_cfg.sd.ipv4.as_deref(), iface_cfg, &endpoints, &primary_interface)?;
        let sd_v6 = build_sd_socket(iface_cfg.sd.ipv6.as_deref(), iface_cfg, &endpoints, &primary_interface)?;
        if instance.unicast_bind.len() > 1 {
            warn!(
                interface = %primary_interface,
                "multiple unicast_bind interfaces configured; only the first is used for outbound client calls"
            );
        }

        let client_id = derive_client_id(instance_name);
        let interface_version = 1;
        let session = Arc::new(SessionManager::new());
        let correlator = Arc::new(Correlator::new());
        let reassembler = Arc::new(Reassembler::new(REASSEMBLY_TIMEOUT));
        let notifications = Arc::new(NotificationRouter::default());
        let sd = Arc::new(SdEngine::new(
            session.clone(),
            sd_v4.clone(),
            sd_v6.clone(),
            Duration::from_millis(instance.sd.cycle_offer_ms),
            client_id,
        ));

        let sd_aliases = sd_endpoint_aliases(&config);
        let mut udp_sockets = Vec::new();
        let mut tcp_listeners = Vec::new();
        for (key, bound) in endpoints.iter() {
            if sd_aliases.contains(&(key.interface.clone(), key.alias.clone())) {
                continue;
            }
            match &bound.socket {
                crate::transport::BoundSocket::Udp(socket) => udp_sockets.push(socket.clone()),
                crate::transport::BoundSocket::Tcp(listener) => tcp_listeners.push(listener.clone()),
            }
        }

        let dispatcher = Dispatcher::new(
            client_id,
            interface_version,
            DEFAULT_TP_THRESHOLD,
            reassembler.clone(),
            correlator.clone(),
            sd.clone(),
            notifications.clone(),
            udp_sockets,
            tcp_listeners,
            sd_v4.clone(),
            sd_v6.clone(),
        );

        let instance_sd_request_timeout_ms = instance.sd.request_timeout_ms;
        let runtime = Arc::new(Self {
            config,
            instance_name: instance_name.to_string(),
            instance,
            client_id,
            interface_version,
            tp_threshold: DEFAULT_TP_THRESHOLD,
            default_timeout: Duration::from_millis(instance_sd_request_timeout_ms),
            endpoints,
            session,
            correlator,
            reassembler,
            sd,
            notifications,
            dispatcher,
            tasks: Mutex::new(Vec::new()),
        });

        let mut tasks = dispatcher_spawn(&runtime);
        tasks.push(tokio::spawn(runtime.sd.clone().run_offer_loop()));
        tasks.push(tokio::spawn(runtime.sd.clone().run_ttl_sweep(TTL_SWEEP_INTERVAL)));
        *runtime.tasks.lock().unwrap() = tasks;

        info!(instance = %runtime.instance_name, client_id, "runtime started");
        Ok(runtime)
    }

    /// Aborts every background task and wakes any caller still waiting on a
    /// response with `Error::Cancelled`.
    pub async fn stop(&self) {
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        self.correlator.cancel_all();
        info!(instance = %self.instance_name, "runtime stopped");
    }

    // ---- provider-side façade ----------------------------------------------

    /// Registers `handler` for the `providing` alias and begins offering it
    /// over SD on every interface named in its `offer_on` table.
    pub fn offer_service(&self, alias: &str, handler: ServiceHandler) -> Result<(), Error> {
        let providing = self
            .instance
            .providing
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        let mut endpoints = Vec::new();
        for (iface_name, endpoint_alias) in &providing.offer_on {
            let Some(bound) = self.endpoints.get(iface_name, endpoint_alias) else {
                continue;
            };
            let protocol = to_sd_protocol(bound.protocol);
            endpoints.push((bound.bound_addr, protocol));
        }
        if endpoints.is_empty() {
            return Err(Error::UnknownAlias(alias.to_string()));
        }

        let mut eventgroups = HashMap::new();
        for (&eventgroup_id, eventgroup_cfg) in &providing.eventgroups {
            let multicast = eventgroup_cfg.multicast.as_ref().and_then(|multicast_alias| {
                providing
                    .offer_on
                    .keys()
                    .find_map(|iface_name| self.endpoints.bound_addr(iface_name, multicast_alias))
            });
            eventgroups.insert(
                eventgroup_id,
                EventgroupOffer {
                    event_ids: eventgroup_cfg.event_ids.clone(),
                    multicast,
                },
            );
        }

        self.dispatcher.register_handler(providing.service_id, handler);
        self.sd.offer_service(OfferedService {
            key: ServiceKey {
                service_id: providing.service_id,
                instance_id: providing.instance_id,
                major_version: providing.major_version,
            },
            minor_version: providing.minor_version,
            ttl_secs: default_offer_ttl(&self.instance),
            endpoints,
            eventgroups,
        });
        Ok(())
    }

    /// Stops offering `alias`: sends a Stop-Offer and removes its handler.
    pub async fn stop_offering(&self, alias: &str) -> Result<(), Error> {
        let providing = self
            .instance
            .providing
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let key = ServiceKey {
            service_id: providing.service_id,
            instance_id: providing.instance_id,
            major_version: providing.major_version,
        };
        self.dispatcher.unregister_handler(providing.service_id);
        self.sd.stop_service(key).await;
        Ok(())
    }

    // ---- consumer-side façade ----------------------------------------------

    /// Blocks until the `required` alias is reachable — either a static
    /// target is configured, or SD has discovered it — or `timeout` elapses.
    /// Polls the remote-service table at a fixed interval rather than
    /// waiting on a notification, mirroring the discovery-wait loop every
    /// caller of this façade's consumer side otherwise has to hand-write.
    pub async fn get_client(&self, alias: &str, timeout: Duration) -> Result<ClientHandle, Error> {
        let required = self
            .instance
            .required
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        if required.static_ip.is_some() && required.static_port.is_some() {
            return Ok(ClientHandle {
                service_id: required.service_id,
                major_version: required.major_version,
            });
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.sd.remote_service(required.service_id, required.major_version).is_some() {
                return Ok(ClientHandle {
                    service_id: required.service_id,
                    major_version: required.major_version,
                });
            }
            if Instant::now() >= deadline {
                return Err(Error::NotReachable {
                    service_id: required.service_id,
                    major_version: required.major_version,
                });
            }
            tokio::time::sleep(GET_CLIENT_POLL_INTERVAL).await;
        }
    }

    /// Sends a request to the `required` alias's currently known endpoint
    /// (a static override if configured, otherwise the most recent SD
    /// discovery). TCP targets connect fresh and close after the one
    /// exchange; no connection is ever pooled.
    pub async fn send_request(
        &self,
        alias: &str,
        method_id: u16,
        payload: Vec<u8>,
        wait_for_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let required = self
            .instance
            .required
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let (target, protocol) = self.resolve_target(required)?;
        let session_id = self.session.next_session_id(required.service_id, method_id);
        let kind = if wait_for_response {
            MessageKind::Request
        } else {
            MessageKind::RequestNoReturn
        };

        match protocol {
            TransportProtocol::Udp => {
                self.send_udp_request(
                    required.service_id,
                    method_id,
                    session_id,
                    kind,
                    payload,
                    target,
                    wait_for_response,
                    timeout,
                )
                .await
            }
            TransportProtocol::Tcp => {
                self.send_tcp_request(
                    required.service_id,
                    method_id,
                    session_id,
                    kind,
                    payload,
                    target,
                    wait_for_response,
                    timeout,
                )
                .await
            }
        }
    }

    /// Subscribes to an eventgroup and returns a channel notifications are
    /// delivered on as `(event_id, payload)` pairs.
    pub async fn subscribe_eventgroup(
        &self,
        alias: &str,
        eventgroup_id: u16,
        event_ids: Vec<u16>,
        ttl_secs: u32,
    ) -> Result<mpsc::UnboundedReceiver<(u16, Vec<u8>)>, Error> {
        let required = self
            .instance
            .required
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let own = self
            .primary_unicast_addr()
            .ok_or_else(|| Error::NotReachable {
                service_id: required.service_id,
                major_version: required.major_version,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.notifications
            .register(required.service_id, eventgroup_id, &event_ids, tx);
        self.sd
            .subscribe_eventgroup(
                required.service_id,
                required.major_version,
                eventgroup_id,
                own,
                TransportProtocol::Udp,
                ttl_secs,
            )
            .await?;
        Ok(rx)
    }

    pub async fn unsubscribe_eventgroup(&self, alias: &str, eventgroup_id: u16) -> Result<(), Error> {
        let required = self
            .instance
            .required
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let own = self.primary_unicast_addr().ok_or_else(|| Error::NotReachable {
            service_id: required.service_id,
            major_version: required.major_version,
        })?;
        self.notifications.unregister(required.service_id, eventgroup_id);
        self.sd
            .unsubscribe_eventgroup(required.service_id, required.major_version, eventgroup_id, own, TransportProtocol::Udp)
            .await
    }

    /// Publishes one notification for `event_id` to every subscriber
    /// currently acked for `eventgroup_id`, unicast per subscriber (per
    /// §4.6's publisher-ack path: the engine records each acking subscriber,
    /// fan-out here just walks that list). A service with no acked
    /// subscriber is a no-op, not an error — publishing into the void is
    /// normal for an eventgroup nobody has subscribed to yet.
    pub async fn publish_event(
        &self,
        alias: &str,
        eventgroup_id: u16,
        event_id: u16,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        let providing = self
            .instance
            .providing
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        let service_id = providing.service_id;
        let subscribers = self.sd.subscribers_for(service_id, eventgroup_id);
        if subscribers.is_empty() {
            return Ok(());
        }
        let socket = self.primary_unicast_udp().ok_or(Error::NotReachable {
            service_id,
            major_version: providing.major_version,
        })?;
        let session_id = self.session.next_session_id(service_id, event_id);
        for target in subscribers {
            send_frames_udp(
                &socket,
                target,
                service_id,
                event_id,
                self.client_id,
                session_id,
                self.interface_version,
                MessageKind::Notification,
                &payload,
                self.tp_threshold,
            )
            .await?;
        }
        Ok(())
    }

    pub fn is_subscription_acked(&self, alias: &str, eventgroup_id: u16) -> Result<bool, Error> {
        let required = self
            .instance
            .required
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        Ok(matches!(
            self.sd.is_subscription_acked(required.service_id, eventgroup_id),
            Some(crate::sd::SubscriptionState::Acked)
        ))
    }

    // ---- internals ----------------------------------------------------------

    fn resolve_target(&self, required: &crate::config::RequiredConfig) -> Result<(SocketAddr, TransportProtocol), Error> {
        if let (Some(ip), Some(port)) = (&required.static_ip, required.static_port) {
            let addr = format!("{ip}:{port}")
                .parse()
                .map_err(|_| Error::NotReachable {
                    service_id: required.service_id,
                    major_version: required.major_version,
                })?;
            return Ok((addr, TransportProtocol::Udp));
        }
        let remote = self
            .sd
            .remote_service(required.service_id, required.major_version)
            .ok_or(Error::NotReachable {
                service_id: required.service_id,
                major_version: required.major_version,
            })?;
        Ok((remote.addr, remote.protocol))
    }

    fn primary_unicast_udp(&self) -> Option<Arc<UdpSocket>> {
        self.instance
            .unicast_bind
            .iter()
            .find_map(|(iface, alias)| self.endpoints.get(iface, alias).and_then(|b| b.as_udp()).cloned())
    }

    fn primary_unicast_addr(&self) -> Option<SocketAddr> {
        self.instance
            .unicast_bind
            .iter()
            .find_map(|(iface, alias)| self.endpoints.bound_addr(iface, alias))
    }

    async fn send_udp_request(
        &self,
        service_id: u16,
        method_id: u16,
        session_id: u16,
        kind: MessageKind,
        payload: Vec<u8>,
        target: SocketAddr,
        wait_for_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let socket = self.primary_unicast_udp().ok_or(Error::NotReachable {
            service_id,
            major_version: 0,
        })?;
        let client_id = self.client_id;
        let interface_version = self.interface_version;
        let tp_threshold = self.tp_threshold;

        let send = move |_key: PendingKey| async move {
            send_frames_udp(
                &socket,
                target,
                service_id,
                method_id,
                client_id,
                session_id,
                interface_version,
                kind,
                &payload,
                tp_threshold,
            )
            .await
        };

        if !wait_for_response {
            send(PendingKey { service_id, method_id, session_id }).await?;
            return Ok(None);
        }

        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let key = PendingKey { service_id, method_id, session_id };
        let payload = self.correlator.wait_for(key, deadline, send).await?;
        Ok(Some(payload))
    }

    async fn send_tcp_request(
        &self,
        service_id: u16,
        method_id: u16,
        session_id: u16,
        kind: MessageKind,
        payload: Vec<u8>,
        target: SocketAddr,
        wait_for_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let client_id = self.client_id;
        let interface_version = self.interface_version;
        let tp_threshold = self.tp_threshold;
        let reassembler = self.reassembler.clone();

        let exchange = async move {
            let mut stream = TcpStream::connect(target).await?;
            for frame in build_frames(service_id, method_id, client_id, session_id, interface_version, kind, &payload, tp_threshold) {
                stream.write_all(&frame).await?;
            }
            if !wait_for_response {
                return Ok(None);
            }

            loop {
                let mut header_buf = [0u8; HEADER_SIZE];
                stream.read_exact(&mut header_buf).await?;
                let header = Header::decode(&header_buf)?;
                let mut body = vec![0u8; header.payload_size()];
                if !body.is_empty() {
                    stream.read_exact(&mut body).await?;
                }

                let reply_payload = if header.message_type.is_tp() {
                    let tp_header = wire::TpHeader::decode(&body)?;
                    let chunk = body[wire::TP_HEADER_SIZE..].to_vec();
                    let key = tp::AssemblyKey {
                        service_id: header.service_id,
                        method_id: header.method_id,
                        client_id: header.client_id,
                        session_id: header.session_id,
                    };
                    match reassembler.insert(key, tp_header.offset, tp_header.more_segments, chunk)? {
                        Some(full) => full,
                        None => continue,
                    }
                } else {
                    body
                };

                return match header.message_type.kind() {
                    MessageKind::Error => Err(Error::RequestFailed {
                        service_id,
                        method_id,
                        return_code: header.return_code,
                    }),
                    _ => Ok(Some(reply_payload)),
                };
            }
        };

        match timeout {
            Some(duration) => tokio::time::timeout(duration, exchange)
                .await
                .map_err(|_| Error::Timeout { service_id, method_id })?,
            None => exchange.await,
        }
    }
}

fn dispatcher_spawn(runtime: &Arc<Runtime>) -> Vec<JoinHandle<()>> {
    runtime.dispatcher.spawn()
}

fn default_offer_ttl(instance: &InstanceConfig) -> u32 {
    // Conventionally several offer cycles long so a single dropped datagram
    // never ages a live service out of a consumer's remote-service table.
    ((instance.sd.cycle_offer_ms / 1000).max(1) * 3) as u32
}

fn derive_client_id(instance_name: &str) -> u16 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    instance_name.hash(&mut hasher);
    let hashed = hasher.finish() as u16;
    if hashed == 0 {
        0x0001
    } else {
        hashed
    }
}

fn to_sd_protocol(protocol: Protocol) -> TransportProtocol {
    match protocol {
        Protocol::Udp => TransportProtocol::Udp,
        Protocol::Tcp => TransportProtocol::Tcp,
    }
}

fn sd_endpoint_aliases(config: &Config) -> std::collections::HashSet<(String, String)> {
    let mut set = std::collections::HashSet::new();
    for (iface_name, iface) in &config.interfaces {
        for alias in [&iface.sd.ipv4, &iface.sd.ipv6].into_iter().flatten() {
            set.insert((iface_name.clone(), alias.clone()));
        }
    }
    set
}

fn build_sd_socket(
    alias: Option<&str>,
    iface_cfg: &crate::config::InterfaceConfig,
    endpoints: &EndpointRegistry,
    iface_name: &str,
) -> Result<Option<SdSocket>, Error> {
    let Some(alias) = alias else { return Ok(None) };
    let endpoint_cfg = iface_cfg
        .endpoints
        .get(alias)
        .ok_or_else(|| Error::UnknownAlias(format!("{iface_name}/{alias}")))?;
    let group_addr: SocketAddr = format!("{}:{}", endpoint_cfg.ip, endpoint_cfg.port)
        .parse()
        .map_err(|_| Error::UnknownAlias(format!("{iface_name}/{alias}")))?;
    let socket = endpoints.get(iface_name, alias).and_then(|bound| bound.as_udp()).cloned();
    Ok(socket.map(|socket| SdSocket { socket, group_addr }))
}

#[allow(clippy::too_many_arguments)]
async fn send_frames_udp(
    socket: &UdpSocket,
    target: SocketAddr,
    service_id: u16,
    method_id: u16,
    client_id: u16,
    session_id: u16,
    interface_version: u8,
    kind: MessageKind,
    payload: &[u8],
    tp_threshold: usize,
) -> Result<(), Error> {
    for frame in build_frames(service_id, method_id, client_id, session_id, interface_version, kind, payload, tp_threshold) {
        socket.send_to(&frame, target).await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_frames(
    service_id: u16,
    method_id: u16,
    client_id: u16,
    session_id: u16,
    interface_version: u8,
    kind: MessageKind,
    payload: &[u8],
    tp_threshold: usize,
) -> Vec<Vec<u8>> {
    let header = |tp: bool| Header {
        service_id,
        method_id,
        length: 0,
        client_id,
        session_id,
        interface_version,
        message_type: MessageType::new(kind, tp),
        return_code: ReturnCode::Ok,
    };

    if payload.len() <= tp_threshold {
        return vec![RawMessage::new(header(false), payload.to_vec()).encode()];
    }

    tp::segment(payload, tp_threshold)
        .into_iter()
        .map(|segment| {
            let mut body = Vec::with_capacity(wire::TP_HEADER_SIZE + segment.data.len());
            segment.header().encode(&mut body);
            body.extend_from_slice(&segment.data);
            RawMessage::new(header(true), body).encode()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(required_extra: &str) -> String {
        format!(
            r#"{{
                "interfaces": {{
                    "lo": {{
                        "endpoints": {{
                            "svc": {{ "ip": "127.0.0.1", "port": 0, "version": "4", "protocol": "udp" }}
                        }},
                        "sd": {{ "ipv4": null, "ipv6": null }}
                    }}
                }},
                "instances": {{
                    "node": {{
                        "providing": {{}},
                        "required": {{
                            "adder": {{
                                "service_id": 4097,
                                "instance_id": 1,
                                "major_version": 1,
                                "find_on": ["lo"]
                                {required_extra}
                            }}
                        }},
                        "unicast_bind": {{ "lo": "svc" }},
                        "sd": {{ "cycle_offer_ms": 50, "request_timeout_ms": 200 }}
                    }}
                }}
            }}"#
        )
    }

    #[tokio::test]
    async fn get_client_resolves_immediately_for_a_static_target() {
        let config = Config::from_str(&config_json(
            r#", "static_ip": "127.0.0.1", "static_port": 30600"#,
        ))
        .unwrap();
        let runtime = Runtime::start_with_config(config, "node").await.unwrap();

        let client = tokio::time::timeout(Duration::from_millis(500), runtime.get_client("adder", Duration::from_secs(5)))
            .await
            .expect("must not block on a statically configured target")
            .unwrap();
        assert_eq!(client.service_id, 0x1001);
        assert_eq!(client.major_version, 1);

        runtime.stop().await;
    }

    #[tokio::test]
    async fn get_client_times_out_when_never_discovered() {
        let config = Config::from_str(&config_json("")).unwrap();
        let runtime = Runtime::start_with_config(config, "node").await.unwrap();

        let result = runtime.get_client("adder", Duration::from_millis(150)).await;
        assert!(matches!(result, Err(Error::NotReachable { service_id: 0x1001, major_version: 1 })));

        runtime.stop().await;
    }

    #[tokio::test]
    async fn get_client_rejects_an_unconfigured_alias() {
        let config = Config::from_str(&config_json("")).unwrap();
        let runtime = Runtime::start_with_config(config, "node").await.unwrap();

        let result = runtime.get_client("no-such-alias", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::UnknownAlias(alias)) if alias == "no-such-alias"));

        runtime.stop().await;
    }
}
