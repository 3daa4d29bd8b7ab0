//! Dispatcher / event loop (C7): owns every socket this node has bound and
//! routes inbound bytes to the SD engine, the request/response correlator,
//! or a locally registered request handler — §4.7.
//!
//! A fixed, statically-known set of `tokio::select!` branches can't express
//! a socket set whose size comes from a config file read at startup. Instead
//! each bound socket gets its own small reader task that forwards decoded
//! frames into one `mpsc` channel; everything past that channel — decoding,
//! routing, handler invocation, TP reassembly, correlator/SD delivery — runs
//! on the single task that owns `Dispatcher::run`, preserving the "one
//! cooperative task for protocol bookkeeping" model of §5. TCP connections
//! get a paired reader/writer task per connection so the dispatcher can
//! reply without re-acquiring the stream.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::correlator::{Correlator, PendingKey, Reply};
use crate::error::Error;
use crate::sd::{SdEngine, SdSocket};
use crate::tp::{self, AssemblyKey, Reassembler};
use crate::wire::{Header, MessageKind, MessageType, RawMessage, ReturnCode, HEADER_SIZE};

/// The result a registered handler returns for one inbound request: `Some`
/// payload to answer with a RESPONSE, `None` to answer with no payload
/// (still a RESPONSE, unless the request was REQUEST_NO_RETURN).
pub type HandlerResult = Result<Option<Vec<u8>>, Error>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A locally offered service's request handler. Called with the inbound
/// method id and payload; the dispatcher takes care of session/client id
/// echoing and TP segmentation of the reply.
pub type ServiceHandler = Arc<dyn Fn(u16, Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Where a notification is delivered once its subscription is confirmed
/// acked and its sender matches the acking endpoint.
pub type EventSink = mpsc::UnboundedSender<(u16, Vec<u8>)>;

/// Routes inbound NOTIFICATION messages to the eventgroup a locally
/// subscribed event belongs to, and from there to the registered sink.
/// This bookkeeping is local to this node — nothing about it is on the
/// wire — so it lives beside the dispatcher rather than inside the SD
/// wire-protocol engine itself.
#[derive(Default)]
pub struct NotificationRouter {
    /// (service_id, event_id) -> eventgroup_id, populated by `subscribe_eventgroup`.
    routes: Mutex<HashMap<(u16, u16), u16>>,
    sinks: Mutex<HashMap<(u16, u16), EventSink>>,
}

impl NotificationRouter {
    pub fn register(&self, service_id: u16, eventgroup_id: u16, event_ids: &[u16], sink: EventSink) {
        let mut routes = self.routes.lock().unwrap();
        for &event_id in event_ids {
            routes.insert((service_id, event_id), eventgroup_id);
        }
        self.sinks.lock().unwrap().insert((service_id, eventgroup_id), sink);
    }

    pub fn unregister(&self, service_id: u16, eventgroup_id: u16) {
        self.sinks.lock().unwrap().remove(&(service_id, eventgroup_id));
        self.routes.lock().unwrap().retain(|_, eg| *eg != eventgroup_id);
    }

    fn eventgroup_for(&self, service_id: u16, event_id: u16) -> Option<u16> {
        self.routes.lock().unwrap().get(&(service_id, event_id)).copied()
    }

    fn deliver(&self, service_id: u16, eventgroup_id: u16, event_id: u16, payload: Vec<u8>) -> bool {
        match self.sinks.lock().unwrap().get(&(service_id, eventgroup_id)) {
            Some(sink) => sink.send((event_id, payload)).is_ok(),
            None => false,
        }
    }
}

/// How a reply to one inbound message gets back to its sender: the UDP
/// socket it arrived on plus its source address, or the outbound half of
/// the TCP connection it arrived on.
#[derive(Clone)]
enum Responder {
    Udp(Arc<UdpSocket>, SocketAddr),
    Tcp(mpsc::UnboundedSender<Vec<u8>>),
}

impl Responder {
    async fn reply(&self, buf: Vec<u8>) {
        match self {
            Responder::Udp(socket, addr) => {
                if let Err(err) = socket.send_to(&buf, *addr).await {
                    warn!(error = %err, %addr, "failed to send reply datagram");
                }
            }
            Responder::Tcp(tx) => {
                if tx.send(buf).is_err() {
                    warn!("failed to queue TCP reply: connection writer has gone away");
                }
            }
        }
    }
}

enum InboundEvent {
    Sd {
        via_v4: bool,
        data: Vec<u8>,
        source: SocketAddr,
    },
    Message {
        data: Vec<u8>,
        source: SocketAddr,
        responder: Responder,
    },
}

pub struct Dispatcher {
    client_id: u16,
    interface_version: u8,
    tp_threshold: usize,
    reassembler: Arc<Reassembler>,
    correlator: Arc<Correlator>,
    sd: Arc<SdEngine>,
    notifications: Arc<NotificationRouter>,
    handlers: Mutex<HashMap<u16, ServiceHandler>>,
    udp_sockets: Vec<Arc<UdpSocket>>,
    tcp_listeners: Vec<Arc<TcpListener>>,
    sd_v4: Option<SdSocket>,
    sd_v6: Option<SdSocket>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
}

#[allow(clippy::too_many_arguments)]
impl Dispatcher {
    pub fn new(
        client_id: u16,
        interface_version: u8,
        tp_threshold: usize,
        reassembler: Arc<Reassembler>,
        correlator: Arc<Correlator>,
        sd: Arc<SdEngine>,
        notifications: Arc<NotificationRouter>,
        udp_sockets: Vec<Arc<UdpSocket>>,
        tcp_listeners: Vec<Arc<TcpListener>>,
        sd_v4: Option<SdSocket>,
        sd_v6: Option<SdSocket>,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            client_id,
            interface_version,
            tp_threshold,
            reassembler,
            correlator,
            sd,
            notifications,
            handlers: Mutex::new(HashMap::new()),
            udp_sockets,
            tcp_listeners,
            sd_v4,
            sd_v6,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        })
    }

    pub fn register_handler(&self, service_id: u16, handler: ServiceHandler) {
        self.handlers.lock().unwrap().insert(service_id, handler);
    }

    pub fn unregister_handler(&self, service_id: u16) {
        self.handlers.lock().unwrap().remove(&service_id);
    }

    /// Starts every reader task plus the single task that owns decode and
    /// routing, and returns their join handles so the caller can abort them
    /// all on `stop()`.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(sd_v4) = &self.sd_v4 {
            handles.push(spawn_udp_reader(sd_v4.socket.clone(), self.inbound_tx.clone(), true));
        }
        if let Some(sd_v6) = &self.sd_v6 {
            handles.push(spawn_udp_reader(sd_v6.socket.clone(), self.inbound_tx.clone(), false));
        }
        for socket in &self.udp_sockets {
            handles.push(spawn_service_udp_reader(socket.clone(), self.inbound_tx.clone()));
        }
        for listener in &self.tcp_listeners {
            handles.push(spawn_tcp_acceptor(listener.clone(), self.inbound_tx.clone()));
        }

        let rx = self.inbound_rx.lock().unwrap().take().expect("Dispatcher::spawn called more than once");
        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move { this.run(rx).await }));
        handles
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<InboundEvent>) {
        let mut sweep = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.reassembler.sweep();
                }
                event = rx.recv() => {
                    match event {
                        Some(InboundEvent::Sd { via_v4, data, source }) => {
                            let reply_socket = if via_v4 { self.sd_v4.as_ref() } else { self.sd_v6.as_ref() };
                            if let Some(reply_socket) = reply_socket {
                                self.sd.handle_datagram(&data, source, reply_socket).await;
                            }
                        }
                        Some(InboundEvent::Message { data, source, responder }) => {
                            self.handle_message(&data, source, responder).await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_message(&self, data: &[u8], source: SocketAddr, responder: Responder) {
        let message = match RawMessage::decode(data) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, %source, "dropping malformed SOME/IP message");
                return;
            }
        };
        if message.header.is_sd() {
            trace!(%source, "SD message arrived on a service socket, ignoring");
            return;
        }

        let header = message.header;
        let (payload, complete) = if header.message_type.is_tp() {
            match self.reassemble(&header, message.payload) {
                Ok(Some(payload)) => (payload, true),
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, service_id = header.service_id, "dropping malformed TP segment");
                    return;
                }
            }
        } else {
            (message.payload, true)
        };
        debug_assert!(complete);

        match header.message_type.kind() {
            MessageKind::Request | MessageKind::RequestNoReturn => {
                self.handle_request(header, payload, responder).await;
            }
            MessageKind::Response | MessageKind::Error => {
                let key = PendingKey {
                    service_id: header.service_id,
                    method_id: header.method_id,
                    session_id: header.session_id,
                };
                let reply = if header.message_type.kind() == MessageKind::Response {
                    Reply::Response(payload)
                } else {
                    Reply::Error(header.return_code)
                };
                self.correlator.complete(key, reply);
            }
            MessageKind::Notification => {
                self.handle_notification(header, payload, source);
            }
        }
    }

    fn reassemble(&self, header: &Header, segment_payload: Vec<u8>) -> Result<Option<Vec<u8>>, crate::wire::Error> {
        let tp_header = crate::wire::TpHeader::decode(&segment_payload)?;
        let chunk = segment_payload[crate::wire::TP_HEADER_SIZE..].to_vec();
        let key = AssemblyKey {
            service_id: header.service_id,
            method_id: header.method_id,
            client_id: header.client_id,
            session_id: header.session_id,
        };
        self.reassembler.insert(key, tp_header.offset, tp_header.more_segments, chunk)
    }

    async fn handle_request(&self, header: Header, payload: Vec<u8>, responder: Responder) {
        let wants_response = header.message_type.kind() == MessageKind::Request;
        let handler = self.handlers.lock().unwrap().get(&header.service_id).cloned();

        let Some(handler) = handler else {
            debug!(service_id = header.service_id, "request for a service with no registered handler");
            if wants_response {
                self.send_reply(
                    &header,
                    ReturnCode::UnknownService,
                    Vec::new(),
                    &responder,
                )
                .await;
            }
            return;
        };

        match handler(header.method_id, payload).await {
            Ok(response_payload) => {
                if wants_response {
                    let payload = response_payload.unwrap_or_default();
                    self.send_reply(&header, ReturnCode::Ok, payload, &responder).await;
                }
            }
            Err(err) => {
                warn!(error = %err, service_id = header.service_id, method_id = header.method_id, "request handler failed");
                if wants_response {
                    self.send_reply(&header, return_code_for_error(&err), Vec::new(), &responder).await;
                }
            }
        }
    }

    fn handle_notification(&self, header: Header, payload: Vec<u8>, source: SocketAddr) {
        let Some(eventgroup_id) = self.notifications.eventgroup_for(header.service_id, header.method_id) else {
            trace!(service_id = header.service_id, event_id = header.method_id, "notification for an event we never subscribed to, dropping");
            return;
        };
        if !self.sd.accepts_notification_from(header.service_id, eventgroup_id, source) {
            trace!(service_id = header.service_id, eventgroup_id, %source, "notification from an unacked or unexpected source, dropping");
            return;
        }
        if header.return_code != ReturnCode::Ok {
            warn!(service_id = header.service_id, return_code = ?header.return_code, "notification carries a non-OK return code");
        }
        self.notifications.deliver(header.service_id, eventgroup_id, header.method_id, payload);
    }

    /// Sends a RESPONSE or ERROR echoing the request's client/session id,
    /// segmenting via TP if the payload is larger than the threshold.
    async fn send_reply(&self, request_header: &Header, return_code: ReturnCode, payload: Vec<u8>, responder: &Responder) {
        let kind = if return_code == ReturnCode::Ok {
            MessageKind::Response
        } else {
            MessageKind::Error
        };
        if payload.len() <= self.tp_threshold {
            let header = Header {
                service_id: request_header.service_id,
                method_id: request_header.method_id,
                length: 0,
                client_id: request_header.client_id,
                session_id: request_header.session_id,
                interface_version: self.interface_version,
                message_type: MessageType::new(kind, false),
                return_code,
            };
            let message = RawMessage::new(header, payload);
            responder.reply(message.encode()).await;
            return;
        }

        for segment in tp::segment(&payload, self.tp_threshold) {
            let mut segment_payload = Vec::with_capacity(crate::wire::TP_HEADER_SIZE + segment.data.len());
            segment.header().encode(&mut segment_payload);
            segment_payload.extend_from_slice(&segment.data);

            let header = Header {
                service_id: request_header.service_id,
                method_id: request_header.method_id,
                length: 0,
                client_id: request_header.client_id,
                session_id: request_header.session_id,
                interface_version: self.interface_version,
                message_type: MessageType::new(kind, true),
                return_code,
            };
            let message = RawMessage::new(header, segment_payload);
            responder.reply(message.encode()).await;
        }
    }

    /// Exposed so the runtime façade can hand the SD engine an ephemeral
    /// client id consistent with every message this node emits.
    pub fn client_id(&self) -> u16 {
        self.client_id
    }
}

fn return_code_for_error(err: &Error) -> ReturnCode {
    match err {
        Error::UnknownService(_) => ReturnCode::UnknownService,
        Error::UnknownMethod { .. } => ReturnCode::UnknownMethod,
        _ => ReturnCode::NotOk,
    }
}

fn spawn_udp_reader(socket: Arc<UdpSocket>, tx: mpsc::UnboundedSender<InboundEvent>, via_v4: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, source)) => {
                    let data = buf[..len].to_vec();
                    if tx.send(InboundEvent::Sd { via_v4, data, source }).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "SD socket read failed");
                    break;
                }
            }
        }
    })
}

fn spawn_service_udp_reader(socket: Arc<UdpSocket>, tx: mpsc::UnboundedSender<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, source)) => {
                    let data = buf[..len].to_vec();
                    let responder = Responder::Udp(socket.clone(), source);
                    if tx.send(InboundEvent::Message { data, source, responder }).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "service socket read failed");
                    break;
                }
            }
        }
    })
}

fn spawn_tcp_acceptor(listener: Arc<TcpListener>, tx: mpsc::UnboundedSender<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, source)) => {
                    spawn_tcp_connection(stream, source, tx.clone());
                }
                Err(err) => {
                    warn!(error = %err, "TCP accept failed");
                    break;
                }
            }
        }
    })
}

/// One connection gets a reader task (frames inbound messages) and a writer
/// task (drains an mpsc of outbound frames); the reader hands the writer's
/// sender to the dispatcher as that connection's `Responder`, so replies
/// never need to re-acquire the stream.
fn spawn_tcp_connection(stream: tokio::net::TcpStream, source: SocketAddr, tx: mpsc::UnboundedSender<InboundEvent>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(buf) = writer_rx.recv().await {
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut header_buf = [0u8; HEADER_SIZE];
        loop {
            if read_half.read_exact(&mut header_buf).await.is_err() {
                break;
            }
            let header = match Header::decode(&header_buf) {
                Ok(header) => header,
                Err(err) => {
                    warn!(error = %err, %source, "dropping malformed TCP frame header");
                    break;
                }
            };
            let mut payload = vec![0u8; header.payload_size()];
            if !payload.is_empty() && read_half.read_exact(&mut payload).await.is_err() {
                break;
            }

            let mut frame = header_buf.to_vec();
            frame.extend_from_slice(&payload);
            let responder = Responder::Tcp(writer_tx.clone());
            if tx
                .send(InboundEvent::Message { data: frame, source, responder })
                .is_err()
            {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;

    async fn udp_pair() -> (Arc<UdpSocket>, Arc<UdpSocket>) {
        (
            Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()),
            Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()),
        )
    }

    fn build_dispatcher(udp_sockets: Vec<Arc<UdpSocket>>) -> Arc<Dispatcher> {
        let session = Arc::new(SessionManager::new());
        let correlator = Arc::new(Correlator::new());
        let sd = Arc::new(SdEngine::new(session, None, None, Duration::from_secs(1), 0x4242));
        let notifications = Arc::new(NotificationRouter::default());
        Dispatcher::new(
            0x4242,
            1,
            1392,
            Arc::new(Reassembler::new(Duration::from_secs(5))),
            correlator,
            sd,
            notifications,
            udp_sockets,
            Vec::new(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn unknown_service_gets_an_error_response() {
        let (server, client) = udp_pair().await;
        let server_addr = server.local_addr().unwrap();
        let dispatcher = build_dispatcher(vec![server]);
        let _handles = dispatcher.spawn();

        let header = Header {
            service_id: 0x9999,
            method_id: 0x0001,
            length: 0,
            client_id: 0x1,
            session_id: 1,
            interface_version: 1,
            message_type: MessageType::new(MessageKind::Request, false),
            return_code: ReturnCode::Ok,
        };
        let message = RawMessage::new(header, vec![]);
        client.send_to(&message.encode(), server_addr).await.unwrap();

        let mut buf = vec![0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = RawMessage::decode(&buf[..len]).unwrap();
        assert_eq!(reply.header.message_type.kind(), MessageKind::Error);
        assert_eq!(reply.header.return_code, ReturnCode::UnknownService);
        assert_eq!(reply.header.session_id, 1);
    }

    #[tokio::test]
    async fn registered_handler_answers_with_a_response() {
        let (server, client) = udp_pair().await;
        let server_addr = server.local_addr().unwrap();
        let dispatcher = build_dispatcher(vec![server]);
        dispatcher.register_handler(
            0x1001,
            Arc::new(|_method, payload: Vec<u8>| Box::pin(async move { Ok(Some(payload)) })),
        );
        let _handles = dispatcher.spawn();

        let header = Header {
            service_id: 0x1001,
            method_id: 0x0001,
            length: 0,
            client_id: 0x1,
            session_id: 7,
            interface_version: 1,
            message_type: MessageType::new(MessageKind::Request, false),
            return_code: ReturnCode::Ok,
        };
        let message = RawMessage::new(header, vec![1, 2, 3, 4]);
        client.send_to(&message.encode(), server_addr).await.unwrap();

        let mut buf = vec![0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = RawMessage::decode(&buf[..len]).unwrap();
        assert_eq!(reply.header.message_type.kind(), MessageKind::Response);
        assert_eq!(reply.header.session_id, 7);
        assert_eq!(reply.payload, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn request_no_return_gets_no_reply() {
        let (server, client) = udp_pair().await;
        let server_addr = server.local_addr().unwrap();
        let dispatcher = build_dispatcher(vec![server]);
        dispatcher.register_handler(0x1001, Arc::new(|_m, payload: Vec<u8>| Box::pin(async move { Ok(Some(payload)) })));
        let _handles = dispatcher.spawn();

        let header = Header {
            service_id: 0x1001,
            method_id: 0x0001,
            length: 0,
            client_id: 0x1,
            session_id: 9,
            interface_version: 1,
            message_type: MessageType::new(MessageKind::RequestNoReturn, false),
            return_code: ReturnCode::Ok,
        };
        let message = RawMessage::new(header, vec![9, 9]);
        client.send_to(&message.encode(), server_addr).await.unwrap();

        let mut buf = vec![0u8; 256];
        let result = tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(result.is_err(), "REQUEST_NO_RETURN must not produce a reply");
    }

    fn build_dispatcher_with_tcp(tcp_listeners: Vec<Arc<TcpListener>>) -> Arc<Dispatcher> {
        let session = Arc::new(SessionManager::new());
        let correlator = Arc::new(Correlator::new());
        let sd = Arc::new(SdEngine::new(session, None, None, Duration::from_secs(1), 0x4242));
        let notifications = Arc::new(NotificationRouter::default());
        Dispatcher::new(
            0x4242,
            1,
            1392,
            Arc::new(Reassembler::new(Duration::from_secs(5))),
            correlator,
            sd,
            notifications,
            Vec::new(),
            tcp_listeners,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn registered_handler_answers_a_tcp_request_carrying_a_payload() {
        use tokio::net::TcpStream;

        let listener = Arc::new(TcpListener::bind("127.0.0.1:0").await.unwrap());
        let server_addr = listener.local_addr().unwrap();
        let dispatcher = build_dispatcher_with_tcp(vec![listener]);
        dispatcher.register_handler(
            0x1001,
            Arc::new(|_method, payload: Vec<u8>| Box::pin(async move { Ok(Some(payload)) })),
        );
        let _handles = dispatcher.spawn();

        let mut stream = TcpStream::connect(server_addr).await.unwrap();
        let header = Header {
            service_id: 0x1001,
            method_id: 0x0001,
            length: 0,
            client_id: 0x1,
            session_id: 3,
            interface_version: 1,
            message_type: MessageType::new(MessageKind::Request, false),
            return_code: ReturnCode::Ok,
        };
        let message = RawMessage::new(header, vec![1, 2, 3, 4, 5, 6]);
        stream.write_all(&message.encode()).await.unwrap();

        let mut header_buf = [0u8; HEADER_SIZE];
        tokio::time::timeout(Duration::from_secs(1), stream.read_exact(&mut header_buf))
            .await
            .unwrap()
            .unwrap();
        let reply_header = Header::decode(&header_buf).unwrap();
        let mut payload = vec![0u8; reply_header.payload_size()];
        stream.read_exact(&mut payload).await.unwrap();

        assert_eq!(reply_header.message_type.kind(), MessageKind::Response);
        assert_eq!(reply_header.session_id, 3);
        assert_eq!(payload, vec![1, 2, 3, 4, 5, 6]);
    }
}
