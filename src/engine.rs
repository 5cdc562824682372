//! The client engine task.
//!
//! A single task owns every piece of mutable connection state: the
//! connection state machine, the pending-request tables, the keep-alive
//! timers and the packet-id counter. All transitions are driven by one
//! inbox fed from three sources - user commands, channel events and timer
//! expiry - so there is no locking anywhere; correctness reduces to
//! exhaustive case handling per state.
//!
//! ```text
//! Client ──► mpsc::Sender<Command> ─┐
//!                                   ├─► Engine ─► FramedChannel ─► peer
//! FramedChannel events ─────────────┤      │
//! tokio::time::sleep_until ─────────┘      └─► Updates stream
//! ```
//!
//! Each state variant owns exactly the resources valid for that phase:
//! no channel when `NotConnected`, no keep-alive timer while `Connecting`,
//! and in `Connected` exactly one of the ping / server-timeout deadlines is
//! armed at any moment.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::client::{ConnectionStatus, Subscription, Update};
use crate::codec::{
    ConnectReturnCode, IncomingPacket, Message, OutgoingPacket, Publish, QoS, SubscribeRequest,
    SubscribeResult,
};
use crate::error::{
    ChannelError, ConnectError, PublishError, SubscribeError, UnsubscribeError,
};
use crate::framed::{FramedChannel, FramedEvent};
use crate::options::ConnectOptions;
use crate::transport::Transport;

/// Requests posted by [`Client`](crate::Client) handles.
pub(crate) enum Command {
    Connect {
        timeout: Duration,
        reply: oneshot::Sender<Result<bool, ConnectError>>,
    },
    Publish {
        publish: Publish,
        reply: oneshot::Sender<Result<(), PublishError>>,
    },
    Subscribe {
        topics: Vec<SubscribeRequest>,
        reply: oneshot::Sender<Result<Vec<Subscription>, SubscribeError>>,
    },
    Unsubscribe {
        filters: Vec<String>,
        reply: oneshot::Sender<Result<(), UnsubscribeError>>,
    },
    Disconnect,
}

/// Connection lifecycle. Variants own the resources valid for their phase.
enum ConnectionState {
    NotConnected,
    Connecting {
        channel: FramedChannel,
        reply: oneshot::Sender<Result<bool, ConnectError>>,
        deadline: Instant,
    },
    Connected {
        channel: FramedChannel,
        keep_alive: KeepAliveState,
    },
}

/// Keep-alive discipline while connected: either the next ping is
/// scheduled, or a ping is in flight and the server is on the clock.
enum KeepAliveState {
    Idle { ping_at: Instant },
    AwaitingPingResp { sent_at: Instant, abort_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    ConnectTimeout,
    Ping,
    ServerTimeout,
}

impl ConnectionState {
    fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        match self {
            Self::NotConnected => None,
            Self::Connecting { deadline, .. } => Some((*deadline, TimerKind::ConnectTimeout)),
            Self::Connected {
                keep_alive: KeepAliveState::Idle { ping_at },
                ..
            } => Some((*ping_at, TimerKind::Ping)),
            Self::Connected {
                keep_alive: KeepAliveState::AwaitingPingResp { abort_at, .. },
                ..
            } => Some((*abort_at, TimerKind::ServerTimeout)),
        }
    }
}

/// A subscribe request waiting for its SUBACK.
struct PendingSubscription {
    topics: Vec<SubscribeRequest>,
    reply: oneshot::Sender<Result<Vec<Subscription>, SubscribeError>>,
}

/// Acknowledgment a QoS>0 publish is waiting on.
enum PublishPhase {
    AwaitingPubAck,
    AwaitingPubRec,
    AwaitingPubComp,
}

/// Outbound publish not yet fully acknowledged. The stored packet is the
/// seam for a future redelivery/persistence layer; today the table is
/// dropped whenever the connection ends.
struct InflightPublish {
    publish: Publish,
    phase: PublishPhase,
}

enum Tick {
    Command(Option<Command>),
    Event(FramedEvent),
    Timer(TimerKind),
}

pub(crate) struct Engine {
    options: ConnectOptions,
    transport: Box<dyn Transport>,
    inbox: mpsc::Receiver<Command>,
    updates: mpsc::UnboundedSender<Update>,
    state: ConnectionState,
    pending_subs: HashMap<u16, PendingSubscription>,
    pending_unsubs: HashMap<u16, oneshot::Sender<Result<(), UnsubscribeError>>>,
    outgoing_pub: HashMap<u16, InflightPublish>,
    inbound_qos2: HashSet<u16>,
    next_packet_id: u16,
}

impl Engine {
    pub(crate) fn new(
        options: ConnectOptions,
        transport: Box<dyn Transport>,
        inbox: mpsc::Receiver<Command>,
        updates: mpsc::UnboundedSender<Update>,
    ) -> Self {
        Self {
            options,
            transport,
            inbox,
            updates,
            state: ConnectionState::NotConnected,
            pending_subs: HashMap::new(),
            pending_unsubs: HashMap::new(),
            outgoing_pub: HashMap::new(),
            inbound_qos2: HashSet::new(),
            next_packet_id: 1,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(client_id = %self.options.client_id, "client engine started");
        loop {
            let timer = self.state.next_deadline();
            let wake_at = timer.map(|(at, _)| at).unwrap_or_else(far_future);

            let tick = tokio::select! {
                command = self.inbox.recv() => Tick::Command(command),
                event = channel_event(&mut self.state) => Tick::Event(event),
                _ = sleep_until(wake_at), if timer.is_some() => {
                    // The guard makes this unreachable when timer is None.
                    Tick::Timer(timer.map(|(_, kind)| kind).unwrap_or(TimerKind::Ping))
                }
            };

            match tick {
                Tick::Command(Some(command)) => self.handle_command(command).await,
                Tick::Command(None) => {
                    debug!("all client handles dropped; engine shutting down");
                    self.teardown(ConnectError::Killed, None).await;
                    break;
                }
                Tick::Event(event) => self.handle_channel_event(event).await,
                Tick::Timer(kind) => self.handle_timer(kind).await,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { timeout, reply } => self.on_connect(timeout, reply).await,
            Command::Publish { publish, reply } => self.on_user_publish(publish, reply).await,
            Command::Subscribe { topics, reply } => self.on_user_subscribe(topics, reply).await,
            Command::Unsubscribe { filters, reply } => {
                self.on_user_unsubscribe(filters, reply).await
            }
            Command::Disconnect => self.on_user_disconnect().await,
        }
    }

    async fn on_connect(
        &mut self,
        timeout: Duration,
        reply: oneshot::Sender<Result<bool, ConnectError>>,
    ) {
        if !matches!(self.state, ConnectionState::NotConnected) {
            let _ = reply.send(Err(ConnectError::AlreadyConnected));
            return;
        }

        debug!("opening transport");
        let channel = match self.transport.open().await {
            Ok(channel) => FramedChannel::new(channel),
            Err(err) => {
                warn!(error = %err, "transport open failed");
                self.emit(Update::ConnectionStateChanged(ConnectionStatus::ConnectFailed(
                    err.to_string(),
                )));
                let _ = reply.send(Err(ConnectError::Transport(err)));
                return;
            }
        };

        let mut channel = channel;
        let connect = OutgoingPacket::Connect {
            client_id: self.options.client_id.clone(),
            keep_alive_seconds: self.options.keep_alive_seconds(),
        };
        match channel.send(&connect).await {
            Ok(()) => {
                self.state = ConnectionState::Connecting {
                    channel,
                    reply,
                    deadline: Instant::now() + timeout,
                };
            }
            Err(err) => {
                error!(error = %err, "CONNECT send failed");
                channel.shutdown().await;
                self.emit(Update::ConnectionStateChanged(ConnectionStatus::ConnectFailed(
                    err.to_string(),
                )));
                let _ = reply.send(Err(ConnectError::Transport(err)));
            }
        }
    }

    async fn on_user_publish(
        &mut self,
        mut publish: Publish,
        reply: oneshot::Sender<Result<(), PublishError>>,
    ) {
        if matches!(self.state, ConnectionState::NotConnected) {
            let _ = reply.send(Err(PublishError::NotConnected));
            return;
        }

        if publish.message.qos != QoS::AtMostOnce && publish.packet_id.is_none() {
            publish.packet_id = Some(self.reserve_packet_id());
        }

        match self.send_packet(&OutgoingPacket::Publish(publish.clone())).await {
            Ok(()) => {
                if let Some(id) = publish.id() {
                    let phase = match publish.message.qos {
                        QoS::AtLeastOnce => PublishPhase::AwaitingPubAck,
                        _ => PublishPhase::AwaitingPubRec,
                    };
                    self.outgoing_pub.insert(id, InflightPublish { publish, phase });
                }
                let _ = reply.send(Ok(()));
            }
            Err(err) => {
                let _ = reply.send(Err(PublishError::Channel(err)));
            }
        }
    }

    async fn on_user_subscribe(
        &mut self,
        topics: Vec<SubscribeRequest>,
        reply: oneshot::Sender<Result<Vec<Subscription>, SubscribeError>>,
    ) {
        if !matches!(self.state, ConnectionState::Connected { .. }) {
            let _ = reply.send(Err(SubscribeError::NotConnected));
            return;
        }

        let packet_id = self.reserve_packet_id();
        let packet = OutgoingPacket::Subscribe {
            packet_id,
            topics: topics.clone(),
        };
        match self.send_packet(&packet).await {
            Ok(()) => {
                debug!(packet_id, count = topics.len(), "subscribe in flight");
                self.pending_subs
                    .insert(packet_id, PendingSubscription { topics, reply });
            }
            Err(err) => {
                let _ = reply.send(Err(SubscribeError::Channel(err)));
            }
        }
    }

    async fn on_user_unsubscribe(
        &mut self,
        filters: Vec<String>,
        reply: oneshot::Sender<Result<(), UnsubscribeError>>,
    ) {
        if !matches!(self.state, ConnectionState::Connected { .. }) {
            let _ = reply.send(Err(UnsubscribeError::NotConnected));
            return;
        }

        let packet_id = self.reserve_packet_id();
        let packet = OutgoingPacket::Unsubscribe { packet_id, filters };
        match self.send_packet(&packet).await {
            Ok(()) => {
                self.pending_unsubs.insert(packet_id, reply);
            }
            Err(err) => {
                let _ = reply.send(Err(UnsubscribeError::Channel(err)));
            }
        }
    }

    async fn on_user_disconnect(&mut self) {
        match mem::replace(&mut self.state, ConnectionState::NotConnected) {
            ConnectionState::NotConnected => {}
            ConnectionState::Connecting {
                mut channel, reply, ..
            } => {
                debug!("disconnect requested during connect");
                let _ = reply.send(Err(ConnectError::DisconnectRequested));
                channel.shutdown().await;
                self.drop_connection_state(None);
            }
            ConnectionState::Connected { mut channel, .. } => {
                debug!("disconnect requested");
                if let Err(err) = channel.send(&OutgoingPacket::Disconnect).await {
                    debug!(error = %err, "DISCONNECT send failed");
                }
                channel.shutdown().await;
                self.drop_connection_state(None);
            }
        }
    }

    async fn handle_channel_event(&mut self, event: FramedEvent) {
        match event {
            FramedEvent::Packets(packets) => {
                for packet in packets {
                    self.handle_packet(packet).await;
                    if matches!(self.state, ConnectionState::NotConnected) {
                        break;
                    }
                }
            }
            FramedEvent::DecodeFailed(err) => {
                error!(error = %err, "malformed inbound data");
                let info = format!("decode error: {err}");
                self.teardown(transport_error(&info), Some(info)).await;
            }
            FramedEvent::Closed => {
                debug!("channel closed by peer");
                self.teardown(transport_error("channel closed"), Some("channel closed".into()))
                    .await;
            }
            FramedEvent::Error(info) => {
                error!(%info, "channel error");
                self.teardown(transport_error(&info), Some(info)).await;
            }
        }
    }

    async fn handle_packet(&mut self, packet: IncomingPacket) {
        // Before CONNACK the server may send nothing else.
        if matches!(self.state, ConnectionState::Connecting { .. })
            && !matches!(packet, IncomingPacket::ConnAck { .. })
        {
            self.protocol_violation("unexpected packet before CONNACK").await;
            return;
        }

        match packet {
            IncomingPacket::ConnAck {
                session_present,
                result,
            } => self.on_connack(session_present, result).await,
            IncomingPacket::Publish(publish) => self.on_publish(publish).await,
            IncomingPacket::PubAck(id) => self.on_puback(id),
            IncomingPacket::PubRec(id) => self.on_pubrec(id).await,
            IncomingPacket::PubRel(id) => self.on_pubrel(id).await,
            IncomingPacket::PubComp(id) => self.on_pubcomp(id),
            IncomingPacket::SubAck { packet_id, results } => {
                self.on_suback(packet_id, results).await
            }
            IncomingPacket::UnsubAck(id) => self.on_unsuback(id).await,
            IncomingPacket::PingResp => self.on_pingresp(),
        }
    }

    async fn on_connack(
        &mut self,
        session_present: bool,
        result: Result<(), ConnectReturnCode>,
    ) {
        match mem::replace(&mut self.state, ConnectionState::NotConnected) {
            ConnectionState::Connecting { channel, reply, .. } => match result {
                Ok(()) => {
                    debug!(session_present, "connection accepted");
                    self.state = ConnectionState::Connected {
                        channel,
                        keep_alive: KeepAliveState::Idle {
                            ping_at: Instant::now() + self.options.keep_alive,
                        },
                    };
                    self.emit(Update::ConnectionStateChanged(
                        ConnectionStatus::ConnectAccepted { session_present },
                    ));
                    let _ = reply.send(Ok(session_present));
                }
                Err(code) => {
                    let error = ConnectError::from(code);
                    warn!(error = %error, "connection refused");
                    let mut channel = channel;
                    channel.shutdown().await;
                    self.emit(Update::ConnectionStateChanged(
                        ConnectionStatus::ConnectFailed(error.to_string()),
                    ));
                    self.drop_connection_state(None);
                    let _ = reply.send(Err(error));
                }
            },
            state => {
                self.state = state;
                self.protocol_violation("CONNACK outside connect handshake").await;
            }
        }
    }

    async fn on_publish(&mut self, publish: Publish) {
        let Publish {
            message,
            packet_id,
            ..
        } = publish;
        match message.qos {
            QoS::AtMostOnce => self.emit_message(message),
            QoS::AtLeastOnce => {
                let Some(id) = packet_id else {
                    return self.protocol_violation("QoS 1 PUBLISH without packet id").await;
                };
                self.emit_message(message);
                if let Err(err) = self.send_packet(&OutgoingPacket::PubAck(id)).await {
                    warn!(error = %err, id, "PUBACK send failed");
                }
            }
            QoS::ExactlyOnce => {
                let Some(id) = packet_id else {
                    return self.protocol_violation("QoS 2 PUBLISH without packet id").await;
                };
                // Deliver once: a repeat of an id still awaiting PUBREL is
                // the server retransmitting.
                if self.inbound_qos2.insert(id) {
                    self.emit_message(message);
                } else {
                    debug!(id, "suppressed duplicate QoS 2 publish");
                }
                if let Err(err) = self.send_packet(&OutgoingPacket::PubRec(id)).await {
                    warn!(error = %err, id, "PUBREC send failed");
                }
            }
        }
    }

    fn on_puback(&mut self, id: u16) {
        let known = matches!(
            self.outgoing_pub.get(&id),
            Some(InflightPublish {
                phase: PublishPhase::AwaitingPubAck,
                ..
            })
        );
        if known {
            self.outgoing_pub.remove(&id);
        } else {
            warn!(id, "PUBACK for unknown publish");
        }
    }

    async fn on_pubrec(&mut self, id: u16) {
        let known = matches!(
            self.outgoing_pub.get(&id),
            Some(InflightPublish {
                phase: PublishPhase::AwaitingPubRec,
                ..
            })
        );
        if !known {
            warn!(id, "PUBREC for unknown publish");
            return;
        }
        if let Some(inflight) = self.outgoing_pub.get_mut(&id) {
            inflight.phase = PublishPhase::AwaitingPubComp;
        }
        if let Err(err) = self.send_packet(&OutgoingPacket::PubRel(id)).await {
            warn!(error = %err, id, "PUBREL send failed");
        }
    }

    async fn on_pubrel(&mut self, id: u16) {
        if !self.inbound_qos2.remove(&id) {
            warn!(id, "PUBREL for unknown packet id");
        }
        if let Err(err) = self.send_packet(&OutgoingPacket::PubComp(id)).await {
            warn!(error = %err, id, "PUBCOMP send failed");
        }
    }

    fn on_pubcomp(&mut self, id: u16) {
        let known = matches!(
            self.outgoing_pub.get(&id),
            Some(InflightPublish {
                phase: PublishPhase::AwaitingPubComp,
                ..
            })
        );
        if known {
            self.outgoing_pub.remove(&id);
        } else {
            warn!(id, "PUBCOMP for unknown publish");
        }
    }

    async fn on_suback(&mut self, packet_id: u16, results: Vec<SubscribeResult>) {
        let Some(pending) = self.pending_subs.remove(&packet_id) else {
            return self.protocol_violation("SUBACK for unknown packet id").await;
        };
        if pending.topics.len() != results.len() {
            // The dropped reply wakes the caller; the mismatch kills the
            // connection.
            return self.protocol_violation("SUBACK result count mismatch").await;
        }

        let subscriptions = pending
            .topics
            .into_iter()
            .zip(results)
            .map(|(request, result)| match result {
                SubscribeResult::Success(qos) => Subscription::Granted {
                    filter: request.filter,
                    qos,
                },
                SubscribeResult::Failure => Subscription::Rejected {
                    filter: request.filter,
                },
            })
            .collect();
        let _ = pending.reply.send(Ok(subscriptions));
    }

    async fn on_unsuback(&mut self, id: u16) {
        match self.pending_unsubs.remove(&id) {
            Some(reply) => {
                let _ = reply.send(Ok(()));
            }
            None => self.protocol_violation("UNSUBACK for unknown packet id").await,
        }
    }

    fn on_pingresp(&mut self) {
        if let ConnectionState::Connected { keep_alive, .. } = &mut self.state {
            match keep_alive {
                KeepAliveState::AwaitingPingResp { sent_at, .. } => {
                    // Next ping is due one keep-alive interval after the
                    // request that was just answered.
                    let ping_at = *sent_at + self.options.keep_alive;
                    *keep_alive = KeepAliveState::Idle { ping_at };
                }
                KeepAliveState::Idle { .. } => warn!("unsolicited PINGRESP"),
            }
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ConnectTimeout => {
                if let ConnectionState::Connecting {
                    mut channel, reply, ..
                } = mem::replace(&mut self.state, ConnectionState::NotConnected)
                {
                    warn!("no CONNACK within the connect timeout");
                    channel.shutdown().await;
                    self.emit(Update::ConnectionStateChanged(
                        ConnectionStatus::ConnectFailed("connect timed out".into()),
                    ));
                    self.drop_connection_state(None);
                    let _ = reply.send(Err(ConnectError::Timeout));
                }
            }
            TimerKind::Ping => {
                let sent_at = Instant::now();
                match self.send_packet(&OutgoingPacket::PingReq).await {
                    Ok(()) => {
                        debug!("ping sent");
                        if let ConnectionState::Connected { keep_alive, .. } = &mut self.state {
                            *keep_alive = KeepAliveState::AwaitingPingResp {
                                sent_at,
                                abort_at: sent_at + self.options.server_timeout,
                            };
                        }
                    }
                    Err(err) => {
                        // A failed ping means the connection is already gone.
                        error!(error = %err, "PINGREQ send failed");
                        let info = format!("ping send failed: {err}");
                        self.teardown(transport_error(&info), Some(info)).await;
                    }
                }
            }
            TimerKind::ServerTimeout => {
                warn!("no PINGRESP within the server timeout");
                self.teardown(
                    transport_error("ping response timed out"),
                    Some("ping response timed out".into()),
                )
                .await;
            }
        }
    }

    /// Send a packet on the current channel, postponing the next ping on
    /// success.
    async fn send_packet(&mut self, packet: &OutgoingPacket) -> Result<(), ChannelError> {
        let channel = match &mut self.state {
            ConnectionState::Connecting { channel, .. }
            | ConnectionState::Connected { channel, .. } => channel,
            ConnectionState::NotConnected => {
                return Err(ChannelError::SendFailed("not connected".into()))
            }
        };
        channel.send(packet).await?;

        if let ConnectionState::Connected {
            keep_alive: keep_alive @ KeepAliveState::Idle { .. },
            ..
        } = &mut self.state
        {
            *keep_alive = KeepAliveState::Idle {
                ping_at: Instant::now() + self.options.keep_alive,
            };
        }
        Ok(())
    }

    /// Kill the connection from an engine-detected failure.
    async fn teardown(&mut self, waiter_error: ConnectError, reason: Option<String>) {
        match mem::replace(&mut self.state, ConnectionState::NotConnected) {
            ConnectionState::NotConnected => {}
            ConnectionState::Connecting {
                mut channel, reply, ..
            } => {
                let info = reason
                    .clone()
                    .unwrap_or_else(|| waiter_error.to_string());
                channel.shutdown().await;
                self.emit(Update::ConnectionStateChanged(
                    ConnectionStatus::ConnectFailed(info),
                ));
                self.drop_connection_state(reason);
                let _ = reply.send(Err(waiter_error));
            }
            ConnectionState::Connected { mut channel, .. } => {
                channel.shutdown().await;
                self.drop_connection_state(reason);
            }
        }
    }

    async fn protocol_violation(&mut self, what: &str) {
        error!(what, "protocol violation; disconnecting");
        self.teardown(transport_error(what), Some(what.to_string())).await;
    }

    /// Clear per-connection tables and announce the disconnect.
    ///
    /// Dropping the pending reply halves wakes their callers with
    /// `Killed`-class errors. Unacknowledged publishes and half-done QoS 2
    /// receives are discarded; a persistence layer would hook in here.
    fn drop_connection_state(&mut self, reason: Option<String>) {
        for (id, inflight) in self.outgoing_pub.drain() {
            debug!(id, topic = %inflight.publish.message.topic, "dropping unacknowledged publish");
        }
        self.inbound_qos2.clear();
        self.pending_subs.clear();
        self.pending_unsubs.clear();
        self.emit(Update::ConnectionStateChanged(ConnectionStatus::Disconnected {
            reason,
        }));
    }

    /// Next free packet identifier: wraps at 65535, never 0, never an id
    /// that is still correlated to an outstanding exchange.
    fn reserve_packet_id(&mut self) -> u16 {
        loop {
            let id = self.next_packet_id;
            self.next_packet_id = if id == u16::MAX { 1 } else { id + 1 };
            if !self.id_in_flight(id) {
                return id;
            }
        }
    }

    fn id_in_flight(&self, id: u16) -> bool {
        self.pending_subs.contains_key(&id)
            || self.pending_unsubs.contains_key(&id)
            || self.outgoing_pub.contains_key(&id)
            || self.inbound_qos2.contains(&id)
    }

    fn emit_message(&self, message: Message) {
        self.emit(Update::ReceivedMessage {
            topic: message.topic,
            payload: message.payload,
            retained: message.retain,
        });
    }

    fn emit(&self, update: Update) {
        let _ = self.updates.send(update);
    }
}

async fn channel_event(state: &mut ConnectionState) -> FramedEvent {
    match state {
        ConnectionState::NotConnected => std::future::pending().await,
        ConnectionState::Connecting { channel, .. }
        | ConnectionState::Connected { channel, .. } => channel.recv().await,
    }
}

fn transport_error(info: &str) -> ConnectError {
    ConnectError::Transport(ChannelError::TransportError(info.to_string()))
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct NoTransport;

    impl Transport for NoTransport {
        fn open(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<crate::transport::Channel, ChannelError>> + Send + '_>>
        {
            Box::pin(async { Err(ChannelError::TransportError("no transport".into())) })
        }
    }

    fn test_engine() -> Engine {
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let (upd_tx, _upd_rx) = mpsc::unbounded_channel();
        Engine::new(
            ConnectOptions::new("test"),
            Box::new(NoTransport),
            cmd_rx,
            upd_tx,
        )
    }

    #[tokio::test]
    async fn test_packet_ids_start_at_one_and_increment() {
        let mut engine = test_engine();
        assert_eq!(engine.reserve_packet_id(), 1);
        assert_eq!(engine.reserve_packet_id(), 2);
        assert_eq!(engine.reserve_packet_id(), 3);
    }

    #[tokio::test]
    async fn test_packet_ids_skip_in_flight_entries() {
        let mut engine = test_engine();
        let (reply, _rx) = oneshot::channel();
        engine.pending_subs.insert(
            1,
            PendingSubscription {
                topics: vec![],
                reply,
            },
        );
        engine.inbound_qos2.insert(2);
        assert_eq!(engine.reserve_packet_id(), 3);
    }

    #[tokio::test]
    async fn test_packet_ids_wrap_and_never_hit_zero() {
        let mut engine = test_engine();
        engine.next_packet_id = u16::MAX;
        assert_eq!(engine.reserve_packet_id(), u16::MAX);
        assert_eq!(engine.reserve_packet_id(), 1);
    }

    #[tokio::test]
    async fn test_deadline_follows_state() {
        let engine = test_engine();
        assert!(engine.state.next_deadline().is_none());

        let now = Instant::now();
        let state = ConnectionState::Connected {
            channel: FramedChannel::new(crate::transport::Channel::from_stream(
                tokio::io::duplex(64).0,
            )),
            keep_alive: KeepAliveState::Idle {
                ping_at: now + Duration::from_secs(1),
            },
        };
        assert_eq!(
            state.next_deadline(),
            Some((now + Duration::from_secs(1), TimerKind::Ping))
        );

        let state = ConnectionState::Connected {
            channel: FramedChannel::new(crate::transport::Channel::from_stream(
                tokio::io::duplex(64).0,
            )),
            keep_alive: KeepAliveState::AwaitingPingResp {
                sent_at: now,
                abort_at: now + Duration::from_millis(500),
            },
        };
        assert_eq!(
            state.next_deadline(),
            Some((now + Duration::from_millis(500), TimerKind::ServerTimeout))
        );
    }
}
