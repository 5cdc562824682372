//! Client handle and update stream.
//!
//! [`Client::start`] spawns the engine task and hands back a cheaply
//! cloneable [`Client`] plus the [`Updates`] stream. Every operation is a
//! request/reply exchange with the engine: the call posts a command
//! carrying a `oneshot` reply channel and waits on it under its own
//! timeout.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mqttwire::{Client, ConnectOptions, QoS, SubscribeRequest, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectOptions::new("sensor-7").keep_alive(Duration::from_secs(30));
//!     let (client, mut updates) = Client::start(options, TransportOptions::tcp("localhost", 1883));
//!
//!     let session_present = client.connect(Duration::from_secs(5)).await?;
//!     assert!(!session_present); // clean sessions only
//!
//!     client
//!         .subscribe(
//!             vec![SubscribeRequest::new("sensors/#", QoS::AtLeastOnce)],
//!             Duration::from_secs(5),
//!         )
//!         .await?;
//!
//!     while let Some(update) = updates.recv().await {
//!         println!("{update:?}");
//!     }
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::codec::{Publish, QoS, SubscribeRequest};
use crate::engine::{Command, Engine};
use crate::error::{
    ConnectError, PublishError, SubscribeError, UnsubscribeError,
};
use crate::options::{ConnectOptions, TransportOptions};
use crate::transport::Transport;

/// Commands the engine inbox buffers before callers are pushed back.
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    ConnectionStateChanged(ConnectionStatus),
    /// An application message arrived on a subscribed topic.
    ReceivedMessage {
        topic: String,
        payload: Bytes,
        retained: bool,
    },
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The server accepted the connect handshake.
    ConnectAccepted { session_present: bool },
    /// The connect attempt failed before reaching the connected state.
    ConnectFailed(String),
    /// The connection ended; `reason` is set when the engine killed it.
    Disconnected { reason: Option<String> },
}

/// Per-filter result of a subscribe call, aligned 1-1 with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Granted, possibly at a lower QoS than requested.
    Granted { filter: String, qos: QoS },
    /// The server refused this filter.
    Rejected { filter: String },
}

/// Receiving half of the update stream.
///
/// The engine is the sole producer; dropping this stream does not stop the
/// engine, it only discards further updates.
pub struct Updates {
    rx: mpsc::UnboundedReceiver<Update>,
}

impl Updates {
    /// Next update, or `None` once the engine task has exited.
    pub async fn recv(&mut self) -> Option<Update> {
        self.rx.recv().await
    }
}

/// Handle to a running client engine.
///
/// Clones share the same engine. The engine shuts down when every handle
/// has been dropped.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
}

impl Client {
    /// Spawn an engine over one of the built-in transports.
    pub fn start(options: ConnectOptions, transport: TransportOptions) -> (Client, Updates) {
        Self::start_with_transport(options, transport.into_transport())
    }

    /// Spawn an engine over a caller-supplied transport (TLS, WebSocket,
    /// in-memory test pipes).
    pub fn start_with_transport(
        options: ConnectOptions,
        transport: Box<dyn Transport>,
    ) -> (Client, Updates) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        tokio::spawn(Engine::new(options, transport, cmd_rx, update_tx).run());

        (Client { commands: cmd_tx }, Updates { rx: update_rx })
    }

    /// Open the connection and run the MQTT handshake.
    ///
    /// Resolves with the server-reported `session_present` flag (always
    /// `false` here, since every session is clean). On timeout the engine
    /// is told to abandon the attempt.
    pub async fn connect(&self, timeout: Duration) -> Result<bool, ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { timeout, reply })
            .await
            .map_err(|_| ConnectError::Killed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectError::Killed),
            Err(_) => {
                // The engine keeps its own deadline; this guard covers an
                // engine too busy to arm it. Tell it to stand down.
                self.disconnect().await;
                Err(ConnectError::Timeout)
            }
        }
    }

    /// Publish a message. Resolves once the bytes are handed to the
    /// channel; QoS>0 acknowledgment tracking happens inside the engine.
    pub async fn publish(&self, publish: Publish, timeout: Duration) -> Result<(), PublishError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Publish { publish, reply })
            .await
            .map_err(|_| PublishError::Killed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PublishError::Killed),
            Err(_) => Err(PublishError::Timeout),
        }
    }

    /// Subscribe to topic filters. The result lines up index-for-index
    /// with the request list.
    pub async fn subscribe(
        &self,
        topics: Vec<SubscribeRequest>,
        timeout: Duration,
    ) -> Result<Vec<Subscription>, SubscribeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { topics, reply })
            .await
            .map_err(|_| SubscribeError::Killed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SubscribeError::Killed),
            Err(_) => Err(SubscribeError::Timeout),
        }
    }

    /// Remove subscriptions. Resolves on UNSUBACK.
    pub async fn unsubscribe(
        &self,
        filters: Vec<String>,
        timeout: Duration,
    ) -> Result<(), UnsubscribeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Unsubscribe { filters, reply })
            .await
            .map_err(|_| UnsubscribeError::Killed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UnsubscribeError::Killed),
            Err(_) => Err(UnsubscribeError::Timeout),
        }
    }

    /// Close the connection. Fire-and-forget; the `Disconnected` update
    /// confirms completion.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect).await;
    }
}
