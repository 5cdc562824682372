//! # mqttwire
//!
//! An MQTT 3.1.1 client protocol engine.
//!
//! The crate covers the protocol work of a single-connection client: a
//! bit-exact packet codec, the connection state machine, request/response
//! correlation over packet identifiers, and keep-alive discipline. The
//! byte transport is pluggable; plain TCP ships in-crate and anything else
//! (TLS, WebSocket) implements [`Transport`] outside it.
//!
//! ## Architecture
//!
//! Four layers, leaves first:
//!
//! - [`codec`] - pure packet encode/decode over byte buffers
//! - [`transport`] - the [`Channel`](transport::Channel) byte pipe and the
//!   [`Transport`] connect seam
//! - a framing adapter that owns the inbound byte accumulator and turns
//!   chunks into packet batches
//! - the engine task: one cooperative task owns all connection state and
//!   serves [`Client`] requests over a typed inbox
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mqttwire::{Client, ConnectOptions, Message, Publish, QoS, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, _updates) = Client::start(
//!         ConnectOptions::new("example-client"),
//!         TransportOptions::tcp("localhost", 1883),
//!     );
//!     client.connect(Duration::from_secs(5)).await?;
//!     let message = Message::new("greetings", &b"hello"[..], QoS::AtMostOnce);
//!     client.publish(Publish::new(message), Duration::from_secs(5)).await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod options;
pub mod transport;

mod client;
mod engine;
mod framed;

pub use client::{Client, ConnectionStatus, Subscription, Update, Updates};
pub use codec::{Message, Publish, QoS, SubscribeRequest};
pub use error::{
    ChannelError, ConnectError, DecodeError, EncodeError, PublishError, SubscribeError,
    UnsubscribeError,
};
pub use options::{ConnectOptions, TransportOptions};
pub use transport::{Channel, ChannelEvent, Transport};
