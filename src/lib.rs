//! STOMP 1.2 messaging core: a pooled frame codec, a heartbeat-aware
//! socket transport, and a client session with receipt correlation.

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod header;
pub mod message;
pub mod options;
pub mod peer;

pub use client::{Client, Handler};
pub use codec::{FrameCodec, FrameItem};
pub use connection::ConnPeer;
pub use error::Error;
pub use header::Header;
pub use message::{Message, STOMP_1_2};
pub use options::{AckMode, MessageOption};
pub use peer::{pipe, Peer, PipePeer};
