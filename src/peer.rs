use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::Error;
use crate::message::Message;

/// Depth of the channels backing a pipe pair.
const PIPE_DEPTH: usize = 32;

/// A bidirectional stream of messages.
///
/// Two transports implement the trait: [`ConnPeer`](crate::connection::ConnPeer)
/// over a socket, and the in-memory pair returned by [`pipe`]. Ownership of a
/// message transfers on every hand-off; whoever receives it releases it.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Next inbound message, or `None` once the transport has terminated,
    /// whether by remote disconnect or a local [`close`](Peer::close).
    async fn recv(&self) -> Option<Message>;

    /// Queue a message for transmission.
    ///
    /// Fails with [`Error::Closed`] after close, without enqueueing.
    async fn send(&self, message: Message) -> Result<(), Error>;

    /// Label of the remote endpoint.
    fn addr(&self) -> String;

    /// Shut the transport down. The first call wins; every later call
    /// reports [`Error::Closed`].
    fn close(&self) -> Result<(), Error>;
}

/// One half of an in-memory peer pair.
///
/// Messages sent on one half surface on the other with no serialization and
/// no heartbeats. Closing either half shuts the whole pipe down.
pub struct PipePeer {
    outgoing: mpsc::Sender<Message>,
    incoming: Mutex<mpsc::Receiver<Message>>,
    shutdown: Arc<watch::Sender<bool>>,
    closed: Arc<AtomicBool>,
}

/// Create two peers wired back-to-back.
pub fn pipe() -> (PipePeer, PipePeer) {
    let (a_tx, a_rx) = mpsc::channel(PIPE_DEPTH);
    let (b_tx, b_rx) = mpsc::channel(PIPE_DEPTH);
    let (shutdown, _) = watch::channel(false);
    let shutdown = Arc::new(shutdown);
    let closed = Arc::new(AtomicBool::new(false));

    (
        PipePeer {
            outgoing: a_tx,
            incoming: Mutex::new(b_rx),
            shutdown: shutdown.clone(),
            closed: closed.clone(),
        },
        PipePeer {
            outgoing: b_tx,
            incoming: Mutex::new(a_rx),
            shutdown,
            closed,
        },
    )
}

#[async_trait]
impl Peer for PipePeer {
    async fn recv(&self) -> Option<Message> {
        let mut incoming = self.incoming.lock().await;
        let mut shutdown = self.shutdown.subscribe();
        // Deliver anything already queued before honoring a close.
        tokio::select! {
            biased;
            m = incoming.recv() => m,
            _ = shutdown.wait_for(|closed| *closed) => None,
        }
    }

    async fn send(&self, message: Message) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            message.release();
            return Err(Error::Closed);
        }
        self.outgoing.send(message).await.map_err(|err| {
            err.0.release();
            Error::Closed
        })
    }

    fn addr(&self) -> String {
        "pipe".to_string()
    }

    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed);
        }
        self.shutdown.send_replace(true);
        Ok(())
    }
}
