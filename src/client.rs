use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::connection::ConnPeer;
use crate::error::Error;
use crate::message::{assign, method, Message, STOMP_1_2};
use crate::options::MessageOption;
use crate::peer::Peer;

/// How long a send waits for a requested broker receipt before giving up.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// A subscription message handler.
///
/// Invoked from the client's listen task, one message at a time per
/// subscription. The handler owns the message: release it when done, and
/// copy anything kept past the call, since releasing recycles the backing
/// storage. Long work must be handed off so the listen task keeps
/// draining the peer.
pub trait Handler: Send + Sync {
    fn handle(&self, message: Message);
}

impl<F> Handler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn handle(&self, message: Message) {
        self(message)
    }
}

/// Maps guarded by the client lock. Held only for map mutation, never
/// across I/O.
struct State {
    subs: Mutex<HashMap<String, Arc<dyn Handler>>>,
    wait: Mutex<HashMap<String, mpsc::Sender<()>>>,
}

/// A client session over a [`Peer`].
///
/// Correlates outbound frames with broker receipts, fans inbound MESSAGE
/// frames out to per-subscription handlers, and reports the terminal error
/// of its listen task through [`done`](Client::done).
pub struct Client {
    peer: Arc<dyn Peer>,
    state: Arc<State>,
    seq: AtomicU64,
    done_tx: mpsc::Sender<Error>,
    done_rx: AsyncMutex<mpsc::Receiver<Error>>,
    receipt_timeout: Duration,
}

impl Client {
    /// New, unconnected client over the given peer.
    pub fn new(peer: Arc<dyn Peer>) -> Client {
        let (done_tx, done_rx) = mpsc::channel(1);
        Client {
            peer,
            state: Arc::new(State {
                subs: Mutex::new(HashMap::new()),
                wait: Mutex::new(HashMap::new()),
            }),
            seq: AtomicU64::new(0),
            done_tx,
            done_rx: AsyncMutex::new(done_rx),
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Connect a TCP socket to the target and wrap it in a client.
    pub async fn dial(target: &str) -> Result<Client, Error> {
        let conn = TcpStream::connect(target).await?;
        Ok(Client::new(Arc::new(ConnPeer::new(conn))))
    }

    /// Adjust how long sends wait for a requested receipt.
    pub fn set_receipt_timeout(&mut self, timeout: Duration) {
        self.receipt_timeout = timeout;
    }

    /// Open the session.
    ///
    /// Sends the STOMP handshake frame, then synchronously awaits the
    /// broker's reply: anything but CONNECTED is a protocol error, and a
    /// closed peer surfaces as [`Error::Closed`]. On success the listen
    /// task starts and inbound dispatch begins.
    pub async fn connect(&self, opts: Vec<MessageOption>) -> Result<(), Error> {
        let mut m = Message::new();
        assign(&mut m.method, method::STOMP);
        assign(&mut m.proto, STOMP_1_2);
        m.apply(opts);
        self.send_message(m).await?;

        let reply = match self.peer.recv().await {
            Some(reply) => reply,
            None => return Err(Error::Closed),
        };
        let connected = reply.method == method::CONNECTED;
        reply.release();
        if !connected {
            return Err(Error::Protocol(
                "unexpected method in handshake, want CONNECTED".to_string(),
            ));
        }

        tokio::spawn(listen(
            self.peer.clone(),
            self.state.clone(),
            self.done_tx.clone(),
        ));
        Ok(())
    }

    /// Terminate the session and close the peer.
    ///
    /// The DISCONNECT frame is best effort; a failure to send it is
    /// swallowed.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let mut m = Message::new();
        assign(&mut m.method, method::DISCONNECT);
        let _ = self.send_message(m).await;
        self.peer.close()
    }

    /// Terminal error of the listen task, delivered exactly once.
    pub async fn done(&self) -> Error {
        self.done_rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Error::Closed)
    }

    /// Send body bytes to the destination.
    pub async fn send(
        &self,
        dest: &str,
        body: &[u8],
        opts: Vec<MessageOption>,
    ) -> Result<(), Error> {
        let mut m = Message::new();
        assign(&mut m.method, method::SEND);
        assign(&mut m.dest, dest.as_bytes());
        assign(&mut m.body, body);
        m.apply(opts);
        self.send_message(m).await
    }

    /// Send the JSON encoding of `value` to the destination.
    ///
    /// An encoding failure returns before anything is transmitted. The
    /// frame carries a `content-type: application/json` header.
    pub async fn send_json<T>(
        &self,
        dest: &str,
        value: &T,
        mut opts: Vec<MessageOption>,
    ) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value)?;
        opts.push(MessageOption::Header {
            name: "content-type".to_string(),
            value: "application/json".to_string(),
        });
        self.send(dest, &body, opts).await
    }

    /// Subscribe to a destination.
    ///
    /// Returns the subscription id, unique for the lifetime of the client.
    /// The handler is registered before the SUBSCRIBE frame goes out, so a
    /// broker that starts delivering immediately finds it in place; if the
    /// send fails the registration is rolled back.
    pub async fn subscribe(
        &self,
        dest: &str,
        handler: impl Handler + 'static,
        opts: Vec<MessageOption>,
    ) -> Result<String, Error> {
        let id = self.incr();

        let mut m = Message::new();
        assign(&mut m.method, method::SUBSCRIBE);
        assign(&mut m.id, id.as_bytes());
        assign(&mut m.dest, dest.as_bytes());
        m.apply(opts);

        self.state.subs.lock().insert(id.clone(), Arc::new(handler));

        if let Err(err) = self.send_message(m).await {
            self.state.subs.lock().remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Cancel a subscription.
    ///
    /// The handler is removed before the UNSUBSCRIBE frame goes out, so
    /// MESSAGE frames already in flight are dropped rather than delivered
    /// to a cancelled subscription.
    pub async fn unsubscribe(&self, id: &str, opts: Vec<MessageOption>) -> Result<(), Error> {
        self.state.subs.lock().remove(id);

        let mut m = Message::new();
        assign(&mut m.method, method::UNSUBSCRIBE);
        assign(&mut m.id, id.as_bytes());
        m.apply(opts);
        self.send_message(m).await
    }

    /// Acknowledge the message with the given id.
    pub async fn ack(&self, id: &str, opts: Vec<MessageOption>) -> Result<(), Error> {
        let mut m = Message::new();
        assign(&mut m.method, method::ACK);
        assign(&mut m.id, id.as_bytes());
        m.apply(opts);
        self.send_message(m).await
    }

    /// Negative-acknowledge the message with the given id.
    pub async fn nack(&self, id: &str, opts: Vec<MessageOption>) -> Result<(), Error> {
        let mut m = Message::new();
        assign(&mut m.method, method::NACK);
        assign(&mut m.id, id.as_bytes());
        m.apply(opts);
        self.send_message(m).await
    }

    /// Next subscription id: decimal text of a post-incremented counter.
    fn incr(&self) -> String {
        self.seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Transmit a message, waiting for the broker receipt when one is
    /// requested.
    ///
    /// The waiter is installed before transmission so a fast broker cannot
    /// acknowledge into a void, and removed on every exit path. The wait
    /// is bounded by the client's receipt timeout.
    async fn send_message(&self, m: Message) -> Result<(), Error> {
        if m.receipt.is_empty() {
            return self.peer.send(m).await;
        }

        let receipt = String::from_utf8_lossy(&m.receipt).into_owned();
        let (tx, mut rx) = mpsc::channel(1);
        self.state.wait.lock().insert(receipt.clone(), tx);

        let result = match self.peer.send(m).await {
            Err(err) => Err(err),
            Ok(()) => match tokio::time::timeout(self.receipt_timeout, rx.recv()).await {
                Ok(_) => Ok(()),
                Err(_) => Err(Error::ReceiptTimeout(receipt.clone())),
            },
        };
        self.state.wait.lock().remove(&receipt);
        result
    }
}

/// Listen task: drains the peer until it ends, dispatching MESSAGE frames
/// to handlers and RECEIPT frames to waiters. The terminal error goes out
/// on the done channel exactly once.
async fn listen(peer: Arc<dyn Peer>, state: Arc<State>, done: mpsc::Sender<Error>) {
    loop {
        let m = match peer.recv().await {
            Some(m) => m,
            None => {
                let _ = done.try_send(Error::Closed);
                return;
            }
        };

        if m.method == method::MESSAGE {
            let subs = String::from_utf8_lossy(&m.subs).into_owned();
            let handler = state.subs.lock().get(&subs).cloned();
            match handler {
                Some(handler) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler.handle(m))) {
                        let reason = panic_text(panic);
                        tracing::warn!("stomp client: recovered handler panic: {}", reason);
                        let _ = done.try_send(Error::HandlerPanic(reason));
                        return;
                    }
                }
                None => {
                    tracing::info!("stomp client: subscription not found: {}", subs);
                    m.release();
                }
            }
        } else if m.method == method::RECEIPT {
            let receipt = String::from_utf8_lossy(&m.receipt).into_owned();
            let waiter = state.wait.lock().get(&receipt).cloned();
            match waiter {
                Some(waiter) => {
                    let _ = waiter.try_send(());
                }
                None => {
                    tracing::info!("stomp client: unknown read receipt: {}", receipt);
                }
            }
            m.release();
        } else {
            tracing::info!(
                "stomp client: unknown message type: {}",
                String::from_utf8_lossy(&m.method)
            );
            m.release();
        }
    }
}

fn panic_text(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
