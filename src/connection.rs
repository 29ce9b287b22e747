use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::codec::Framed;

use crate::codec::{FrameCodec, FrameItem};
use crate::error::Error;
use crate::message::Message;
use crate::peer::Peer;

/// Read and write buffer size for the framed socket.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Interval between buffered-writer flushes. Bounds the latency from
/// enqueue to the kernel socket buffer.
const FLUSH_TIME: Duration = Duration::from_millis(100);

/// Deadline applied to every flush.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Interval between outbound heartbeats.
const HEARTBEAT_TIME: Duration = Duration::from_secs(30);

/// How long the reader tolerates a silent wire before closing the peer.
const HEARTBEAT_WAIT: Duration = Duration::from_secs(60);

/// Depth of the channels between the peer handle and its tasks.
const CHANNEL_DEPTH: usize = 32;

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, FrameItem>;
type FrameStream = SplitStream<Framed<TcpStream, FrameCodec>>;

/// A [`Peer`] over a TCP socket.
///
/// Two background tasks drive the connection: a reader that turns wire
/// bytes into inbound messages and swallows heartbeats, and a writer that
/// coalesces outbound frames, flushing every 100 ms and emitting a
/// heartbeat every 30 s. Messages queued by one task reach the wire in
/// enqueue order.
pub struct ConnPeer {
    addr: String,
    outgoing: mpsc::Sender<Message>,
    incoming: Mutex<mpsc::Receiver<Message>>,
    shutdown: broadcast::Sender<()>,
    closed: Arc<AtomicBool>,
}

impl ConnPeer {
    /// Wrap an established socket, spawning the reader and writer tasks.
    pub fn new(conn: TcpStream) -> ConnPeer {
        let addr = conn
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let framed = Framed::with_capacity(conn, FrameCodec::new(), BUFFER_SIZE);
        let (sink, stream) = framed.split();

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (shutdown, _) = broadcast::channel(1);
        let closed = Arc::new(AtomicBool::new(false));

        // Subscribe before spawning so a close racing task startup is
        // still observed.
        let stop_reader = shutdown.subscribe();
        let stop_writer = shutdown.subscribe();
        tokio::spawn(read_into(
            stream,
            in_tx,
            shutdown.clone(),
            closed.clone(),
            stop_reader,
        ));
        tokio::spawn(write_from(
            sink,
            out_rx,
            shutdown.clone(),
            closed.clone(),
            stop_writer,
        ));

        ConnPeer {
            addr,
            outgoing: out_tx,
            incoming: Mutex::new(in_rx),
            shutdown,
            closed,
        }
    }
}

#[async_trait]
impl Peer for ConnPeer {
    async fn recv(&self) -> Option<Message> {
        self.incoming.lock().await.recv().await
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
        self.addr.clone()
    }

    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed);
        }
        let _ = self.shutdown.send(());
        Ok(())
    }
}

/// Reader task: frames go to `incoming`, heartbeats re-arm the idle
/// deadline, and any failure or silence past the deadline closes the peer.
async fn read_into(
    mut stream: FrameStream,
    incoming: mpsc::Sender<Message>,
    shutdown: broadcast::Sender<()>,
    closed: Arc<AtomicBool>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            _ = stop.recv() => break,
            item = timeout(HEARTBEAT_WAIT, stream.next()) => item,
        };
        match item {
            Err(_) => {
                tracing::warn!("stomp: no frame or heart-beat in {:?}", HEARTBEAT_WAIT);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::warn!("stomp: read failed: {}", err);
                break;
            }
            Ok(Some(Ok(FrameItem::Heartbeat))) => {
                tracing::debug!("stomp: received heart-beat");
            }
            Ok(Some(Ok(FrameItem::Message(message)))) => {
                if let Err(err) = incoming.send(message).await {
                    err.0.release();
                    break;
                }
            }
        }
    }
    closed.store(true, Ordering::Release);
    let _ = shutdown.send(());
    // dropping `incoming` ends the receive stream
}

/// Writer task: multiplexes the outgoing queue, the flush ticker, and the
/// heartbeat ticker, then drains whatever is still queued on the way out.
async fn write_from(
    mut sink: FrameSink,
    mut outgoing: mpsc::Receiver<Message>,
    shutdown: broadcast::Sender<()>,
    closed: Arc<AtomicBool>,
    mut stop: broadcast::Receiver<()>,
) {
    let start = Instant::now();
    let mut flush = interval_at(start + FLUSH_TIME, FLUSH_TIME);
    let mut heartbeat = interval_at(start + HEARTBEAT_TIME, HEARTBEAT_TIME);

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = heartbeat.tick() => {
                tracing::debug!("stomp: send heart-beat");
                if sink.feed(FrameItem::Heartbeat).await.is_err() {
                    break;
                }
            }
            _ = flush.tick() => {
                match timeout(WRITE_DEADLINE, sink.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!("stomp: flush failed: {}", err);
                        break;
                    }
                    Err(_) => {
                        tracing::warn!("stomp: flush deadline exceeded");
                        break;
                    }
                }
            }
            message = outgoing.recv() => {
                match message {
                    Some(message) => {
                        if sink.feed(FrameItem::Message(message)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    let _ = shutdown.send(());
    drain(sink, outgoing).await;
}

/// Emit anything still queued, flush under the write deadline, and shut
/// the socket down. The receiver is closed before collecting so no new
/// message can slip in behind the drain.
async fn drain(mut sink: FrameSink, mut outgoing: mpsc::Receiver<Message>) {
    outgoing.close();
    while let Ok(message) = outgoing.try_recv() {
        let _ = sink.feed(FrameItem::Message(message)).await;
    }
    let _ = timeout(WRITE_DEADLINE, sink.flush()).await;
    let _ = sink.close().await;
}
