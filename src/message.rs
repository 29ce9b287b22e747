use std::sync::Mutex;

use crate::header::Header;
use crate::options::MessageOption;

/// Protocol version spoken by this crate.
pub const STOMP_1_2: &[u8] = b"1.2";

/// Value of the `persistent` header when persistence is requested.
pub const PERSIST_TRUE: &[u8] = b"true";

/// Frame commands defined by STOMP 1.2.
pub mod method {
    pub const STOMP: &[u8] = b"STOMP";
    pub const CONNECT: &[u8] = b"CONNECT";
    pub const CONNECTED: &[u8] = b"CONNECTED";
    pub const SEND: &[u8] = b"SEND";
    pub const SUBSCRIBE: &[u8] = b"SUBSCRIBE";
    pub const UNSUBSCRIBE: &[u8] = b"UNSUBSCRIBE";
    pub const ACK: &[u8] = b"ACK";
    pub const NACK: &[u8] = b"NACK";
    pub const DISCONNECT: &[u8] = b"DISCONNECT";
    pub const MESSAGE: &[u8] = b"MESSAGE";
    pub const RECEIPT: &[u8] = b"RECEIPT";
    pub const ERROR: &[u8] = b"ERROR";
}

/// One STOMP frame.
///
/// Fields are raw byte strings so a pooled record keeps its allocations
/// across reuse, and so opaque identifiers from a broker (ack ids,
/// message-ids) round-trip without numeric conversion.
#[derive(Debug, Default)]
pub struct Message {
    /// Protocol version bytes, e.g. `1.2`.
    pub proto: Vec<u8>,
    /// Frame command; one of the [`method`] constants after a parse.
    pub method: Vec<u8>,
    /// Subscription or message identifier.
    pub id: Vec<u8>,
    /// Subscription the frame belongs to.
    pub subs: Vec<u8>,
    /// Destination.
    pub dest: Vec<u8>,
    /// CONNECT credentials.
    pub user: Vec<u8>,
    pub pass: Vec<u8>,
    /// Acknowledgement mode: `auto`, `client`, or `client-individual`.
    pub ack: Vec<u8>,
    pub prefetch: Vec<u8>,
    pub persist: Vec<u8>,
    pub retain: Vec<u8>,
    pub selector: Vec<u8>,
    /// Receipt correlation id. Non-empty on a frame that is not RECEIPT
    /// means the sender wants an acknowledgement.
    pub receipt: Vec<u8>,
    pub expires: i64,
    /// Auxiliary headers not covered by the named fields.
    pub header: Header,
    /// Opaque payload.
    pub body: Vec<u8>,
}

static POOL: Mutex<Vec<Message>> = Mutex::new(Vec::new());

/// Replace the contents of a pooled byte field, keeping its capacity.
pub(crate) fn assign(field: &mut Vec<u8>, value: &[u8]) {
    field.clear();
    field.extend_from_slice(value);
}

impl Message {
    /// Acquire a cleared message from the process-wide pool.
    ///
    /// Reuse is best-effort: a contended or empty pool yields a fresh
    /// allocation instead.
    pub fn new() -> Message {
        match POOL.lock() {
            Ok(mut pool) => pool.pop().unwrap_or_default(),
            Err(_) => Message::default(),
        }
    }

    /// Return the message to the pool.
    ///
    /// The record is reset before it is parked, so stale bytes never leak
    /// into a later acquisition. Dropping a message instead of releasing it
    /// is allowed and merely skips reuse.
    pub fn release(mut self) {
        self.reset();
        if let Ok(mut pool) = POOL.lock() {
            pool.push(self);
        }
    }

    /// Truncate every field to zero length, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.proto.clear();
        self.method.clear();
        self.id.clear();
        self.subs.clear();
        self.dest.clear();
        self.user.clear();
        self.pass.clear();
        self.ack.clear();
        self.prefetch.clear();
        self.persist.clear();
        self.retain.clear();
        self.selector.clear();
        self.receipt.clear();
        self.expires = 0;
        self.header.reset();
        self.body.clear();
    }

    /// Fold message options into the record.
    pub fn apply(&mut self, opts: impl IntoIterator<Item = MessageOption>) {
        for opt in opts {
            opt.apply(self);
        }
    }
}
