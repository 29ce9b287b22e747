use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::message::{assign, method, Message};

/// Hard limit on the size of a single buffered frame.
pub const MAX_FRAME: usize = 1024 * 1024;

const NEWLINE: &[u8] = b"\r\n";
const SEPARATOR: u8 = b':';
const TERMINATOR: u8 = 0;

const HEADER_ACCEPT: &[u8] = b"accept-version";
const HEADER_ACK: &[u8] = b"ack";
const HEADER_DEST: &[u8] = b"destination";
const HEADER_EXPIRES: &[u8] = b"expires";
const HEADER_ID: &[u8] = b"id";
const HEADER_LOGIN: &[u8] = b"login";
const HEADER_MESSAGE_ID: &[u8] = b"message-id";
const HEADER_PASS: &[u8] = b"passcode";
const HEADER_PERSIST: &[u8] = b"persistent";
const HEADER_PREFETCH: &[u8] = b"prefetch-count";
const HEADER_RECEIPT: &[u8] = b"receipt";
const HEADER_RECEIPT_ID: &[u8] = b"receipt-id";
const HEADER_RETAIN: &[u8] = b"retain";
const HEADER_SELECTOR: &[u8] = b"selector";
const HEADER_SUBSCRIPTION: &[u8] = b"subscription";
const HEADER_VERSION: &[u8] = b"version";

/// Split one line off `buf`, tolerating CRLF or a lone LF terminator.
///
/// Returns the line without its terminator and the remaining bytes, or
/// `None` when no line terminator is present.
fn split_line(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line = &buf[..pos];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    Some((line, &buf[pos + 1..]))
}

/// Parse a single frame into `m`.
///
/// Parameters
/// - `buf`: the bytes of exactly one frame, excluding the trailing NUL.
/// - `m`: the message to populate, typically fresh from the pool.
///
/// The first line is the command, subsequent lines up to the first blank
/// line are headers, and everything after the blank line is the body.
/// Known header names map onto the named `Message` fields; anything else
/// is kept in the auxiliary header set in wire order.
pub fn parse(buf: &[u8], m: &mut Message) -> Result<(), Error> {
    let (command, mut rest) = match split_line(buf) {
        Some(split) => split,
        None => (buf, &b""[..]),
    };
    if command.is_empty() {
        return Err(Error::Protocol("empty command line".to_string()));
    }
    assign(&mut m.method, command);

    loop {
        if rest.is_empty() {
            break;
        }
        let (line, next) = match split_line(rest) {
            Some(split) => split,
            None => (rest, &b""[..]),
        };
        rest = next;
        if line.is_empty() {
            // blank line, the body follows
            break;
        }

        let colon = line.iter().position(|&b| b == SEPARATOR).ok_or_else(|| {
            Error::Protocol(format!(
                "malformed header line: {}",
                String::from_utf8_lossy(line)
            ))
        })?;
        let (name, value) = (&line[..colon], &line[colon + 1..]);

        match name {
            HEADER_DEST => assign(&mut m.dest, value),
            HEADER_ID | HEADER_MESSAGE_ID => assign(&mut m.id, value),
            HEADER_SUBSCRIPTION => assign(&mut m.subs, value),
            HEADER_RECEIPT | HEADER_RECEIPT_ID => assign(&mut m.receipt, value),
            HEADER_ACK => assign(&mut m.ack, value),
            HEADER_PREFETCH => assign(&mut m.prefetch, value),
            HEADER_SELECTOR => assign(&mut m.selector, value),
            HEADER_PERSIST => assign(&mut m.persist, value),
            HEADER_RETAIN => assign(&mut m.retain, value),
            HEADER_EXPIRES => {
                m.expires = std::str::from_utf8(value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| {
                        Error::Protocol(format!(
                            "invalid expires header: {}",
                            String::from_utf8_lossy(value)
                        ))
                    })?;
            }
            HEADER_LOGIN => assign(&mut m.user, value),
            HEADER_PASS => assign(&mut m.pass, value),
            HEADER_ACCEPT | HEADER_VERSION => assign(&mut m.proto, value),
            _ => m.header.add(name, value),
        }
    }

    m.body.extend_from_slice(rest);
    Ok(())
}

fn put_header(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.extend_from_slice(name);
    dst.put_u8(SEPARATOR);
    dst.extend_from_slice(value);
    dst.extend_from_slice(NEWLINE);
}

/// Serialize `m` into `dst`, without the NUL terminator.
///
/// The command line comes first, then the method-specific headers, then a
/// `receipt` header for any frame that wants an acknowledgement, then the
/// auxiliary headers in insertion order, a blank line, and the body.
pub fn write_to(dst: &mut BytesMut, m: &Message) {
    dst.extend_from_slice(&m.method);
    dst.extend_from_slice(NEWLINE);

    match m.method.as_slice() {
        method::STOMP | method::CONNECT => {
            put_header(dst, HEADER_ACCEPT, &m.proto);
            if !m.user.is_empty() {
                put_header(dst, HEADER_LOGIN, &m.user);
            }
            if !m.pass.is_empty() {
                put_header(dst, HEADER_PASS, &m.pass);
            }
        }
        method::CONNECTED => {
            put_header(dst, HEADER_VERSION, &m.proto);
        }
        method::SEND => {
            put_header(dst, HEADER_DEST, &m.dest);
            if m.expires != 0 {
                put_header(dst, HEADER_EXPIRES, m.expires.to_string().as_bytes());
            }
            if !m.retain.is_empty() {
                put_header(dst, HEADER_RETAIN, &m.retain);
            }
            if !m.persist.is_empty() {
                put_header(dst, HEADER_PERSIST, &m.persist);
            }
        }
        method::SUBSCRIBE => {
            put_header(dst, HEADER_ID, &m.id);
            put_header(dst, HEADER_DEST, &m.dest);
            if !m.selector.is_empty() {
                put_header(dst, HEADER_SELECTOR, &m.selector);
            }
            if !m.prefetch.is_empty() {
                put_header(dst, HEADER_PREFETCH, &m.prefetch);
            }
            if !m.ack.is_empty() {
                put_header(dst, HEADER_ACK, &m.ack);
            }
        }
        method::UNSUBSCRIBE | method::ACK | method::NACK => {
            put_header(dst, HEADER_ID, &m.id);
        }
        method::MESSAGE => {
            put_header(dst, HEADER_MESSAGE_ID, &m.id);
            put_header(dst, HEADER_DEST, &m.dest);
            put_header(dst, HEADER_SUBSCRIPTION, &m.subs);
            if !m.ack.is_empty() {
                put_header(dst, HEADER_ACK, &m.ack);
            }
        }
        method::RECEIPT => {
            put_header(dst, HEADER_RECEIPT_ID, &m.receipt);
        }
        // DISCONNECT and ERROR carry no named headers
        _ => {}
    }

    if !m.receipt.is_empty() && m.method != method::RECEIPT {
        put_header(dst, HEADER_RECEIPT, &m.receipt);
    }

    for (name, data) in m.header.iter() {
        put_header(dst, name, data);
    }
    dst.extend_from_slice(NEWLINE);
    dst.extend_from_slice(&m.body);
}

/// Items moving through a framed transport.
///
/// Either a full frame, or a heartbeat: a single NUL byte between frames
/// on the wire.
#[derive(Debug)]
pub enum FrameItem {
    Message(Message),
    Heartbeat,
}

/// `tokio_util` codec for the STOMP wire format.
///
/// Decoding populates pooled messages; encoding releases them back to the
/// pool once their bytes are in the write buffer.
pub struct FrameCodec {}

impl FrameCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = FrameItem;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A NUL with no frame bytes in front of it is a heartbeat.
        if let Some(&TERMINATOR) = src.first() {
            src.advance(1);
            return Ok(Some(FrameItem::Heartbeat));
        }

        match src.iter().position(|&b| b == TERMINATOR) {
            Some(pos) => {
                let frame = src.split_to(pos);
                src.advance(1);

                let mut m = Message::new();
                match parse(&frame, &mut m) {
                    Ok(()) => Ok(Some(FrameItem::Message(m))),
                    Err(err) => {
                        m.release();
                        Err(err)
                    }
                }
            }
            None if src.len() > MAX_FRAME => Err(Error::Protocol(format!(
                "frame exceeds {} byte limit",
                MAX_FRAME
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<FrameItem> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: FrameItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            FrameItem::Heartbeat => dst.put_u8(TERMINATOR),
            FrameItem::Message(m) => {
                write_to(dst, &m);
                dst.put_u8(TERMINATOR);
                m.release();
            }
        }
        Ok(())
    }
}
