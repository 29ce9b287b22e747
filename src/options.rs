use crate::message::{assign, Message, PERSIST_TRUE};

/// Subscription acknowledgement modes defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Auto,
    Client,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

/// Options applied to an outbound message before transmission.
///
/// Passed as a list to the client operations; each value populates the
/// matching [`Message`] field.
#[derive(Debug, Clone)]
pub enum MessageOption {
    /// Login credentials for the CONNECT handshake.
    Credentials { username: String, password: String },
    /// Auxiliary header appended to the frame.
    Header { name: String, value: String },
    /// Expiration for SEND frames.
    Expires(i64),
    /// Server-side prefetch window for a subscription.
    Prefetch(u32),
    /// Request a broker receipt under a generated id.
    Receipt,
    /// Request a broker receipt under an explicit id.
    ReceiptId(String),
    /// Ask the broker to persist the message.
    Persistence,
    /// Ask the broker to retain the message for late subscribers.
    Retain(String),
    /// SQL-like filter evaluated by the broker per subscription.
    Selector(String),
    /// Acknowledgement mode for a subscription.
    Ack(AckMode),
}

impl MessageOption {
    pub(crate) fn apply(self, m: &mut Message) {
        match self {
            MessageOption::Credentials { username, password } => {
                assign(&mut m.user, username.as_bytes());
                assign(&mut m.pass, password.as_bytes());
            }
            MessageOption::Header { name, value } => {
                m.header.add(name.as_bytes(), value.as_bytes());
            }
            MessageOption::Expires(expires) => m.expires = expires,
            MessageOption::Prefetch(count) => {
                assign(&mut m.prefetch, count.to_string().as_bytes());
            }
            MessageOption::Receipt => {
                let id = rand::random::<u64>();
                assign(&mut m.receipt, id.to_string().as_bytes());
            }
            MessageOption::ReceiptId(id) => assign(&mut m.receipt, id.as_bytes()),
            MessageOption::Persistence => assign(&mut m.persist, PERSIST_TRUE),
            MessageOption::Retain(retain) => assign(&mut m.retain, retain.as_bytes()),
            MessageOption::Selector(selector) => {
                assign(&mut m.selector, selector.as_bytes());
            }
            MessageOption::Ack(mode) => assign(&mut m.ack, mode.as_str().as_bytes()),
        }
    }
}
