//! Unit tests for the pooled Message record and message options.

use cobalt_stomp::message::{method, Message, PERSIST_TRUE};
use cobalt_stomp::{AckMode, MessageOption};

// =============================================================================
// Pool Tests
// =============================================================================

#[test]
fn pool_acquire_is_cleared() {
    let mut m = Message::new();
    m.proto.extend_from_slice(b"1.2");
    m.method.extend_from_slice(method::SEND);
    m.id.extend_from_slice(b"42");
    m.subs.extend_from_slice(b"7");
    m.dest.extend_from_slice(b"/queue/test");
    m.user.extend_from_slice(b"janet");
    m.pass.extend_from_slice(b"opensesame");
    m.ack.extend_from_slice(b"client");
    m.prefetch.extend_from_slice(b"2");
    m.persist.extend_from_slice(PERSIST_TRUE);
    m.retain.extend_from_slice(b"all");
    m.selector.extend_from_slice(b"ram > 2");
    m.receipt.extend_from_slice(b"r-1");
    m.expires = 12345;
    m.header.add(b"custom", b"value");
    m.body.extend_from_slice(b"payload");
    m.release();

    let m = Message::new();
    assert!(m.proto.is_empty());
    assert!(m.method.is_empty());
    assert!(m.id.is_empty());
    assert!(m.subs.is_empty());
    assert!(m.dest.is_empty());
    assert!(m.user.is_empty());
    assert!(m.pass.is_empty());
    assert!(m.ack.is_empty());
    assert!(m.prefetch.is_empty());
    assert!(m.persist.is_empty());
    assert!(m.retain.is_empty());
    assert!(m.selector.is_empty());
    assert!(m.receipt.is_empty());
    assert_eq!(m.expires, 0);
    assert!(m.header.is_empty());
    assert!(m.body.is_empty());
    m.release();
}

#[test]
fn pool_reset_clears_header_items() {
    let mut m = Message::new();
    m.header.add(b"a", b"1");
    m.header.add(b"b", b"2");
    assert_eq!(m.header.len(), 2);

    m.reset();
    assert!(m.header.is_empty());
    assert_eq!(m.header.get(b"a"), None);
    m.release();
}

// =============================================================================
// Option Application Tests
// =============================================================================

#[test]
fn option_credentials() {
    let mut m = Message::new();
    m.apply(vec![MessageOption::Credentials {
        username: "janet".to_string(),
        password: "opensesame".to_string(),
    }]);
    assert_eq!(m.user, b"janet".as_slice());
    assert_eq!(m.pass, b"opensesame".as_slice());
    m.release();
}

#[test]
fn option_header_appends() {
    let mut m = Message::new();
    m.apply(vec![
        MessageOption::Header {
            name: "x-first".to_string(),
            value: "1".to_string(),
        },
        MessageOption::Header {
            name: "x-second".to_string(),
            value: "2".to_string(),
        },
    ]);
    assert_eq!(m.header.get(b"x-first"), Some(b"1".as_slice()));
    assert_eq!(m.header.get(b"x-second"), Some(b"2".as_slice()));
    m.release();
}

#[test]
fn option_expires_and_prefetch() {
    let mut m = Message::new();
    m.apply(vec![MessageOption::Expires(99), MessageOption::Prefetch(5)]);
    assert_eq!(m.expires, 99);
    assert_eq!(m.prefetch, b"5".as_slice());
    m.release();
}

#[test]
fn option_receipt_generates_an_id() {
    let mut m = Message::new();
    m.apply(vec![MessageOption::Receipt]);
    assert!(!m.receipt.is_empty());
    // generated ids are decimal text
    assert!(m.receipt.iter().all(|b| b.is_ascii_digit()));
    m.release();
}

#[test]
fn option_receipt_explicit_id() {
    let mut m = Message::new();
    m.apply(vec![MessageOption::ReceiptId("r-17".to_string())]);
    assert_eq!(m.receipt, b"r-17".as_slice());
    m.release();
}

#[test]
fn option_persistence_retain_selector() {
    let mut m = Message::new();
    m.apply(vec![
        MessageOption::Persistence,
        MessageOption::Retain("all".to_string()),
        MessageOption::Selector("ram > 2".to_string()),
    ]);
    assert_eq!(m.persist, PERSIST_TRUE);
    assert_eq!(m.retain, b"all".as_slice());
    assert_eq!(m.selector, b"ram > 2".as_slice());
    m.release();
}

#[test]
fn option_ack_modes() {
    for (mode, want) in [
        (AckMode::Auto, b"auto".as_slice()),
        (AckMode::Client, b"client".as_slice()),
        (AckMode::ClientIndividual, b"client-individual".as_slice()),
    ] {
        let mut m = Message::new();
        m.apply(vec![MessageOption::Ack(mode)]);
        assert_eq!(m.ack, want);
        m.release();
    }
}
