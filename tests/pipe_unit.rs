//! Unit tests for the in-memory peer pair.

use std::time::Duration;

use cobalt_stomp::message::{method, Message};
use cobalt_stomp::peer::{pipe, Peer};
use cobalt_stomp::Error;
use tokio::time::timeout;

fn send_frame(body: &[u8]) -> Message {
    let mut m = Message::new();
    m.method.extend_from_slice(method::SEND);
    m.dest.extend_from_slice(b"/q");
    m.body.extend_from_slice(body);
    m
}

#[tokio::test]
async fn send_surfaces_on_the_other_half() {
    let (a, b) = pipe();

    a.send(send_frame(b"from a")).await.expect("a send");
    let m = b.recv().await.expect("b recv");
    assert_eq!(m.body, b"from a".as_slice());
    m.release();

    b.send(send_frame(b"from b")).await.expect("b send");
    let m = a.recv().await.expect("a recv");
    assert_eq!(m.body, b"from b".as_slice());
    m.release();
}

#[tokio::test]
async fn frames_arrive_in_send_order() {
    let (a, b) = pipe();

    for i in 0..10u8 {
        a.send(send_frame(&[i])).await.expect("send");
    }
    for i in 0..10u8 {
        let m = b.recv().await.expect("recv");
        assert_eq!(m.body, [i].as_slice());
        m.release();
    }
}

#[tokio::test]
async fn close_is_idempotent() {
    let (a, _b) = pipe();
    a.close().expect("first close");
    assert!(matches!(a.close(), Err(Error::Closed)));
}

#[tokio::test]
async fn send_after_close_fails() {
    let (a, _b) = pipe();
    a.close().expect("close");
    let err = a.send(send_frame(b"late")).await.unwrap_err();
    assert!(matches!(err, Error::Closed));
}

#[tokio::test]
async fn recv_ends_after_close() {
    let (a, b) = pipe();
    a.close().expect("close");

    let ended = timeout(Duration::from_secs(5), b.recv()).await.expect("no hang");
    assert!(ended.is_none());
}

#[tokio::test]
async fn queued_frames_are_delivered_before_the_close_is_seen() {
    let (a, b) = pipe();
    a.send(send_frame(b"last words")).await.expect("send");
    a.close().expect("close");

    let m = b.recv().await.expect("queued frame");
    assert_eq!(m.body, b"last words".as_slice());
    m.release();

    let ended = timeout(Duration::from_secs(5), b.recv()).await.expect("no hang");
    assert!(ended.is_none());
}

#[tokio::test]
async fn addr_labels_the_pipe() {
    let (a, b) = pipe();
    assert_eq!(a.addr(), "pipe");
    assert_eq!(b.addr(), "pipe");
}
