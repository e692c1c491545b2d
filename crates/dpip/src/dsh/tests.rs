//! Unit tests for the buffered socket handle.

use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;

use rstest::{fixture, rstest};

use super::*;
use crate::tag::build_cmd;

#[fixture]
fn pair() -> (Dsh, UnixStream) {
    let (local, peer) = UnixStream::pair().expect("socket pair");
    (Dsh::from_stream(local), peer)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[rstest]
fn tag_delivered_a_byte_at_a_time_is_returned_whole(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    let tag = build_cmd(&[("cmd", "send_data"), ("msg", "a '> b")]).expect("build tag");
    let (last, head) = tag.as_bytes().split_last().expect("non-empty tag");

    for byte in head {
        peer.write_all(&[*byte]).expect("write byte");
        assert_eq!(dsh.read_token(false), None);
        assert_eq!(dsh.status(), DshStatus::WouldBlock);
    }
    peer.write_all(&[*last]).expect("write last byte");

    assert_eq!(dsh.read_tag(false).as_deref(), Some(tag.as_str()));
    assert_eq!(dsh.status(), DshStatus::Ok);
}

#[rstest]
fn back_to_back_tags_are_split(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    peer.write_all(b"<cmd='auth' msg='k' '><cmd='DpiBye' '>")
        .expect("write tags");

    assert_eq!(dsh.read_tag(true).as_deref(), Some("<cmd='auth' msg='k' '>"));
    assert_eq!(dsh.read_tag(true).as_deref(), Some("<cmd='DpiBye' '>"));
}

#[rstest]
fn unterminated_tag_is_never_returned(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    peer.write_all(b"<cmd='check_server' msg='x'")
        .expect("write partial tag");
    drop(peer);

    assert_eq!(dsh.read_token(true), None);
    assert_eq!(dsh.status(), DshStatus::Eof);
}

#[rstest]
fn mode_switch_tag_moves_handle_to_raw(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    peer.write_all(b"<cmd='start_send_page' url='x' '>body '> with lookalike")
        .expect("write stream");

    let tag = dsh.read_tag(true).expect("mode switch tag");
    assert_eq!(tag, "<cmd='start_send_page' url='x' '>");
    assert_eq!(dsh.mode(), DshMode::Raw);

    let body = dsh.read_token(true).expect("raw body");
    assert_eq!(body, b"body '> with lookalike");
    assert_eq!(dsh.mode(), DshMode::Raw);
}

#[rstest]
fn raw_mode_reports_would_block_when_idle(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    peer.write_all(b"<cmd='start_send_page' '>")
        .expect("write tag");
    dsh.read_token(true).expect("mode switch tag");

    assert_eq!(dsh.read_token(false), None);
    assert_eq!(dsh.status(), DshStatus::WouldBlock);
}

#[rstest]
fn closed_peer_reports_eof(pair: (Dsh, UnixStream)) {
    let (mut dsh, peer) = pair;
    drop(peer);

    assert_eq!(dsh.read_token(false), None);
    assert_eq!(dsh.status(), DshStatus::Eof);
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[rstest]
fn small_writes_are_queued_until_flushed(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    let queued = dsh.write_str(false, "<cmd='a' '>").expect("queue");
    assert_eq!(queued, WriteStatus::Queued);
    assert_eq!(dsh.pending_write(), 11);

    let flushed = dsh.write_str(true, "<cmd='b' '>").expect("flush");
    assert_eq!(flushed, WriteStatus::Flushed);
    assert_eq!(dsh.pending_write(), 0);

    let mut received = [0_u8; 22];
    peer.read_exact(&mut received).expect("read flushed bytes");
    assert_eq!(&received, b"<cmd='a' '><cmd='b' '>");
}

#[rstest]
fn writes_past_threshold_flush_without_request(pair: (Dsh, UnixStream)) {
    let (mut dsh, _peer) = pair;
    let payload = vec![b'x'; FLUSH_THRESHOLD];

    let status = dsh.write(false, &payload).expect("write");

    assert_eq!(status, WriteStatus::Flushed);
    assert_eq!(dsh.pending_write(), 0);
}

#[rstest]
fn nonblocking_write_keeps_the_unsent_tail(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    let payload = vec![b'y'; 8 * 1024 * 1024];

    let status = dsh.try_write(&payload).expect("try write");
    assert_eq!(status, WriteStatus::WouldBlock);
    assert_eq!(dsh.status(), DshStatus::WouldBlock);
    let pending = dsh.pending_write();
    assert!(pending > 0 && pending < payload.len());

    let mut received = 0;
    let mut chunk = vec![0_u8; 64 * 1024];
    loop {
        received += peer.read(&mut chunk).expect("drain peer");
        if dsh.try_flush().expect("flush") == WriteStatus::Flushed {
            break;
        }
    }
    while received < payload.len() {
        received += peer.read(&mut chunk).expect("drain remainder");
    }
    assert_eq!(received, payload.len());
}

#[rstest]
fn writing_to_a_closed_peer_is_reported(pair: (Dsh, UnixStream)) {
    let (mut dsh, peer) = pair;
    drop(peer);

    let error = dsh.write_str(true, "<cmd='a' '>").expect_err("peer gone");

    assert!(matches!(error, DshError::Closed));
    assert_eq!(dsh.status(), DshStatus::Eof);
}

// ---------------------------------------------------------------------------
// Closing
// ---------------------------------------------------------------------------

#[rstest]
fn close_flushes_then_releases_shared_descriptor(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    dsh.write_str(false, "<cmd='DpiBye' '>").expect("queue");

    dsh.close().expect("close");

    let mut received = String::new();
    peer.read_to_string(&mut received).expect("read until eof");
    assert_eq!(received, "<cmd='DpiBye' '>");
}

#[test]
fn close_releases_distinct_descriptors() {
    let (local, mut peer) = UnixStream::pair().expect("socket pair");
    let output = local.try_clone().expect("clone stream");
    let dsh = Dsh::new(OwnedFd::from(local), OwnedFd::from(output));

    dsh.close().expect("close");

    let mut received = Vec::new();
    peer.read_to_end(&mut received).expect("read until eof");
    assert!(received.is_empty());
}

#[rstest]
fn drop_flushes_pending_data(pair: (Dsh, UnixStream)) {
    let (mut dsh, mut peer) = pair;
    dsh.write_str(false, "<cmd='a' '>").expect("queue");

    drop(dsh);

    let mut received = String::new();
    peer.read_to_string(&mut received).expect("read until eof");
    assert_eq!(received, "<cmd='a' '>");
}
