//! Cross-thread behaviour of the loopback transport.
//!
//! The inline tests in `loopback.rs` cover single-threaded semantics; these
//! check that blocking calls wake up when another thread changes state.

use crossbeam_channel::bounded;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use srtnet_x::loopback::LoopbackTransport;
use srtnet_x::{
    ConnectionHandle, MsgCtrl, PollEvents, SocketOption, Transport, TransportError,
};

const WAIT: Duration = Duration::from_secs(5);

fn started() -> Arc<LoopbackTransport> {
    let transport = Arc::new(LoopbackTransport::new());
    transport.startup().unwrap();
    transport
}

fn listen(transport: &LoopbackTransport, addr: &str) -> (ConnectionHandle, SocketAddr) {
    let listener = transport.create_socket().unwrap();
    transport.bind(listener, addr.parse().unwrap()).unwrap();
    transport.listen(listener, 8).unwrap();
    (listener, transport.local_addr(listener).unwrap())
}

fn pair(transport: &LoopbackTransport) -> (ConnectionHandle, ConnectionHandle) {
    let (listener, addr) = listen(transport, "127.0.0.1:0");
    let client = transport.create_socket().unwrap();
    transport.connect(client, addr).unwrap();
    let (server, _) = transport.accept(listener).unwrap();
    (client, server)
}

#[test]
fn test_accept_wakes_on_connect_from_other_thread() {
    let transport = started();
    let (listener, addr) = listen(&transport, "127.0.0.1:0");

    let (tx, rx) = bounded(1);
    let acceptor = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let _ = tx.send(transport.accept(listener));
        })
    };

    thread::sleep(Duration::from_millis(50));
    let client = transport.create_socket().unwrap();
    transport.connect(client, addr).unwrap();

    let (_, peer) = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(peer, transport.local_addr(client).unwrap());
    acceptor.join().unwrap();
}

#[test]
fn test_close_unblocks_receive_on_other_thread() {
    let transport = started();
    let (client, server) = pair(&transport);

    let (tx, rx) = bounded(1);
    let receiver = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            let _ = tx.send(transport.recv_msg(server, &mut buf).map(|(n, _)| n));
        })
    };

    thread::sleep(Duration::from_millis(50));
    transport.close(server).unwrap();

    let result = rx.recv_timeout(WAIT).unwrap();
    // InvalidHandle only if the close won the race into recv_msg.
    assert!(matches!(
        result,
        Err(TransportError::Closed(h)) | Err(TransportError::InvalidHandle(h)) if h == server
    ));
    receiver.join().unwrap();

    // The other end sees the link go down.
    let mut buf = [0u8; 64];
    assert!(matches!(
        transport.recv_msg(client, &mut buf),
        Err(TransportError::ConnectionLost(_))
    ));
}

#[test]
fn test_poll_wait_wakes_before_timeout() {
    let transport = started();
    let (client, server) = pair(&transport);
    let poll = transport.poll_create().unwrap();
    transport.poll_add(poll, server, PollEvents::IN_ERR).unwrap();

    let (tx, rx) = bounded(1);
    let waiter = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let mut events = Vec::new();
            let started = Instant::now();
            let n = transport
                .poll_wait(poll, &mut events, 20, Duration::from_secs(10))
                .unwrap();
            let _ = tx.send((n, events, started.elapsed()));
        })
    };

    thread::sleep(Duration::from_millis(50));
    transport
        .send_msg(client, b"wake", &MsgCtrl::default())
        .unwrap();

    let (n, events, elapsed) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(n, 1);
    assert_eq!(events[0].handle, server);
    assert!(events[0].readable);
    assert!(elapsed < Duration::from_secs(5));
    waiter.join().unwrap();
}

#[test]
fn test_poll_wait_honours_timeout() {
    let transport = started();
    let (_client, server) = pair(&transport);
    let poll = transport.poll_create().unwrap();
    transport.poll_add(poll, server, PollEvents::IN_ERR).unwrap();

    let mut events = Vec::new();
    let started = Instant::now();
    let n = transport
        .poll_wait(poll, &mut events, 20, Duration::from_millis(100))
        .unwrap();
    assert_eq!(n, 0);
    assert!(events.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_listener_close_wakes_error_only_interest() {
    let transport = started();
    let (listener, _) = listen(&transport, "127.0.0.1:0");
    let poll = transport.poll_create().unwrap();
    transport.poll_add(poll, listener, PollEvents::ERR).unwrap();

    let (tx, rx) = bounded(1);
    let waiter = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let mut events = Vec::new();
            let n = transport
                .poll_wait(poll, &mut events, 20, Duration::from_secs(10))
                .unwrap();
            let _ = tx.send((n, events));
        })
    };

    thread::sleep(Duration::from_millis(50));
    transport.close(listener).unwrap();

    let (n, events) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(n, 1);
    assert_eq!(events[0].handle, listener);
    assert!(events[0].error);
    assert!(!events[0].readable);
    waiter.join().unwrap();
}

#[test]
fn test_cleanup_unblocks_and_invalidates() {
    let transport = started();
    let (listener, _) = listen(&transport, "127.0.0.1:0");

    let (tx, rx) = bounded(1);
    let acceptor = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let _ = tx.send(transport.accept(listener));
        })
    };

    thread::sleep(Duration::from_millis(50));
    transport.cleanup().unwrap();

    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        Err(TransportError::NotInitialized)
    ));
    acceptor.join().unwrap();
    assert_eq!(transport.open_sockets(), 0);
    assert!(matches!(
        transport.create_socket(),
        Err(TransportError::NotInitialized)
    ));
}

#[test]
fn test_concurrent_senders_keep_message_boundaries() {
    let transport = started();
    let (listener, addr) = listen(&transport, "127.0.0.1:0");

    let mut senders = Vec::new();
    let mut servers = Vec::new();
    for id in 0..4u8 {
        let client = transport.create_socket().unwrap();
        transport.connect(client, addr).unwrap();
        let (server, _) = transport.accept(listener).unwrap();
        servers.push((id, server));

        let transport = Arc::clone(&transport);
        senders.push(thread::spawn(move || {
            for n in 0..50u8 {
                let payload = vec![id; n as usize + 1];
                transport
                    .send_msg(client, &payload, &MsgCtrl::default())
                    .unwrap();
            }
        }));
    }
    for sender in senders {
        sender.join().unwrap();
    }

    let mut buf = [0u8; 128];
    for (id, server) in servers {
        for n in 0..50usize {
            let (len, ctrl) = transport.recv_msg(server, &mut buf).unwrap();
            assert_eq!(len, n + 1);
            assert!(buf[..len].iter().all(|&b| b == id));
            assert_eq!(ctrl.msg_no as usize, n + 1);
        }
    }
}

#[test]
fn test_options_locked_after_connect() {
    let transport = started();
    let (client, _server) = pair(&transport);
    assert!(matches!(
        transport.set_option(client, SocketOption::PayloadSize(100)),
        Err(TransportError::InvalidOption { .. })
    ));
    transport
        .set_option(client, SocketOption::ReceiveBlocking(false))
        .unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(
        transport.recv_msg(client, &mut buf),
        Err(TransportError::InvalidState { .. })
    ));
}
