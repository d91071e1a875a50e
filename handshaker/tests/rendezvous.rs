//! End-to-end: a real handshaker pairing two peer connections over loopback

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use magnet_core::{
    ConnectionConfig, Greeting, Message, MessageRegistry, MessageType, PeerConnection,
    RendezvousTarget, TypedMessage, register_builtin,
};
use magnet_handshaker::{RendezvousConfig, RendezvousServer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Move {
    x: i32,
    y: i32,
}

impl TypedMessage for Move {
    const MESSAGE_TYPE: MessageType = MessageType(300);
}

struct RunningServer {
    addr: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<RendezvousServer>>,
}

impl RunningServer {
    fn start() -> Self {
        let mut server = RendezvousServer::bind(&RendezvousConfig::new("127.0.0.1:0")).unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = server.local_addr().to_string();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                server.serve_one().unwrap();
            }
            server
        });

        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }

    /// Stop serving and hand back the server for inspection
    fn stop(mut self) -> RendezvousServer {
        self.stop.store(true, Ordering::Release);
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn registry() -> Arc<MessageRegistry> {
    let mut registry = MessageRegistry::new();
    register_builtin(&mut registry);
    registry.register::<Move>();
    Arc::new(registry)
}

fn config(name: &str) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(name).with_local_addr("127.0.0.1:0");
    config.read_timeout = Duration::from_millis(10);
    config
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn collect_for(conn: &mut PeerConnection, duration: Duration) -> Vec<Box<dyn Message>> {
    let start = Instant::now();
    let mut out = Vec::new();
    while start.elapsed() < duration {
        out.extend(conn.drain());
        thread::sleep(Duration::from_millis(5));
    }
    out
}

fn assert_paired(a: &PeerConnection, b: &PeerConnection) {
    assert!(
        wait_until(Duration::from_secs(3), || a.connected() && b.connected()),
        "peers should connect: {:?} / {:?}",
        a,
        b
    );
    assert_eq!(a.remote_addr(), Some(b.local_addr()));
    assert_eq!(b.remote_addr(), Some(a.local_addr()));
}

#[test]
fn test_search_for_registered_peer() {
    let server = RunningServer::start();

    let mut alice = PeerConnection::rendezvous(
        config("alice"),
        RendezvousTarget::wait(&server.addr),
        registry(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(1), || alice.rendezvous_alive()));

    let mut bob = PeerConnection::rendezvous(
        config("bob"),
        RendezvousTarget::search(&server.addr, "alice"),
        registry(),
    )
    .unwrap();

    assert_paired(&alice, &bob);

    let greetings: Vec<String> = collect_for(&mut alice, Duration::from_millis(100))
        .iter()
        .filter_map(|m| m.downcast_ref::<Greeting>())
        .map(|g| g.text.clone())
        .collect();
    assert!(greetings.contains(&"hai from bob".to_string()));

    alice.send(&Move { x: 3, y: -4 }).unwrap();
    let received = collect_for(&mut bob, Duration::from_millis(150));
    let moves: Vec<&Move> = received
        .iter()
        .filter_map(|m| m.downcast_ref::<Move>())
        .collect();
    assert_eq!(moves, vec![&Move { x: 3, y: -4 }]);

    let server = server.stop();
    assert!(server.table().is_empty());
}

#[test]
fn test_search_before_target_registers() {
    let server = RunningServer::start();

    let bob = PeerConnection::rendezvous(
        config("bob"),
        RendezvousTarget::search(&server.addr, "alice"),
        registry(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(1), || bob.rendezvous_alive()));
    thread::sleep(Duration::from_millis(50));
    assert!(!bob.connected());

    let alice = PeerConnection::rendezvous(
        config("alice"),
        RendezvousTarget::wait(&server.addr),
        registry(),
    )
    .unwrap();

    assert_paired(&alice, &bob);
    let server = server.stop();
    assert!(server.table().is_empty());
}

#[test]
fn test_mutual_search() {
    let server = RunningServer::start();

    let alice = PeerConnection::rendezvous(
        config("alice"),
        RendezvousTarget::search(&server.addr, "bob"),
        registry(),
    )
    .unwrap();
    let bob = PeerConnection::rendezvous(
        config("bob"),
        RendezvousTarget::search(&server.addr, "alice"),
        registry(),
    )
    .unwrap();

    assert_paired(&alice, &bob);
    // Late Await from the second peer finds no record and leaves nothing behind
    thread::sleep(Duration::from_millis(50));
    let server = server.stop();
    assert!(server.table().is_empty());
}

#[test]
fn test_unmatched_peer_stays_registered() {
    let server = RunningServer::start();

    let carol = PeerConnection::rendezvous(
        config("carol"),
        RendezvousTarget::search(&server.addr, "nobody"),
        registry(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(1), || carol.rendezvous_alive()));
    thread::sleep(Duration::from_millis(50));

    let local = carol.local_addr();
    let server = server.stop();
    let record = server.table().get(&local.into()).unwrap();
    assert_eq!(record.name, "carol");
    assert!(record.waiting_for.contains("nobody"));
    assert!(!carol.connected());
}
