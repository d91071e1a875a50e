//! Registration table: the handshaker's only state
//!
//! Pure matching logic with no I/O. Every inbound packet goes through
//! [`RegistrationTable::handle`], which returns the packets to send back.
//! Time is passed in so eviction can be tested without sleeping.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use magnet_shared::{AddressKey, HandshakePacket};
use smallvec::{SmallVec, smallvec};

/// Per-client record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBox {
    /// Display name from the latest Register
    pub name: String,
    /// Names this client asked to be paired with
    pub waiting_for: HashSet<String>,
    /// Time of the latest Register
    pub registered_at: Instant,
    /// Observed source address, where Arrived is sent
    pub addr: SocketAddr,
}

impl MessageBox {
    fn new(name: String, addr: SocketAddr, now: Instant) -> Self {
        Self {
            name,
            waiting_for: HashSet::new(),
            registered_at: now,
            addr,
        }
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.registered_at)
    }
}

/// A packet the server should send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: SocketAddr,
    pub packet: HandshakePacket,
}

impl Outbound {
    fn new(to: SocketAddr, packet: HandshakePacket) -> Self {
        Self { to, packet }
    }
}

/// Replies for one inbound packet: the Ack plus two Arrived per pairing.
///
/// Inline room covers the common single pairing; a Register that serves
/// several waiters spills to the heap.
pub type Replies = SmallVec<[Outbound; 5]>;

/// Registered clients keyed by their observed address
#[derive(Debug)]
pub struct RegistrationTable {
    boxes: HashMap<AddressKey, MessageBox>,
    idle_timeout: Duration,
}

impl RegistrationTable {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            boxes: HashMap::new(),
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, key: &AddressKey) -> Option<&MessageBox> {
        self.boxes.get(key)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Process one inbound packet.
    ///
    /// The first reply is always an Ack to the sender, whether or not the
    /// packet parses.
    pub fn handle(&mut self, from: SocketAddr, bytes: &[u8], now: Instant) -> Replies {
        let mut replies: Replies = smallvec![Outbound::new(from, HandshakePacket::Ack)];

        self.sweep(now);

        let packet = match HandshakePacket::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(%from, error = %e, "Dropping malformed packet");
                return replies;
            }
        };

        let key = AddressKey::from(from);
        match packet {
            HandshakePacket::Register { name } => {
                replies.extend(self.register(key, from, name, now));
            }
            HandshakePacket::Await { target } => {
                if let Some((a, b)) = self.await_peer(key, target) {
                    replies.extend(self.resolve(&a, &b));
                }
            }
            other => {
                tracing::debug!(%from, code = ?other.code(), "Ignoring client-bound packet");
            }
        }
        replies
    }

    /// Evict every record older than the idle timeout
    pub fn sweep(&mut self, now: Instant) -> usize {
        let idle_timeout = self.idle_timeout;
        let before = self.boxes.len();
        self.boxes.retain(|key, mb| {
            let keep = mb.age(now) <= idle_timeout;
            if !keep {
                tracing::info!(%key, name = %mb.name, "cleaned up");
            }
            keep
        });
        before - self.boxes.len()
    }

    fn register(
        &mut self,
        key: AddressKey,
        from: SocketAddr,
        name: String,
        now: Instant,
    ) -> Replies {
        tracing::info!(%key, %name, "Registered");
        self.boxes.remove(&key);
        self.boxes
            .insert(key.clone(), MessageBox::new(name.clone(), from, now));

        // Every waiter is served, oldest first
        let mut waiters: Vec<(Instant, AddressKey)> = self
            .boxes
            .iter()
            .filter(|(other, mb)| **other != key && mb.waiting_for.contains(&name))
            .map(|(other, mb)| (mb.registered_at, other.clone()))
            .collect();
        if waiters.is_empty() {
            return Replies::new();
        }
        waiters.sort();

        let Some(registrant) = self.boxes.remove(&key) else {
            return Replies::new();
        };

        let mut replies = Replies::new();
        for (_, waiter_key) in waiters {
            let Some(waiter) = self.boxes.remove(&waiter_key) else {
                continue;
            };
            tracing::info!(
                first = %waiter.name,
                first_addr = %waiter_key,
                second = %registrant.name,
                second_addr = %key,
                "Paired"
            );
            replies.push(Outbound::new(
                waiter.addr,
                HandshakePacket::Arrived { peer: key.clone() },
            ));
            replies.push(Outbound::new(
                registrant.addr,
                HandshakePacket::Arrived { peer: waiter_key },
            ));
        }
        replies
    }

    fn await_peer(&mut self, key: AddressKey, target: String) -> Option<(AddressKey, AddressKey)> {
        if !self.boxes.contains_key(&key) {
            tracing::debug!(%key, %target, "Await from unregistered client");
            return None;
        }

        let found = self
            .boxes
            .iter()
            .filter(|(other, mb)| **other != key && mb.name == target)
            .max_by(|(ka, a), (kb, b)| a.registered_at.cmp(&b.registered_at).then(kb.cmp(ka)))
            .map(|(other, _)| other.clone());

        match found {
            Some(other) => Some((key, other)),
            None => {
                if let Some(mb) = self.boxes.get_mut(&key)
                    && mb.waiting_for.insert(target.clone())
                {
                    tracing::info!(%key, %target, "Waiting");
                }
                None
            }
        }
    }

    /// Forget both parties and tell each where the other is
    fn resolve(&mut self, a: &AddressKey, b: &AddressKey) -> Replies {
        let (Some(first), Some(second)) = (self.boxes.remove(a), self.boxes.remove(b)) else {
            return Replies::new();
        };

        tracing::info!(
            first = %first.name,
            first_addr = %a,
            second = %second.name,
            second_addr = %b,
            "Paired"
        );

        smallvec![
            Outbound::new(
                first.addr,
                HandshakePacket::Arrived { peer: b.clone() }
            ),
            Outbound::new(
                second.addr,
                HandshakePacket::Arrived { peer: a.clone() }
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(30);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn register(name: &str) -> Vec<u8> {
        HandshakePacket::Register {
            name: name.to_string(),
        }
        .to_bytes()
    }

    fn await_packet(target: &str) -> Vec<u8> {
        HandshakePacket::Await {
            target: target.to_string(),
        }
        .to_bytes()
    }

    fn arrived(to: SocketAddr, peer: SocketAddr) -> Outbound {
        Outbound::new(to, HandshakePacket::Arrived { peer: peer.into() })
    }

    #[test]
    fn test_register_creates_one_box_and_acks() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        let replies = table.handle(addr(1), &register("alice"), now);
        assert_eq!(replies.as_slice(), &[Outbound::new(addr(1), HandshakePacket::Ack)]);
        assert_eq!(table.len(), 1);

        let mb = table.get(&addr(1).into()).unwrap();
        assert_eq!(mb.name, "alice");
        assert!(mb.waiting_for.is_empty());
        assert_eq!(mb.registered_at, now);
    }

    #[test]
    fn test_malformed_packets_only_ack() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        for bytes in [
            &b""[..],
            &b"hello"[..],
            &b"9 x"[..],
            &b"1"[..],
            &b"\xff\xfe"[..],
            &b"{\"Type\":1}"[..],
        ] {
            let replies = table.handle(addr(1), bytes, now);
            assert_eq!(replies.as_slice(), &[Outbound::new(addr(1), HandshakePacket::Ack)]);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_reregister_keeps_one_box_with_latest_name() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        let later = now + Duration::from_secs(5);
        table.handle(addr(1), &register("alicia"), later);

        assert_eq!(table.len(), 1);
        let mb = table.get(&addr(1).into()).unwrap();
        assert_eq!(mb.name, "alicia");
        assert_eq!(mb.registered_at, later);
    }

    #[test]
    fn test_reregister_clears_wait_set() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &await_packet("bob"), now);
        assert!(table.get(&addr(1).into()).unwrap().waiting_for.contains("bob"));

        table.handle(addr(1), &register("alice"), now);
        assert!(table.get(&addr(1).into()).unwrap().waiting_for.is_empty());
    }

    #[test]
    fn test_await_present_target_pairs_immediately() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(2), &register("bob"), now);
        let replies = table.handle(addr(2), &await_packet("alice"), now);

        assert_eq!(
            replies.as_slice(),
            &[
                Outbound::new(addr(2), HandshakePacket::Ack),
                arrived(addr(2), addr(1)),
                arrived(addr(1), addr(2)),
            ]
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_await_before_target_registers() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        let replies = table.handle(addr(1), &await_packet("bob"), now);
        assert_eq!(replies.len(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(1).into()).unwrap().waiting_for.contains("bob"));

        let replies = table.handle(addr(2), &register("bob"), now);
        assert_eq!(
            replies.as_slice(),
            &[
                Outbound::new(addr(2), HandshakePacket::Ack),
                arrived(addr(1), addr(2)),
                arrived(addr(2), addr(1)),
            ]
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_repeated_await_is_idempotent() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &await_packet("bob"), now);
        table.handle(addr(1), &await_packet("bob"), now);
        table.handle(addr(1), &await_packet("carol"), now);

        let mb = table.get(&addr(1).into()).unwrap();
        assert_eq!(mb.waiting_for.len(), 2);
    }

    #[test]
    fn test_await_from_unregistered_is_ignored() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        let replies = table.handle(addr(2), &await_packet("alice"), now);

        assert_eq!(replies.as_slice(), &[Outbound::new(addr(2), HandshakePacket::Ack)]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(2).into()).is_none());
    }

    #[test]
    fn test_await_never_matches_self() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        let replies = table.handle(addr(1), &await_packet("alice"), now);

        assert_eq!(replies.len(), 1);
        assert!(table.get(&addr(1).into()).unwrap().waiting_for.contains("alice"));
    }

    #[test]
    fn test_register_serves_every_waiter() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &await_packet("bob"), now);
        let later = now + Duration::from_secs(1);
        table.handle(addr(2), &register("carol"), later);
        table.handle(addr(2), &await_packet("bob"), later);

        let replies = table.handle(addr(3), &register("bob"), later);
        assert_eq!(replies[0], Outbound::new(addr(3), HandshakePacket::Ack));
        assert_eq!(
            &replies[1..],
            &[
                arrived(addr(1), addr(3)),
                arrived(addr(3), addr(1)),
                arrived(addr(2), addr(3)),
                arrived(addr(3), addr(2)),
            ]
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_ignores_waiters_for_other_names() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &await_packet("bob"), now);
        table.handle(addr(2), &register("carol"), now);
        table.handle(addr(2), &await_packet("dave"), now);

        let replies = table.handle(addr(3), &register("bob"), now);
        assert_eq!(replies.len(), 3);
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(2).into()).unwrap().waiting_for.contains("dave"));
    }

    #[test]
    fn test_sweep_evicts_idle_boxes_on_any_packet() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(2), &register("bob"), now + Duration::from_secs(20));

        // Exactly at the threshold is kept
        table.handle(addr(9), b"garbage", now + IDLE);
        assert_eq!(table.len(), 2);

        table.handle(addr(9), b"garbage", now + IDLE + Duration::from_millis(1));
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(1).into()).is_none());
        assert!(table.get(&addr(2).into()).is_some());
    }

    #[test]
    fn test_reregister_refreshes_age() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &register("alice"), now + Duration::from_secs(25));
        assert_eq!(table.sweep(now + Duration::from_secs(40)), 0);
        assert_eq!(table.sweep(now + Duration::from_secs(56)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_evicted_waiter_is_not_paired() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        table.handle(addr(1), &register("alice"), now);
        table.handle(addr(1), &await_packet("bob"), now);

        let replies = table.handle(addr(2), &register("bob"), now + Duration::from_secs(31));
        assert_eq!(replies.len(), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&addr(2).into()).unwrap().name, "bob");
    }

    #[test]
    fn test_client_bound_packets_are_ignored() {
        let mut table = RegistrationTable::new(IDLE);
        let now = Instant::now();

        let hello = HandshakePacket::Hello {
            name: "alice".to_string(),
        };
        let replies = table.handle(addr(1), &hello.to_bytes(), now);
        assert_eq!(replies.len(), 1);
        assert!(table.is_empty());
    }
}
