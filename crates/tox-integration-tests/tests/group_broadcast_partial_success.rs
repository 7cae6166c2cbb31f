//! Scenario: broadcasting to a group with one unreachable peer succeeds
//! overall, reports that one peer's failure separately, and still
//! delivers to everyone else.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use tox_crypto::x25519::X25519StaticSecret;
use tox_transport::memory::{MemoryNetwork, MemoryTransport};
use tox_transport::Transport;
use tox_types::group::{ChatType, Peer, PeerConnection, Privacy, Role};
use tox_types::identity::KeyPair;
use tox_types::traits::TimeProvider;

use tox_runtime::{Runtime, RuntimeConfig};

struct MockTime(AtomicU64);
impl TimeProvider for MockTime {
    fn now_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

fn identity() -> KeyPair {
    let sk = X25519StaticSecret::random();
    KeyPair {
        public: sk.public_key().to_bytes(),
        private: sk.to_bytes(),
    }
}

#[tokio::test]
async fn message_reaches_reachable_peers_despite_one_unreachable_peer() {
    let net = MemoryNetwork::new();
    let alice_transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
    let _p2 = MemoryTransport::new(net.clone(), "p2".to_string());
    let _p3 = MemoryTransport::new(net.clone(), "p3".to_string());
    let _p4 = MemoryTransport::new(net.clone(), "p4".to_string());
    net.fail("p3".to_string());

    let time = Arc::new(MockTime(AtomicU64::new(0)));
    let runtime = Runtime::new(RuntimeConfig::default(), identity(), time, alice_transport).expect("runtime builds");

    let group_id = runtime.groups.create("family", ChatType::Text, Privacy::Public).await.expect("create group");
    for (peer_id, addr) in [(2u32, "p2"), (3, "p3"), (4, "p4")] {
        runtime
            .groups
            .add_peer(
                group_id,
                Peer {
                    peer_id,
                    display_name: String::new(),
                    role: Role::User,
                    connection: PeerConnection::Udp,
                    public_key: [peer_id as u8; 32],
                    cached_address: Some(addr.to_string()),
                    last_active: 0,
                },
            )
            .expect("add peer");
    }

    let successes = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let s2 = successes.clone();
    let f2 = failures.clone();

    let result = runtime
        .groups
        .send_message(
            group_id,
            "dinner at 7",
            Some(Arc::new(move |peer_id| s2.lock().unwrap().push(peer_id))),
            Some(Arc::new(move |peer_id, _err| f2.lock().unwrap().push(peer_id))),
        )
        .await;

    assert!(result.is_ok());
    let mut ok_ids = successes.lock().unwrap().clone();
    ok_ids.sort();
    assert_eq!(ok_ids, vec![2, 4]);
    assert_eq!(failures.lock().unwrap().clone(), vec![3]);
}
