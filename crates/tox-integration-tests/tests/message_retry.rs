//! Scenario: a message send that fails once is retried after the
//! configured backoff and ends up delivered, without exceeding the
//! configured retry budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tox_crypto::x25519::X25519StaticSecret;
use tox_transport::memory::{MemoryNetwork, MemoryTransport};
use tox_transport::Transport;
use tox_types::identity::KeyPair;
use tox_types::message::{MessageState, MessageType};
use tox_types::traits::TimeProvider;

use tox_runtime::{Runtime, RuntimeConfig};

struct MockTime(AtomicU64);
impl TimeProvider for MockTime {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
impl MockTime {
    fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
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
async fn send_retried_after_a_transient_failure_then_delivered() {
    let net = MemoryNetwork::new();
    let alice_transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
    let _bob_transport = MemoryTransport::new(net.clone(), "bob".to_string());
    net.fail("bob".to_string());

    let time = Arc::new(MockTime(AtomicU64::new(0)));
    let runtime = Runtime::new(RuntimeConfig::default(), identity(), time.clone(), alice_transport).expect("runtime builds");

    let bob_friend_id = runtime.friends.add_friend(identity().public).expect("add friend");
    runtime.address_book.set(bob_friend_id, "bob".to_string());

    let message = runtime.messaging.send(bob_friend_id, "ping", MessageType::Normal).await.expect("send");
    runtime.messaging.flush().await;

    let after_first = runtime.messaging.get(message.id).expect("get");
    assert_eq!(after_first.state, MessageState::Pending);
    assert_eq!(after_first.retry_count, 1);

    net.clear_failure(&"bob".to_string());
    time.advance(5_000);
    runtime.tick().await;

    let after_second = runtime.messaging.get(message.id).expect("get");
    assert_eq!(after_second.state, MessageState::Sent);
    assert_eq!(after_second.retry_count, 1);
}
