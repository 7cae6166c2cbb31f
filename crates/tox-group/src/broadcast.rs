//! The group broadcast worker pool (§4.3 "Broadcast (the hard part)",
//! §9 "Parallel broadcast"). A bounded set of workers drains a job queue
//! of recipients; each job tries the peer's cached address first, then
//! falls back to up to [`BROADCAST_DHT_FANOUT`] DHT-closest nodes.
//! Results are aggregated on a single channel so callbacks are invoked
//! exactly once per recipient, after every worker has finished and with
//! no lock held.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use tox_dht::Dht;
use tox_transport::{packet, Packet, Transport};
use tox_types::group::{PeerId, BROADCAST_DHT_FANOUT, BROADCAST_WORKER_CAP};
use tox_types::traits::Addr;

use crate::{GroupError, Result};

pub type SuccessCallback = Arc<dyn Fn(PeerId) + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(PeerId, GroupError) + Send + Sync>;

/// A broadcast recipient, snapshotted out of the group's peer table
/// before fan-out so the worker pool never touches the peer lock.
#[derive(Clone)]
pub struct Recipient {
    pub peer_id: PeerId,
    pub public_key: [u8; 32],
    pub cached_address: Option<Addr>,
}

struct JobResult {
    peer_id: PeerId,
    outcome: std::result::Result<(), GroupError>,
}

async fn deliver(
    recipient: &Recipient,
    payload: &[u8],
    transport: &dyn Transport,
    dht: Option<&dyn Dht>,
) -> std::result::Result<(), GroupError> {
    if let Some(addr) = &recipient.cached_address {
        if transport.send(Packet::new(packet::GROUP_BROADCAST, payload.to_vec()), addr).await.is_ok() {
            return Ok(());
        }
    }

    let Some(dht) = dht else {
        return Err(GroupError::Transport(tox_transport::TransportError::NoRoute(format!(
            "peer {} (no DHT configured for fallback)",
            recipient.peer_id
        ))));
    };

    let target = tox_crypto::blake3::hash(&recipient.public_key);
    for node in dht.find_closest_nodes(target, BROADCAST_DHT_FANOUT) {
        if transport.send(Packet::new(packet::GROUP_BROADCAST, payload.to_vec()), &node.address).await.is_ok() {
            return Ok(());
        }
    }
    Err(GroupError::Transport(tox_transport::TransportError::NoRoute(format!(
        "peer {} unreachable via cached address or DHT fallback",
        recipient.peer_id
    ))))
}

/// Fan `payload` out to `recipients` through a worker pool capped at
/// `min(recipients.len(), BROADCAST_WORKER_CAP)` (§4.3, §9). Zero
/// recipients is a valid, successful no-op (a solo group). `cancellation`
/// lets an in-flight broadcast be torn down cleanly; workers observe it
/// between jobs and mid-delivery.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    recipients: Vec<Recipient>,
    payload: Vec<u8>,
    transport: Arc<dyn Transport>,
    dht: Option<Arc<dyn Dht>>,
    cancellation: CancellationToken,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
) -> Result<()> {
    if recipients.is_empty() {
        return Ok(());
    }

    let pool_size = recipients.len().min(BROADCAST_WORKER_CAP);

    let (job_tx, job_rx) = mpsc::unbounded_channel::<Recipient>();
    for recipient in recipients {
        job_tx.send(recipient).expect("job channel is open for the duration of this call");
    }
    drop(job_tx);
    let job_rx = Arc::new(AsyncMutex::new(job_rx));

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobResult>();

    let mut workers = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let job_rx = job_rx.clone();
        let payload = payload.clone();
        let transport = transport.clone();
        let dht = dht.clone();
        let result_tx = result_tx.clone();
        let cancellation = cancellation.clone();
        workers.push(tokio::spawn(async move {
            loop {
                if cancellation.is_cancelled() {
                    break;
                }
                let Some(recipient) = job_rx.lock().await.recv().await else {
                    break;
                };
                let peer_id = recipient.peer_id;
                let outcome = tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => break,
                    outcome = deliver(&recipient, &payload, transport.as_ref(), dht.as_deref()) => outcome,
                };
                if result_tx.send(JobResult { peer_id, outcome }).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut successes = Vec::new();
    let mut failures: Vec<(PeerId, GroupError)> = Vec::new();
    while let Some(JobResult { peer_id, outcome }) = result_rx.recv().await {
        match outcome {
            Ok(()) => successes.push(peer_id),
            Err(e) => failures.push((peer_id, e)),
        }
    }

    for worker in workers {
        let _ = worker.await;
    }

    let total_successes = successes.len();
    let total_failures = failures.len();

    for peer_id in successes {
        if let Some(cb) = &on_success {
            let cb = cb.clone();
            if catch_unwind(AssertUnwindSafe(|| cb(peer_id))).is_err() {
                tracing::error!(peer_id, "broadcast on_success callback panicked");
            }
        }
    }
    for (peer_id, err) in failures {
        tracing::debug!(peer_id, error = %err, "group broadcast delivery failed");
        if let Some(cb) = &on_failure {
            let cb = cb.clone();
            if catch_unwind(AssertUnwindSafe(|| cb(peer_id, err))).is_err() {
                tracing::error!(peer_id, "broadcast on_failure callback panicked");
            }
        }
    }

    if total_successes == 0 && total_failures > 0 {
        return Err(GroupError::BroadcastFailed(format!(
            "all {total_failures} broadcast attempts failed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tox_transport::memory::{MemoryNetwork, MemoryTransport};

    fn recipient(peer_id: PeerId, addr: &str) -> Recipient {
        Recipient {
            peer_id,
            public_key: [peer_id as u8; 32],
            cached_address: Some(addr.to_string()),
        }
    }

    #[tokio::test]
    async fn empty_recipients_succeeds_trivially() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let result = run(vec![], vec![], transport, None, CancellationToken::new(), None, None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn partial_success_matches_seed_scenario() {
        let net = MemoryNetwork::new();
        let alice: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
        let _p2 = MemoryTransport::new(net.clone(), "p2".to_string());
        let _p3 = MemoryTransport::new(net.clone(), "p3".to_string());
        let _p4 = MemoryTransport::new(net.clone(), "p4".to_string());
        net.fail("p3".to_string());

        let recipients = vec![recipient(2, "p2"), recipient(3, "p3"), recipient(4, "p4")];

        let successes = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let successes2 = successes.clone();
        let failures2 = failures.clone();

        let result = run(
            recipients,
            b"payload".to_vec(),
            alice,
            None,
            CancellationToken::new(),
            Some(Arc::new(move |peer_id| successes2.lock().unwrap().push(peer_id))),
            Some(Arc::new(move |peer_id, _err| failures2.lock().unwrap().push(peer_id))),
        )
        .await;

        assert!(result.is_ok());
        let mut ok_ids = successes.lock().unwrap().clone();
        ok_ids.sort();
        assert_eq!(ok_ids, vec![2, 4]);
        assert_eq!(failures.lock().unwrap().clone(), vec![3]);
    }

    #[tokio::test]
    async fn total_failure_is_aggregated() {
        let net = MemoryNetwork::new();
        let alice: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
        net.fail("ghost".to_string());

        let recipients = vec![recipient(9, "ghost")];
        let result = run(recipients, vec![], alice, None, CancellationToken::new(), None, None).await;
        assert!(matches!(result, Err(GroupError::BroadcastFailed(_))));
    }

    #[tokio::test]
    async fn worker_pool_caps_concurrency_at_ten() {
        let net = MemoryNetwork::new();
        let alice: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));

        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut recipients = Vec::new();
        let mut peer_transports = Vec::new();
        for i in 0..30u32 {
            let name = format!("peer{i}");
            let peer = MemoryTransport::new(net.clone(), name.clone());
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            peer.register_handler(
                packet::GROUP_BROADCAST,
                tox_transport::memory::handler(move |_packet, _addr| {
                    let concurrent = concurrent.clone();
                    let max_concurrent = max_concurrent.clone();
                    async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_concurrent.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
            peer_transports.push(peer);
            recipients.push(recipient(i, &name));
        }

        let result = run(recipients, vec![], alice, None, CancellationToken::new(), None, None).await;
        assert!(result.is_ok());
        assert!(max_concurrent.load(Ordering::SeqCst) <= BROADCAST_WORKER_CAP);
    }
}
