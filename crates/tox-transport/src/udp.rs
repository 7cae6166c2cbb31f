//! A UDP-backed `Transport`.
//!
//! Tox's real network mixes UDP (primary) and TCP (relay fallback); this
//! crate only needs one concrete implementation to exercise the contract
//! end-to-end, so UDP is it. The wire format per datagram is simply
//! `[tag:1][payload...]` — `tox-crypto`/`tox-messaging` are responsible
//! for anything the payload needs to carry (nonces, lengths, etc.).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tox_types::traits::Addr;

use crate::{BoxFuture, Handler, Packet, Result, Transport, TransportError};

/// Largest single datagram this transport will send or accept.
const MAX_DATAGRAM: usize = 2048;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: Addr,
    handlers: Arc<RwLock<HashMap<u8, Handler>>>,
    cancellation: CancellationToken,
    recv_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind to `bind_addr` and start the background receive loop.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let local = socket.local_addr().map_err(|e| TransportError::Io(e.to_string()))?;

        let socket = Arc::new(socket);
        let handlers: Arc<RwLock<HashMap<u8, Handler>>> = Arc::new(RwLock::new(HashMap::new()));
        let cancellation = CancellationToken::new();

        let recv_task = spawn_recv_loop(socket.clone(), handlers.clone(), cancellation.clone());

        Ok(Self {
            socket,
            local_addr: local.to_string(),
            handlers,
            cancellation,
            recv_task: AsyncMutex::new(Some(recv_task)),
            closed: AtomicBool::new(false),
        })
    }
}

fn spawn_recv_loop(
    socket: Arc<UdpSocket>,
    handlers: Arc<RwLock<HashMap<u8, Handler>>>,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("udp transport receive loop cancelled");
                    break;
                }
                recv = socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, from)) if len >= 1 => {
                            let tag = buf[0];
                            let payload = buf[1..len].to_vec();
                            let handler = handlers.read().expect("handlers lock").get(&tag).cloned();
                            if let Some(handler) = handler {
                                let packet = Packet::new(tag, payload);
                                let from_addr = from.to_string();
                                tokio::spawn(async move {
                                    if let Err(e) = handler(packet, from_addr).await {
                                        tracing::warn!(error = %e, "packet handler returned an error");
                                    }
                                });
                            } else {
                                tracing::trace!(tag, "dropped packet with no registered handler");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "udp recv_from failed");
                        }
                    }
                }
            }
        }
    })
}

impl Transport for UdpTransport {
    fn send<'a>(&'a self, packet: Packet, addr: &'a Addr) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            let target: SocketAddr = addr
                .parse()
                .map_err(|_| TransportError::NoRoute(addr.clone()))?;

            let mut datagram = Vec::with_capacity(1 + packet.bytes.len());
            datagram.push(packet.tag);
            datagram.extend_from_slice(&packet.bytes);

            self.socket
                .send_to(&datagram, target)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            Ok(())
        })
    }

    fn register_handler(&self, tag: u8, handler: Handler) {
        self.handlers.write().expect("handlers lock").insert(tag, handler);
    }

    fn local_addr(&self) -> Addr {
        self.local_addr.clone()
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            self.cancellation.cancel();
            if let Some(task) = self.recv_task.lock().await.take() {
                let _ = task.await;
            }
            Ok(())
        })
    }

    fn is_connection_oriented(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let alice = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.expect("bind alice");
        let bob = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.expect("bind bob");
        let bob_addr = bob.local_addr();

        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bob.register_handler(
            0x01,
            Arc::new(move |packet, _addr| {
                let received = received2.clone();
                Box::pin(async move {
                    assert_eq!(packet.bytes, vec![9, 9, 9]);
                    received.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        alice
            .send(Packet::new(0x01, vec![9, 9, 9]), &bob_addr)
            .await
            .expect("send");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);

        alice.close().await.expect("close alice");
        bob.close().await.expect("close bob");
    }

    #[tokio::test]
    async fn closed_transport_rejects_sends() {
        let t = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.expect("bind");
        t.close().await.expect("close");

        let err = t
            .send(Packet::new(0x01, vec![]), &"127.0.0.1:9".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
