use std::net::SocketAddr;
use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use shared::protocol::{PushAck, PushPacket, PUSH_TYPE_DOM, PUSH_TYPE_DUMP, PUSH_TYPE_SERVICE};

const MAX_DATAGRAM: usize = 64 * 1024;

/// Events handed from the push receiver to the reactor
pub enum PushEvent {
    /// Raw service document delivered by the backend
    Service(String),
    /// Backend asked for a dump of the local cache
    Dump(oneshot::Sender<String>),
}

/// UDP listener for backend-initiated service updates. Its port is sent
/// along with every outbound query so the backend knows where to push.
pub struct PushReceiver {
    socket: UdpSocket,
    port: u16,
}

impl PushReceiver {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind push listener to {}", addr))?;
        let port = socket
            .local_addr()
            .context("Failed to read push listener address")?
            .port();

        tracing::info!("Push listener bound on port {}", port);
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run(self, tx: mpsc::Sender<PushEvent>, cancel: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer, &tx).await,
                        Err(e) => tracing::error!("Push listener receive error: {}", e),
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Push listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr, tx: &mpsc::Sender<PushEvent>) {
        let packet: PushPacket = match serde_json::from_slice(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(%peer, "Dropping undecodable push packet: {}", e);
                return;
            }
        };

        let mut ack = PushAck::for_packet(&packet);
        match packet.kind.as_str() {
            PUSH_TYPE_DOM | PUSH_TYPE_SERVICE => {
                tracing::debug!(%peer, "Received service push");
                // Unacked pushes are resent by the backend
                if let Err(e) = tx.send(PushEvent::Service(packet.data)).await {
                    tracing::error!("Failed to forward pushed service: {}", e);
                    return;
                }
            }
            PUSH_TYPE_DUMP => {
                let (reply, rx) = oneshot::channel();
                if let Err(e) = tx.send(PushEvent::Dump(reply)).await {
                    tracing::error!("Failed to forward dump request: {}", e);
                    return;
                }
                ack.data = rx.await.unwrap_or_default();
            }
            other => {
                tracing::warn!(%peer, kind = other, "Unknown push packet type");
            }
        }

        let ack = match serde_json::to_vec(&ack) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!("Failed to encode push ack: {}", e);
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&ack, peer).await {
            tracing::error!(%peer, "Failed to send push ack: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use shared::protocol::{ACK_DUMP, ACK_PUSH, ACK_UNKNOWN};

    async fn start() -> (u16, mpsc::Receiver<PushEvent>, CancellationToken) {
        let receiver = PushReceiver::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.port();
        assert_ne!(port, 0);

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        tokio::spawn(async move { receiver.run(tx, run_cancel).await });
        (port, rx, cancel)
    }

    async fn exchange(port: u16, packet: &str) -> PushAck {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(packet.as_bytes(), ("127.0.0.1", port)).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        serde_json::from_slice(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_service_push_is_forwarded_and_acked() {
        let (port, mut rx, cancel) = start().await;

        let ack = exchange(port, r#"{"type":"dom","data":"{\"name\":\"orders\"}","lastRefTime":7}"#).await;
        assert_eq!(ack.kind, ACK_PUSH);
        assert_eq!(ack.last_ref_time, 7);

        match rx.recv().await.unwrap() {
            PushEvent::Service(raw) => assert_eq!(raw, r#"{"name":"orders"}"#),
            PushEvent::Dump(_) => panic!("expected service event"),
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_dump_is_answered_from_reactor() {
        let (port, mut rx, cancel) = start().await;

        tokio::spawn(async move {
            if let Some(PushEvent::Dump(reply)) = rx.recv().await {
                let _ = reply.send("{}".to_string());
            }
        });

        let ack = exchange(port, r#"{"type":"dump","lastRefTime":1}"#).await;
        assert_eq!(ack.kind, ACK_DUMP);
        assert_eq!(ack.data, "{}");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_type_is_acked_but_not_forwarded() {
        let (port, mut rx, cancel) = start().await;

        let ack = exchange(port, r#"{"type":"ping","lastRefTime":3}"#).await;
        assert_eq!(ack.kind, ACK_UNKNOWN);
        assert!(rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_push_is_not_acked_when_forwarding_fails() {
        let (port, rx, cancel) = start().await;
        drop(rx);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(br#"{"type":"dom","data":"{}","lastRefTime":5}"#, ("127.0.0.1", port))
            .await
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let reply = tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "push was acked although it was never forwarded");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_garbage_is_dropped_and_listener_keeps_running() {
        let (port, mut rx, cancel) = start().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"not json", ("127.0.0.1", port)).await.unwrap();

        let ack = exchange(port, r#"{"type":"service","data":"x","lastRefTime":9}"#).await;
        assert_eq!(ack.kind, ACK_PUSH);
        assert!(matches!(rx.recv().await, Some(PushEvent::Service(_))));
        cancel.cancel();
    }
}
