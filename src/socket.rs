// ABOUTME: Blocking (from the caller's perspective) read-exact/write-all over a TCP stream
// ABOUTME: Parameterised by a cancellation token standing in for the read timeout of spec.md §4.1

use crate::message::Message;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Default per-read timeout tick. Callers are expected to use a short
/// timeout so that a cancellation token can interrupt a waiting receiver
/// promptly — spec.md §4.1 calls out ≈100 ms as the reference value.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Write `msg` in full. Returns `false` on any connection error, without
/// partially signalling success.
pub async fn write_message(stream: &mut TcpStream, msg: &dyn Message) -> bool {
    match stream.write_all(msg.as_bytes()).await {
        Ok(()) => true,
        Err(e) => {
            trace!(error = %e, "write_message failed");
            false
        }
    }
}

/// Read exactly `msg.size()` bytes into `msg`, looping over read timeouts
/// until the token fires. Returns `false` on cancellation, on peer
/// half-close with bytes still pending, or on a connection error.
pub async fn read_message(stream: &mut TcpStream, msg: &mut dyn Message, token: &CancellationToken) -> bool {
    read_message_with_timeout(stream, msg, token, DEFAULT_READ_TIMEOUT).await
}

pub async fn read_message_with_timeout(
    stream: &mut TcpStream,
    msg: &mut dyn Message,
    token: &CancellationToken,
    read_timeout: Duration,
) -> bool {
    let size = msg.size();
    let mut buf = vec![0u8; size];
    let mut received = 0usize;

    while received < size {
        match tokio::time::timeout(read_timeout, stream.read(&mut buf[received..])).await {
            Ok(Ok(0)) => return false,
            Ok(Ok(n)) => received += n,
            Ok(Err(e)) => {
                trace!(error = %e, "read_message failed");
                return false;
            }
            Err(_elapsed) => {
                if token.is_cancelled() {
                    return false;
                }
            }
        }
    }

    msg.as_bytes_mut().copy_from_slice(&buf);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AckMessage;
    use crate::message::SimpleMessage;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (server, _) = accepted.unwrap();
        (server, connected.unwrap())
    }

    #[tokio::test]
    async fn ack_round_trip() {
        let (mut server, mut client) = loopback_pair().await;
        let token = CancellationToken::new();

        let write_ok = write_message(&mut client, &AckMessage).await;
        assert!(write_ok);

        let mut received = AckMessage;
        let read_ok = read_message(&mut server, &mut received, &token).await;
        assert!(read_ok);
    }

    #[tokio::test]
    async fn simple_message_round_trip() {
        let (mut server, mut client) = loopback_pair().await;
        let token = CancellationToken::new();

        write_message(&mut client, &SimpleMessage::new(4077)).await;

        let mut received = SimpleMessage::new(0);
        assert!(read_message(&mut server, &mut received, &token).await);
        assert_eq!(received.value(), 4077);
    }

    #[tokio::test]
    async fn read_fails_on_peer_close_mid_message() {
        let (server, client) = loopback_pair().await;
        drop(client);
        let mut server = server;
        let token = CancellationToken::new();

        let mut received = SimpleMessage::new(0);
        assert!(!read_message(&mut server, &mut received, &token).await);
    }

    #[tokio::test]
    async fn read_fails_when_token_cancelled() {
        let (mut server, _client) = loopback_pair().await;
        let token = CancellationToken::new();
        token.cancel();

        let mut received = SimpleMessage::new(0);
        assert!(
            !read_message_with_timeout(&mut server, &mut received, &token, Duration::from_millis(5)).await
        );
    }
}
