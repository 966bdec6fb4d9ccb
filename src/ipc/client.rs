//! Hook-side sender

use crate::core::events::HookMessage;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// Deliver one message to a running daemon
pub async fn send_message(path: &Path, message: &HookMessage) -> Result<()> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("Failed to connect to daemon socket: {:?}", path))?;

    let payload = serde_json::to_vec(message).context("Failed to serialize hook message")?;
    stream
        .write_all(&payload)
        .await
        .context("Failed to send hook message")?;
    stream.shutdown().await.context("Failed to close hook connection")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{MessageHandler, SocketServer};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_without_daemon_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = send_message(&dir.path().join("missing.sock"), &HookMessage::new("Stop")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: MessageHandler = Arc::new(move |msg| sink.lock().push(msg));
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();

        let msg = HookMessage::new("PreToolUse").with_tool("Grep").with_session("s9");
        send_message(&path, &msg).await.unwrap();

        for _ in 0..50 {
            if !received.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        server.stop().await;

        assert_eq!(*received.lock(), vec![msg]);
    }
}
