//! Hook event socket server

use crate::core::events::HookMessage;
use anyhow::{Context, Result};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on a single message
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Called synchronously for every decoded message
pub type MessageHandler = Arc<dyn Fn(HookMessage) + Send + Sync>;

/// Why a payload was rejected
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("empty message")]
    Empty,
    #[error("message is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string 'event' field")]
    MissingEvent,
}

/// Decode one raw payload into a [`HookMessage`]
///
/// Optional fields with a non-string value are treated as absent.
pub fn decode_message(bytes: &[u8]) -> Result<HookMessage, MessageError> {
    let text = std::str::from_utf8(bytes)?.trim();
    if text.is_empty() {
        return Err(MessageError::Empty);
    }

    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(MessageError::NotAnObject)?;

    let event = obj
        .get("event")
        .and_then(Value::as_str)
        .ok_or(MessageError::MissingEvent)?;
    let field = |name: &str| obj.get(name).and_then(Value::as_str).map(str::to_string);

    Ok(HookMessage {
        event: event.to_string(),
        tool: field("tool"),
        session_id: field("session_id"),
    })
}

/// Accepts hook connections on a Unix socket and hands each message to a handler
pub struct SocketServer {
    path: PathBuf,
    handler: MessageHandler,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SocketServer {
    pub fn new(path: impl Into<PathBuf>, handler: MessageHandler, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            handler,
            read_timeout,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            task: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the socket and spawn the accept loop
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove stale socket: {:?}", self.path))?;
        }

        let listener = UnixListener::bind(&self.path)
            .with_context(|| format!("Failed to bind socket: {:?}", self.path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set socket permissions: {:?}", self.path))?;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        self.running.store(true, Ordering::SeqCst);
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.handler),
            self.read_timeout,
            stop_rx,
        )));

        info!("Listening for hook events on {:?}", self.path);
        Ok(())
    }

    /// Close the listener, wait for the accept loop and remove the socket file
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Socket accept task failed: {}", e);
            }
        }

        if self.running.swap(false, Ordering::SeqCst) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove socket {:?}: {}", self.path, e);
                }
            }
            info!("Socket server stopped");
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: MessageHandler,
    read_timeout: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("Accept loop stopping");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        handle_connection(stream, &handler, read_timeout).await;
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, handler: &MessageHandler, read_timeout: Duration) {
    let payload = match tokio::time::timeout(read_timeout, read_payload(&mut stream)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!("Failed to read hook message: {}", e);
            return;
        }
        Err(_) => {
            warn!("Timed out reading hook message after {:?}", read_timeout);
            return;
        }
    };

    let message = match decode_message(&payload) {
        Ok(message) => message,
        Err(MessageError::Empty) => {
            debug!("Ignoring empty hook message");
            return;
        }
        Err(e) => {
            warn!("Dropping hook message: {}", e);
            return;
        }
    };

    debug!("Hook message: {:?}", message);
    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!("Hook message handler panicked");
    }
}

/// Read until EOF, the size ceiling, or a complete JSON document
async fn read_payload(stream: &mut UnixStream) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = MAX_MESSAGE_SIZE - payload.len();
        payload.extend_from_slice(&chunk[..n.min(room)]);

        if payload.len() >= MAX_MESSAGE_SIZE || serde_json::from_slice::<Value>(&payload).is_ok() {
            break;
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::io::AsyncWriteExt;

    type Received = Arc<Mutex<Vec<HookMessage>>>;

    fn collector() -> (MessageHandler, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: MessageHandler = Arc::new(move |msg| sink.lock().push(msg));
        (handler, received)
    }

    async fn send_raw(path: &Path, bytes: &[u8]) {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();
        // Wait for the server to close its side
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    }

    #[test]
    fn test_decode_full_message() {
        let msg = decode_message(br#"{"event":"PreToolUse","tool":"Read","session_id":"s1"}"#).unwrap();
        assert_eq!(msg, HookMessage::new("PreToolUse").with_tool("Read").with_session("s1"));
    }

    #[test]
    fn test_decode_surrounding_whitespace() {
        let msg = decode_message(b"  {\"event\":\"Stop\"}\n").unwrap();
        assert_eq!(msg.event, "Stop");
        assert!(msg.tool.is_none());
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert!(matches!(decode_message(b""), Err(MessageError::Empty)));
        assert!(matches!(decode_message(b" \n\t"), Err(MessageError::Empty)));
        assert!(matches!(decode_message(&[0xff, 0xfe, b'{']), Err(MessageError::Encoding(_))));
        assert!(matches!(decode_message(b"{not json"), Err(MessageError::Json(_))));
        assert!(matches!(decode_message(b"[1,2]"), Err(MessageError::NotAnObject)));
        assert!(matches!(decode_message(br#"{"tool":"Read"}"#), Err(MessageError::MissingEvent)));
        assert!(matches!(decode_message(br#"{"event":42}"#), Err(MessageError::MissingEvent)));
    }

    #[test]
    fn test_decode_ignores_non_string_optionals() {
        let msg = decode_message(br#"{"event":"PreToolUse","tool":7,"extra":true}"#).unwrap();
        assert_eq!(msg.event, "PreToolUse");
        assert!(msg.tool.is_none());
    }

    #[tokio::test]
    async fn test_server_dispatches_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let (handler, received) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();
        assert!(server.is_running());

        send_raw(&path, br#"{"event":"SessionStart","session_id":"abc"}"#).await;
        send_raw(&path, br#"{"event":"PreToolUse","tool":"Bash"}"#).await;
        server.stop().await;

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].session_id.as_deref(), Some("abc"));
        assert_eq!(received[1].tool.as_deref(), Some("Bash"));
    }

    #[tokio::test]
    async fn test_bad_payloads_never_reach_handler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let (handler, received) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();

        send_raw(&path, b"").await;
        send_raw(&path, b"   ").await;
        send_raw(&path, b"garbage").await;
        send_raw(&path, &[0xc3, 0x28]).await;
        send_raw(&path, br#"{"tool":"Read"}"#).await;
        send_raw(&path, br#"{"event":"Stop"}"#).await;
        server.stop().await;

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, "Stop");
    }

    #[tokio::test]
    async fn test_complete_document_without_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let (handler, received) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(5));
        server.start().await.unwrap();

        // Write side stays open; the server must not wait for the timeout
        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(br#"{"event":"Stop"}"#).await.unwrap();
        let mut rest = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await;
        assert!(closed.is_ok());

        server.stop().await;
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_drops_partial_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let (handler, received) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_millis(100));
        server.start().await.unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(br#"{"event":"St"#).await.unwrap();
        let mut rest = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await;

        // Server keeps serving after a timeout
        send_raw(&path, br#"{"event":"Stop"}"#).await;
        server.stop().await;

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, "Stop");
    }

    #[tokio::test]
    async fn test_oversized_message_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let (handler, received) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();

        let big = format!(r#"{{"event":"Stop","tool":"{}"}}"#, "x".repeat(MAX_MESSAGE_SIZE));
        let mut stream = UnixStream::connect(&path).await.unwrap();
        // The server may close before everything is written
        let _ = stream.write_all(big.as_bytes()).await;
        let _ = stream.shutdown().await;
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;

        server.stop().await;
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_server_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sock");
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let handler: MessageHandler = Arc::new(move |msg| {
            *c.lock() += 1;
            if msg.event == "Boom" {
                panic!("handler failure");
            }
        });
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();

        send_raw(&path, br#"{"event":"Boom"}"#).await;
        send_raw(&path, br#"{"event":"Stop"}"#).await;
        server.stop().await;

        assert_eq!(*count.lock(), 2);
    }

    #[tokio::test]
    async fn test_stale_socket_and_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/deck.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let (handler, _) = collector();
        let mut server = SocketServer::new(&path, handler, Duration::from_secs(1));
        server.start().await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        server.stop().await;
        assert!(!path.exists());
        assert!(!server.is_running());

        // Second stop is a no-op
        server.stop().await;
        assert!(!server.is_running());
    }
}
