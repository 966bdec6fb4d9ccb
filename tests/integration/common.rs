//! Shared fixtures for the integration tests

use async_trait::async_trait;
use claude_streamdeck::render::{ButtonRenderer, IconCache, TextRenderer};
use claude_streamdeck::{Config, SessionActions};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Records which actions ran
#[derive(Default)]
pub struct RecordingActions {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingActions {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SessionActions for RecordingActions {
    async fn new_session(&self) -> bool {
        self.calls.lock().push("new");
        true
    }

    async fn resume_session(&self) -> bool {
        self.calls.lock().push("resume");
        true
    }

    async fn stop_session(&self) -> bool {
        self.calls.lock().push("stop");
        true
    }
}

/// Configuration rooted in a temporary directory with short timings
pub fn test_config() -> (Config, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.paths.socket = dir.path().join("run/streamdeck.sock");
    config.paths.assets = dir.path().join("icons");
    config.paths.log = dir.path().join("log/streamdeck.log");
    config.display.fonts = vec![];
    config.timing.socket_timeout_ms = 500;
    config.timing.reconnect_delay_ms = 20;
    config.timing.flash_duration_ms = 5;
    config.timing.poll_interval_ms = 20;
    (config, dir)
}

/// Renders images the way the daemon does for [`test_config`]
pub fn renderer(assets: &Path) -> ButtonRenderer {
    ButtonRenderer::new(96, Arc::new(IconCache::new(assets)), TextRenderer::builtin(14.0))
}

/// Poll `condition` for up to two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
