//! Daemon end-to-end tests against the in-memory deck

use crate::common::{renderer, test_config, wait_until, RecordingActions};
use claude_streamdeck::core::layout::SessionAction;
use claude_streamdeck::daemon::DaemonEvent;
use claude_streamdeck::hid::controller::{render_action, render_status};
use claude_streamdeck::hid::mock::{MockCall, MockDriver};
use claude_streamdeck::{ipc, Daemon, HookMessage, Phase};
use std::sync::Arc;

#[tokio::test]
async fn test_hook_events_reach_status_key() {
    let (config, _dir) = test_config();
    let socket = config.socket_path();
    let r = renderer(&config.assets_dir());
    let driver = MockDriver::xl();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions);
    let shutdown = daemon.shutdown_handle();

    let (result, ()) = tokio::join!(daemon.run(), async {
        assert!(wait_until(|| socket.exists()).await);
        assert_eq!(driver.last_image(0), Some(render_status(&r, Phase::Inactive, None)));

        let events = [
            HookMessage::new("SessionStart").with_session("abc"),
            HookMessage::new("UserPromptSubmit"),
            HookMessage::new("PreToolUse").with_tool("NotebookEdit"),
        ];
        for message in &events {
            ipc::send_message(&socket, message).await.unwrap();
        }

        let expected = r.render(Some("status-tool.png"), "NotebookE...", [255, 140, 0]);
        assert!(wait_until(|| driver.last_image(0).as_ref() == Some(&expected)).await);

        ipc::send_message(&socket, &HookMessage::new("PostToolUse")).await.unwrap();
        let thinking = render_status(&r, Phase::Thinking, None);
        assert!(wait_until(|| driver.last_image(0).as_ref() == Some(&thinking)).await);

        shutdown.shutdown();
    });

    result.unwrap();
    assert_eq!(daemon.phase(), Phase::Thinking);
    assert!(!socket.exists());
    assert!(!driver.is_open());

    let calls = driver.calls();
    assert_eq!(&calls[calls.len() - 2..], &[MockCall::Reset, MockCall::Close]);
}

#[tokio::test]
async fn test_key_presses_run_actions() {
    let (config, _dir) = test_config();
    let socket = config.socket_path();
    let r = renderer(&config.assets_dir());
    let driver = MockDriver::xl();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions.clone());
    let shutdown = daemon.shutdown_handle();

    let (result, ()) = tokio::join!(daemon.run(), async {
        assert!(wait_until(|| socket.exists()).await);
        let white = r.solid([255, 255, 255]);

        // Key edges arrive on a foreign thread
        let deck = driver.clone();
        std::thread::spawn(move || deck.press(1)).join().unwrap();
        assert!(wait_until(|| actions.calls() == vec!["new"]).await);

        let images = driver.images(1);
        assert!(images.contains(&white));
        assert_eq!(images.last(), Some(&render_action(&r, SessionAction::New)));

        driver.press(3);
        assert!(wait_until(|| actions.calls() == vec!["new", "stop"]).await);

        // Unbound keys flash but run nothing
        driver.press(20);
        assert!(wait_until(|| driver.images(20).contains(&white)).await);

        // Releases alone do nothing
        driver.emit(2, false);

        shutdown.shutdown();
    });

    result.unwrap();
    assert_eq!(actions.calls(), vec!["new", "stop"]);
}

#[tokio::test]
async fn test_events_handled_while_waiting_for_device() {
    let (config, _dir) = test_config();
    let socket = config.socket_path();
    let r = renderer(&config.assets_dir());
    let driver = MockDriver::new();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions);
    let shutdown = daemon.shutdown_handle();
    let events = daemon.event_sender();

    let (result, ()) = tokio::join!(daemon.run(), async {
        events.send(DaemonEvent::Hook(HookMessage::new("SessionStart"))).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(!socket.exists());

        driver.attach(MockDriver::xl_info());
        assert!(wait_until(|| socket.exists()).await);

        // The phase reached before the deck appeared is shown once it connects
        let idle = render_status(&r, Phase::Idle, None);
        assert!(wait_until(|| driver.last_image(0).as_ref() == Some(&idle)).await);

        shutdown.shutdown();
    });

    result.unwrap();
    assert_eq!(daemon.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_reconnect_after_unplug() {
    let (config, _dir) = test_config();
    let socket = config.socket_path();
    let r = renderer(&config.assets_dir());
    let driver = MockDriver::xl();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions);
    let shutdown = daemon.shutdown_handle();

    let (result, ()) = tokio::join!(daemon.run(), async {
        assert!(wait_until(|| socket.exists()).await);
        ipc::send_message(&socket, &HookMessage::new("SessionStart")).await.unwrap();
        let idle = render_status(&r, Phase::Idle, None);
        assert!(wait_until(|| driver.last_image(0).as_ref() == Some(&idle)).await);

        driver.unplug();
        // Hook events keep working while the deck is away
        ipc::send_message(&socket, &HookMessage::new("UserPromptSubmit")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        driver.clear_calls();
        driver.attach(MockDriver::xl_info());
        assert!(wait_until(|| driver.open_count() == 2).await);

        let thinking = render_status(&r, Phase::Thinking, None);
        assert!(wait_until(|| driver.last_image(0).as_ref() == Some(&thinking)).await);

        shutdown.shutdown();
    });

    result.unwrap();
}

#[tokio::test]
async fn test_shutdown_while_no_device() {
    let (config, _dir) = test_config();
    let socket = config.socket_path();
    let driver = MockDriver::new();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions);
    let shutdown = daemon.shutdown_handle();

    let (result, ()) = tokio::join!(daemon.run(), async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.shutdown();
    });

    result.unwrap();
    assert!(!socket.exists());
    assert_eq!(driver.open_count(), 0);

    // Stopping again is harmless
    daemon.stop().await;
}

#[tokio::test]
async fn test_unusable_directories_abort_startup() {
    let (mut config, dir) = test_config();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    config.paths.socket = blocker.join("streamdeck.sock");

    let driver = MockDriver::xl();
    let actions = Arc::new(RecordingActions::default());
    let mut daemon = Daemon::new(config, Arc::new(driver.clone()), actions);

    assert!(daemon.run().await.is_err());
    assert_eq!(driver.open_count(), 0);
    assert!(!daemon.is_listening());
}
