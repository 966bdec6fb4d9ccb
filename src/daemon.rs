//! Daemon orchestration
//!
//! Wires the hook socket, the state machine and the deck together. Hook
//! messages and key presses both arrive as [`DaemonEvent`]s on one channel
//! and are handled on the daemon task in arrival order.

use crate::actions::{self, SessionActions};
use crate::core::config::Config;
use crate::core::events::HookMessage;
use crate::core::layout::SessionAction;
use crate::core::machine::{ListenerId, StateMachine};
use crate::core::state::Phase;
use crate::hid::{ControllerSettings, DeckController, DeckDriver};
use crate::ipc::{MessageHandler, SocketServer};
use crate::render::IconCache;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for in-flight key actions
const ACTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Work delivered to the daemon task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Message from the hook socket
    Hook(HookMessage),
    /// A deck key went down
    KeyPressed(u8),
}

/// Sender side of the daemon event queue, safe to use from any thread
#[derive(Clone)]
pub struct DaemonEventSender {
    tx: mpsc::UnboundedSender<DaemonEvent>,
}

impl DaemonEventSender {
    pub fn new(tx: mpsc::UnboundedSender<DaemonEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: DaemonEvent) -> Result<(), mpsc::error::SendError<DaemonEvent>> {
        self.tx.send(event)
    }
}

/// Requests daemon shutdown; clones share the same signal
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub struct Daemon {
    config: Config,
    machine: StateMachine,
    controller: Arc<DeckController>,
    actions: Arc<dyn SessionActions>,
    server: SocketServer,
    events: DaemonEventSender,
    events_rx: mpsc::UnboundedReceiver<DaemonEvent>,
    shutdown: ShutdownHandle,
    shutdown_rx: watch::Receiver<bool>,
    listener: Option<ListenerId>,
    key_tasks: JoinSet<()>,
    stopped: bool,
}

impl Daemon {
    pub fn new(config: Config, driver: Arc<dyn DeckDriver>, actions: Arc<dyn SessionActions>) -> Self {
        let (tx, events_rx) = mpsc::unbounded_channel();
        let events = DaemonEventSender::new(tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let icons = Arc::new(IconCache::new(config.assets_dir()));
        let controller = Arc::new(DeckController::new(
            driver,
            ControllerSettings::from_config(&config),
            icons,
        ));

        let server = SocketServer::new(
            config.socket_path(),
            hook_handler(events.clone()),
            config.timing.socket_timeout(),
        );

        Self {
            config,
            machine: StateMachine::new(),
            controller,
            actions,
            server,
            events,
            events_rx,
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
            shutdown_rx,
            listener: None,
            key_tasks: JoinSet::new(),
            stopped: false,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Queue an event as if it came from the socket or the deck
    pub fn event_sender(&self) -> DaemonEventSender {
        self.events.clone()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn is_listening(&self) -> bool {
        self.server.is_running()
    }

    /// Bring everything up: directories, state display, device, socket
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Claude Stream Deck daemon");

        self.config
            .ensure_directories()
            .context("Failed to create daemon directories")?;

        if self.listener.is_none() {
            let controller = Arc::clone(&self.controller);
            self.listener = Some(self.machine.add_listener(move |old, new, ctx| {
                info!(
                    "State changed: {} -> {} (tool: {})",
                    old,
                    new,
                    ctx.tool_name.as_deref().unwrap_or("-")
                );
                controller.update_state(new, ctx.tool_name.as_deref());
                Ok(())
            }));
        }

        let events = self.events.clone();
        self.controller.set_key_callback(Box::new(move |key, pressed| {
            if pressed && events.send(DaemonEvent::KeyPressed(key)).is_err() {
                debug!("Daemon gone, dropping key {}", key);
            }
        }));

        if !self.connect_with_retry().await {
            info!("Shutdown requested before a Stream Deck was found");
            return Ok(());
        }

        self.server
            .start()
            .await
            .context("Failed to start hook socket server")?;

        info!("Daemon started");
        Ok(())
    }

    /// Start, then supervise until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        let result = self.supervise().await;
        self.stop().await;
        result
    }

    async fn supervise(&mut self) -> Result<()> {
        self.start().await?;

        let mut poll = tokio::time::interval(self.config.timing.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown_rx) => break,
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(finished) = self.key_tasks.join_next(), if !self.key_tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Key action task failed: {}", e);
                    }
                }
                _ = poll.tick() => {
                    if !self.controller.is_connected() {
                        warn!("Stream Deck disconnected, attempting reconnect");
                        if !self.connect_with_retry().await {
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Shut everything down; safe to call more than once
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Stopping daemon");

        self.shutdown.shutdown();
        self.server.stop().await;

        let drained = tokio::time::timeout(ACTION_DRAIN_TIMEOUT, async {
            while self.key_tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Abandoning unfinished key actions");
            self.key_tasks.abort_all();
        }

        self.controller.disconnect();
        if let Some(id) = self.listener.take() {
            self.machine.remove_listener(id);
        }
        info!("Daemon stopped");
    }

    /// Connect the deck, retrying until it appears or shutdown is requested
    ///
    /// Events keep being handled while waiting. Returns false on shutdown.
    async fn connect_with_retry(&mut self) -> bool {
        let delay = self.config.timing.reconnect_delay();
        let mut attempts = 0u32;

        loop {
            if self.shutdown.is_shutdown() {
                return false;
            }

            match self.controller.connect() {
                Ok(true) => {
                    let phase = self.machine.phase();
                    if phase != Phase::Inactive {
                        let tool = self.machine.context().tool_name.clone();
                        self.controller.update_state(phase, tool.as_deref());
                    }
                    return true;
                }
                Ok(false) if attempts == 0 => {
                    warn!("Stream Deck not found, retrying every {:?}", delay)
                }
                Ok(false) => debug!("Stream Deck still not found (attempt {})", attempts + 1),
                Err(e) => warn!("Stream Deck connection failed: {:#}", e),
            }
            attempts += 1;

            let wait = tokio::time::sleep(delay);
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut self.shutdown_rx) => return false,
                    _ = &mut wait => break,
                    Some(event) = self.events_rx.recv() => self.handle_event(event),
                }
            }
        }
    }

    fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Hook(message) => {
                debug!("Processing event {} (tool: {:?})", message.event, message.tool);
                self.machine.process_event(
                    &message.event,
                    message.session_id.as_deref(),
                    message.tool.as_deref(),
                );
            }
            DaemonEvent::KeyPressed(key) => self.spawn_key_action(key),
        }
    }

    /// Flash the key, then run its action
    fn spawn_key_action(&mut self, key: u8) {
        let controller = Arc::clone(&self.controller);
        let actions = Arc::clone(&self.actions);
        let flash = self.config.timing.flash_duration();

        self.key_tasks.spawn(async move {
            controller.flash_key(key, flash).await;

            let Some(action) = SessionAction::from_key(key) else {
                debug!("Unbound key pressed: {}", key);
                return;
            };
            info!("Key {} pressed: {} session", key, action);
            if !actions::perform(actions.as_ref(), action).await {
                warn!("Action '{}' failed", action);
            }
        });
    }
}

/// Socket handler that queues messages for the daemon task
fn hook_handler(events: DaemonEventSender) -> MessageHandler {
    Arc::new(move |message: HookMessage| {
        if message.event.is_empty() {
            warn!("Dropping hook message without event");
            return;
        }
        if events.send(DaemonEvent::Hook(message)).is_err() {
            debug!("Daemon gone, dropping hook message");
        }
    })
}
