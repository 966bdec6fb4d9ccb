//! Keeps the deck in sync with the session phase
//!
//! Owns the open deck, renders the key layout and forwards key edges to a
//! single callback. The deck lock is only held for synchronous driver calls.

use super::driver::{Deck, DeckDriver, DeckInfo, KeyCallback};
use crate::core::config::Config;
use crate::core::layout::{self, SessionAction, STATUS_KEY};
use crate::core::state::{truncate_label, Phase};
use crate::render::{ButtonRenderer, IconCache, TextRenderer};
use anyhow::{Context, Result};
use image::RgbImage;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const FLASH_COLOR: layout::Rgb = [255, 255, 255];

/// Deck settings taken from the configuration
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub key_count: usize,
    pub brightness: u8,
    pub font_size: f32,
    pub fonts: Vec<PathBuf>,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            key_count: config.device.key_count,
            brightness: config.device.brightness,
            font_size: config.display.font_size,
            fonts: config.font_paths(),
        }
    }
}

struct Connection {
    deck: Box<dyn Deck>,
    renderer: ButtonRenderer,
}

#[derive(Default)]
struct Shown {
    phase: Phase,
    tool: Option<String>,
}

pub struct DeckController {
    driver: Arc<dyn DeckDriver>,
    settings: ControllerSettings,
    icons: Arc<IconCache>,
    connection: Mutex<Option<Connection>>,
    shown: Mutex<Shown>,
    key_callback: Arc<Mutex<Option<KeyCallback>>>,
}

impl DeckController {
    pub fn new(driver: Arc<dyn DeckDriver>, settings: ControllerSettings, icons: Arc<IconCache>) -> Self {
        Self {
            driver,
            settings,
            icons,
            connection: Mutex::new(None),
            shown: Mutex::new(Shown::default()),
            key_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the first deck with the configured key count
    ///
    /// `Ok(false)` when no suitable deck is attached. An error means a deck
    /// was opened but could not be initialized; it is closed again.
    pub fn connect(&self) -> Result<bool> {
        if self.is_connected() {
            return Ok(true);
        }
        // Drop a stale handle from a previous connection
        self.close_connection();

        let decks = match self.driver.enumerate() {
            Ok(decks) => decks,
            Err(e) => {
                warn!("Failed to enumerate Stream Decks: {}", e);
                return Ok(false);
            }
        };

        for info in decks.iter().filter(|d| d.key_count == self.settings.key_count) {
            let deck = match self.driver.open(info) {
                Ok(deck) => deck,
                Err(e) => {
                    warn!("Failed to open {} ({}): {}", info.model, info.id, e);
                    continue;
                }
            };

            let connection = self
                .initialize(deck)
                .with_context(|| format!("Failed to initialize {}", info.model))?;
            *self.connection.lock() = Some(connection);
            *self.shown.lock() = Shown::default();
            log_connected(info);
            return Ok(true);
        }

        debug!("No Stream Deck with {} keys attached", self.settings.key_count);
        Ok(false)
    }

    fn initialize(&self, mut deck: Box<dyn Deck>) -> Result<Connection> {
        let prepared = match deck.reset() {
            Ok(()) => deck.set_brightness(self.settings.brightness),
            Err(e) => Err(e),
        };
        if let Err(e) = prepared {
            deck.close();
            return Err(e.into());
        }

        let slot = Arc::clone(&self.key_callback);
        deck.set_key_callback(Box::new(move |key, pressed| {
            let guard = slot.lock();
            if let Some(callback) = guard.as_ref() {
                if catch_unwind(AssertUnwindSafe(|| callback(key, pressed))).is_err() {
                    error!("Key callback panicked on key {}", key);
                }
            }
        }));

        let text = TextRenderer::load(&self.settings.fonts, self.settings.font_size);
        let renderer = ButtonRenderer::new(deck.key_pixels(), Arc::clone(&self.icons), text);
        let mut connection = Connection { deck, renderer };

        if let Err(e) = paint_layout(&mut connection) {
            connection.deck.close();
            return Err(e.into());
        }
        Ok(connection)
    }

    /// Show `phase` on the status key
    pub fn update_state(&self, phase: Phase, tool: Option<&str>) {
        {
            let mut shown = self.shown.lock();
            shown.phase = phase;
            shown.tool = tool.map(str::to_string);
        }

        let mut guard = self.connection.lock();
        let Some(connection) = guard.as_mut() else {
            return;
        };
        let image = render_status(&connection.renderer, phase, tool);
        if let Err(e) = connection.deck.set_key_image(STATUS_KEY, &image) {
            warn!("Failed to update status key: {}", e);
        }
    }

    /// Replace the key edge callback
    pub fn set_key_callback(&self, callback: KeyCallback) {
        *self.key_callback.lock() = Some(callback);
    }

    /// Briefly light a key white, then restore what it showed
    pub async fn flash_key(&self, key: u8, duration: Duration) {
        {
            let mut guard = self.connection.lock();
            let Some(connection) = guard.as_mut() else {
                return;
            };
            let flash = connection.renderer.solid(FLASH_COLOR);
            if let Err(e) = connection.deck.set_key_image(key, &flash) {
                warn!("Failed to flash key {}: {}", key, e);
                return;
            }
        }

        tokio::time::sleep(duration).await;

        let (phase, tool) = {
            let shown = self.shown.lock();
            (shown.phase, shown.tool.clone())
        };
        let mut guard = self.connection.lock();
        let Some(connection) = guard.as_mut() else {
            return;
        };
        let restored = if key == STATUS_KEY {
            Some(render_status(&connection.renderer, phase, tool.as_deref()))
        } else {
            SessionAction::from_key(key).map(|action| render_action(&connection.renderer, action))
        };
        if let Some(image) = restored {
            if let Err(e) = connection.deck.set_key_image(key, &image) {
                warn!("Failed to restore key {}: {}", key, e);
            }
        }
    }

    /// Blank and release the deck
    pub fn disconnect(&self) {
        let Some(mut connection) = self.connection.lock().take() else {
            return;
        };

        if connection.deck.is_connected() {
            let blank = connection.renderer.blank();
            for key in 0..connection.deck.key_count() as u8 {
                if let Err(e) = connection.deck.set_key_image(key, &blank) {
                    debug!("Failed to blank key {}: {}", key, e);
                    break;
                }
            }
            if let Err(e) = connection.deck.reset() {
                debug!("Failed to reset deck: {}", e);
            }
        }
        connection.deck.close();
        *self.shown.lock() = Shown::default();
        info!("Stream Deck disconnected");
    }

    /// A deck is held and still reachable
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|c| c.deck.is_connected())
    }

    /// Phase currently shown on the status key
    pub fn shown_phase(&self) -> Phase {
        self.shown.lock().phase
    }

    fn close_connection(&self) {
        if let Some(mut connection) = self.connection.lock().take() {
            connection.deck.close();
        }
    }
}

impl Drop for DeckController {
    fn drop(&mut self) {
        self.close_connection();
    }
}

fn log_connected(info: &DeckInfo) {
    info!(
        "Connected to {} ({} keys, serial {})",
        info.model,
        info.key_count,
        info.serial.as_deref().unwrap_or("unknown")
    );
}

fn paint_layout(connection: &mut Connection) -> Result<(), super::driver::DeckError> {
    let renderer = &connection.renderer;
    let deck = &mut connection.deck;

    deck.set_key_image(STATUS_KEY, &render_status(renderer, Phase::Inactive, None))?;
    for action in SessionAction::ALL {
        deck.set_key_image(action.key(), &render_action(renderer, action))?;
    }

    let blank = renderer.blank();
    for key in layout::FIRST_UNBOUND_KEY..deck.key_count() as u8 {
        deck.set_key_image(key, &blank)?;
    }
    Ok(())
}

/// Status key image; a running tool is labelled with its (truncated) name
pub fn render_status(renderer: &ButtonRenderer, phase: Phase, tool: Option<&str>) -> RgbImage {
    let display = phase.display();
    let title = match (phase, tool) {
        (Phase::ToolRunning, Some(tool)) if !tool.is_empty() => truncate_label(tool, layout::MAX_TOOL_LABEL),
        _ => display.title.to_string(),
    };
    renderer.render(Some(display.icon), &title, display.color)
}

pub fn render_action(renderer: &ButtonRenderer, action: SessionAction) -> RgbImage {
    let button = action.button();
    renderer.render(Some(button.icon), button.title, button.color)
}
