//! HID module - Stream Deck drivers and the controller that drives the keys

pub mod controller;
pub mod device;
pub mod driver;
pub mod mock;
pub mod protocol;

pub use controller::{ControllerSettings, DeckController};
pub use device::HidDriver;
pub use driver::{Deck, DeckDriver, DeckError, DeckInfo, KeyCallback};
pub use mock::MockDriver;
