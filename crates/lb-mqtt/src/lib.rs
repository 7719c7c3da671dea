//! MQTT bridge contract for the home-automation side of the controller.
//!
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `MqttChannel`, a `rumqttc`-backed implementation with optional TLS
//! - `MockChannel` for testing without a broker
//! - `discovery` builds Home Assistant auto-discovery documents
//! - `publish` builds per-entity state and availability payloads
//! - `command` classifies inbound `$T/set/#` messages

pub mod channel;
pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod publish;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use command::{CommandPayload, IncomingCommand, LightCommand};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use mock::MockChannel;
pub use publish::{availability_message, state_messages, StatePublish};
