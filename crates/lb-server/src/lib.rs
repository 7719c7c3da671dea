//! Local-control smart-lighting controller: terminates the vendor wire
//! protocol over TLS, maintains mesh state, and bridges it to Home
//! Assistant over MQTT.
//!
//! Re-exports every module so `lb-e2e-tests` can drive the controller's
//! internals directly (`CommandApi`, `ConnectionRegistry`, `AckCorrelator`).

pub mod ack;
pub mod command;
pub mod config;
pub mod connection;
pub mod discovery_bridge;
pub mod error;
pub mod mesh_transport;
pub mod perf;
pub mod registry;
pub mod relay;
pub mod supervisor;
pub mod tls;
