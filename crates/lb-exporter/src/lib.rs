//! Vendor cloud OTP login and device/group export (C9).
//!
//! A small, self-contained Axum service: out of scope for the core
//! controller, but built here in full so the repository runs end-to-end.
//! Logs a device/group export in, writes the YAML configuration the
//! controller reads at startup.

pub mod cloud_client;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
