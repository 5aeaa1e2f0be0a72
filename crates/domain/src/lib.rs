//! Domain layer for the Brewfleet backend.
//!
//! This crate contains:
//! - Domain models (Command, Device, batches)
//! - The command lifecycle state machine
//! - Request/response types for the HTTP API

pub mod models;
