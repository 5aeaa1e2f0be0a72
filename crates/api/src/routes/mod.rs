//! HTTP route handlers.

pub mod commands;
pub mod device_api;
pub mod devices;
pub mod health;
