//! WebSocket layer: live device/admin connections and command push.

pub mod protocol;
pub mod registry;
pub mod session;

pub use registry::ConnectionRegistry;
pub use session::ws_handler;
