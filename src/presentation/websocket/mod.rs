//! WebSocket Gateway
//!
//! Real-time client connections and local fan-out.

pub mod gateway;
pub mod handler;
pub mod messages;

pub use gateway::Gateway;
pub use handler::ws_handler;
pub use messages::{ClientEvent, ServerEvent};
