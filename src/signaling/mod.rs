pub mod message;
pub mod registry;
pub mod server;
pub mod websocket;

pub use registry::{ConnectionHandle, ConnectionId, Registry};
pub use server::{create_router, AppState, SignalingServer, SIGNALING_PATH};
