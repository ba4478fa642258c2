pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod save_queue;
pub mod state;
pub mod ws_handler;

// Re-export the WebSocket handlers to make them easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use ws_handler::{guest_ws_handler, ws_handler};
