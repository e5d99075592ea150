// FloorSync API Library
//
// HTTP and WebSocket surface for the realtime room coordinator

pub mod auth;
pub mod http;

// Re-export commonly used types
pub use http::AppState;
