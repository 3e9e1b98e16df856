//! Huddle API
//!
//! The outward-facing surface of the conferencing backend: the REST API
//! for auth, meetings and chat, plus the WebSocket signaling endpoint
//! that glues clients to the SFU.

pub mod http;

pub use http::{router, AppState};
