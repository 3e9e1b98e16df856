//! Huddle SFU (Selective Forwarding Unit)
//!
//! This crate is the media-routing core of the conferencing backend.
//! The SFU terminates one WebRTC peer connection per participant,
//! receives that participant's media tracks, and relays the raw RTP
//! packets to every other participant in the same room without
//! decoding or re-encoding.
//!
//! ## Architecture
//!
//! - **`SfuService`**: room registry and top-level orchestration
//! - **`Room`**: peers and forwarded tracks under one meeting id
//! - **`Peer`**: a single participant's transport session
//! - **`SignalMessage`**: the JSON wire object shuttled over signaling
//!
//! ## Concurrency
//!
//! Each peer runs an inbound and an outbound signaling pump (owned by
//! the signaling router), plus one forwarder and one keyframe pacer per
//! track it originates. Forwarders and pacers bind to the room's close
//! signal. Registry and room maps sit behind plain mutexes; nothing
//! holds a lock across transport I/O.

mod config;
mod error;
mod peer;
mod room;
mod service;
mod signal;

pub use config::SfuConfig;
pub use error::{Result, SfuError};
pub use peer::{Peer, SIGNAL_QUEUE_CAPACITY};
pub use room::Room;
pub use service::SfuService;
pub use signal::{SignalKind, SignalMessage};
