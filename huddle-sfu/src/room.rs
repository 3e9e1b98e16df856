use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

use crate::error::{Result, SfuError};
use crate::peer::Peer;

/// A meeting room: the set of peers connected under one meeting id and
/// the forwarded tracks flowing between them.
///
/// The registry owns the Room; the Room owns its Peers. Forwarders and
/// keyframe pacers bind to `close_token` and stop when the room closes.
pub struct Room {
    id: String,
    created_at: Instant,
    close: CancellationToken,
    state: Mutex<RoomState>,
}

struct RoomState {
    peers: HashMap<String, Arc<Peer>>,
    tracks: HashMap<String, Arc<TrackLocalStaticRTP>>,
}

impl Room {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            close: CancellationToken::new(),
            state: Mutex::new(RoomState {
                peers: HashMap::new(),
                tracks: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Token cancelled when the room closes; cloned into every task
    /// bound to the room's lifetime
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Signal every task bound to this room to terminate
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Install a peer, replacing any prior peer with the same id.
    ///
    /// The prior peer (if any) is stripped of its tracks and returned so
    /// the caller can close its transport; two peers with the same id
    /// never coexist in the map.
    pub fn install_peer(&self, peer: Arc<Peer>) -> Result<Option<Arc<Peer>>> {
        let mut state = self.state.lock().unwrap();
        // Closing happens under this same lock, so a closed room can
        // never accept a new peer
        if self.is_closed() {
            return Err(SfuError::RoomClosed(self.id.clone()));
        }

        let prior = state.peers.insert(peer.id().to_string(), peer);
        if let Some(prior) = &prior {
            for track_id in prior.local_track_ids() {
                state.tracks.remove(&track_id);
            }
        }
        Ok(prior)
    }

    /// Remove a peer only if the map still holds this exact instance,
    /// stripping its tracks from the room first.
    ///
    /// The identity check keeps a stale teardown (ICE-closed callback of
    /// a replaced peer) from evicting the replacement.
    pub fn remove_peer(&self, peer: &Arc<Peer>) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.peers.get(peer.id()) {
            Some(current) if Arc::ptr_eq(current, peer) => {}
            _ => return false,
        }
        state.peers.remove(peer.id());
        for track_id in peer.local_track_ids() {
            state.tracks.remove(&track_id);
        }
        true
    }

    /// Close the room if it holds no peers. Returns whether it closed.
    pub fn close_if_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        if state.peers.is_empty() {
            self.close.cancel();
            true
        } else {
            false
        }
    }

    pub fn insert_track(&self, track_id: &str, track: Arc<TrackLocalStaticRTP>) {
        self.state
            .lock()
            .unwrap()
            .tracks
            .insert(track_id.to_string(), track);
    }

    #[must_use]
    pub fn get_peer(&self, peer_id: &str) -> Option<Arc<Peer>> {
        self.state.lock().unwrap().peers.get(peer_id).cloned()
    }

    /// Snapshot of every peer except the given one
    #[must_use]
    pub fn peers_except(&self, peer_id: &str) -> Vec<Arc<Peer>> {
        self.state
            .lock()
            .unwrap()
            .peers
            .values()
            .filter(|p| p.id() != peer_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().peers.is_empty()
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.state.lock().unwrap().tracks.len()
    }

    #[must_use]
    pub fn contains_track(&self, track_id: &str) -> bool {
        self.state.lock().unwrap().tracks.contains_key(track_id)
    }
}
