use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

use crate::error::SfuError;
use crate::signal::SignalMessage;

/// Outbound signal queue capacity. A peer whose queue fills up is a
/// slow consumer and is torn down rather than silently dropping
/// messages.
pub const SIGNAL_QUEUE_CAPACITY: usize = 100;

/// One participant's live media session within a room.
///
/// The Peer owns its transport and its outbound signal queue. It refers
/// to its Room by id only; the Room is resolved through the registry
/// and never closed through a peer.
pub struct Peer {
    id: String,
    room_id: String,
    connection: Arc<RTCPeerConnection>,
    data_channel: Arc<RTCDataChannel>,
    signal_tx: mpsc::Sender<SignalMessage>,
    signal_rx: Mutex<Option<mpsc::Receiver<SignalMessage>>>,
    local_tracks: Mutex<HashMap<String, Arc<TrackLocalStaticRTP>>>,
    torn_down: AtomicBool,
}

impl Peer {
    #[must_use]
    pub fn new(
        id: String,
        room_id: String,
        connection: Arc<RTCPeerConnection>,
        data_channel: Arc<RTCDataChannel>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        Self {
            id,
            room_id,
            connection,
            data_channel,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            local_tracks: Mutex::new(HashMap::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<RTCPeerConnection> {
        &self.connection
    }

    #[must_use]
    pub fn data_channel(&self) -> &Arc<RTCDataChannel> {
        &self.data_channel
    }

    /// Enqueue an outbound signaling message without blocking.
    ///
    /// A full queue means the outbound pump is not keeping up; the
    /// caller tears the peer down rather than dropping the message.
    pub fn enqueue_signal(&self, message: SignalMessage) -> Result<(), SfuError> {
        self.signal_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SfuError::SignalQueueFull(self.id.clone()),
            mpsc::error::TrySendError::Closed(_) => SfuError::PeerGone(self.id.clone()),
        })
    }

    /// Take the receiving end of the signal queue. Consumed exactly once
    /// by this peer's outbound pump.
    #[must_use]
    pub fn take_signal_receiver(&self) -> Option<mpsc::Receiver<SignalMessage>> {
        self.signal_rx.lock().unwrap().take()
    }

    pub fn add_local_track(&self, track_id: &str, track: Arc<TrackLocalStaticRTP>) {
        self.local_tracks
            .lock()
            .unwrap()
            .insert(track_id.to_string(), track);
    }

    #[must_use]
    pub fn local_track_ids(&self) -> Vec<String> {
        self.local_tracks.lock().unwrap().keys().cloned().collect()
    }

    #[must_use]
    pub fn local_track_count(&self) -> usize {
        self.local_tracks.lock().unwrap().len()
    }

    /// Mark the peer as being torn down. Returns true for exactly one
    /// caller; the ICE-failed callback, the grace-period timer and the
    /// router teardown can all race here.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .finish()
    }
}
