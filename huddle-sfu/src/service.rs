use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use crate::config::SfuConfig;
use crate::error::{Result, SfuError};
use crate::peer::Peer;
use crate::room::Room;
use crate::signal::SignalMessage;

/// Label of the default data channel opened on every peer session
const DATA_CHANNEL_LABEL: &str = "data";

/// Grace period after ICE reports disconnected before the peer is
/// treated as gone
const ICE_DISCONNECT_GRACE: Duration = Duration::from_secs(10);

/// Cadence of RTCP Picture Loss Indications for video tracks
const KEYFRAME_INTERVAL: Duration = Duration::from_secs(3);

/// RTP read buffer, sized for a full MTU packet
const RTP_BUFFER_SIZE: usize = 1500;

/// The SFU: terminates one peer connection per participant and relays
/// media packets to every other participant in the same room.
///
/// The room registry is a single mutex-guarded map; operations under it
/// are brief and never span transport I/O.
pub struct SfuService {
    api: API,
    rtc_config: RTCConfiguration,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl SfuService {
    /// Build the SFU with a shared media engine and default interceptors
    pub fn new(config: SfuConfig) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        info!(
            stun_servers = config.stun_servers.len(),
            "SFU initialized"
        );

        Ok(Arc::new(Self {
            api,
            rtc_config: config.rtc_configuration(),
            rooms: Mutex::new(HashMap::new()),
        }))
    }

    // ---- Room registry ----

    /// Return the room for this id, creating it on first use.
    ///
    /// Concurrent callers observe the same instance; rooms carry no
    /// media state at creation, so creating one is cheap.
    pub fn get_or_create_room(&self, room_id: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().unwrap();
        Arc::clone(
            rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Room::new(room_id.to_string()))),
        )
    }

    #[must_use]
    pub fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    /// Remove a room from the registry and signal every task bound to it
    /// to terminate. Idempotent.
    pub fn remove_room(&self, room_id: &str) {
        let room = self.rooms.lock().unwrap().remove(room_id);
        if let Some(room) = room {
            room.close();
            info!(room_id = %room_id, "Room closed");
        }
    }

    /// Drop the room if its last peer just left. Emptiness check and
    /// close happen under both locks, so a concurrent join either lands
    /// before (room survives) or observes the closed room and fails.
    fn remove_room_if_empty(&self, room_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get(room_id) {
            if room.close_if_empty() {
                rooms.remove(room_id);
                info!(room_id = %room_id, "Removed empty room");
            }
        }
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    // ---- Peer lifecycle ----

    /// Create a peer session in a room.
    ///
    /// A second join by the same user replaces the prior peer: the old
    /// session is torn down before this call returns, so two peers with
    /// the same id never coexist.
    pub async fn create_peer(self: &Arc<Self>, room_id: &str, peer_id: &str) -> Result<Arc<Peer>> {
        let room = self.get_or_create_room(room_id);

        let connection = Arc::new(self.api.new_peer_connection(self.rtc_config.clone()).await?);

        // Default data channel for app messages; any failure from here
        // on must close the transport and leave no trace in the room
        let data_channel = match connection.create_data_channel(DATA_CHANNEL_LABEL, None).await {
            Ok(dc) => dc,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e.into());
            }
        };

        let peer = Arc::new(Peer::new(
            peer_id.to_string(),
            room_id.to_string(),
            connection,
            data_channel,
        ));

        let prior = match room.install_peer(Arc::clone(&peer)) {
            Ok(prior) => prior,
            Err(e) => {
                let _ = peer.connection().close().await;
                return Err(e);
            }
        };
        if let Some(prior) = prior {
            info!(room_id = %room_id, peer_id = %peer_id, "Replacing existing peer session");
            self.teardown_peer(&prior).await;
        }

        self.install_callbacks(&peer);

        info!(
            room_id = %room_id,
            peer_id = %peer_id,
            peer_count = room.peer_count(),
            "Peer created"
        );

        Ok(peer)
    }

    /// Install ICE-state and incoming-track handlers.
    ///
    /// Handlers capture the peer weakly and hop onto their own tasks, so
    /// transport callbacks never take the registry lock while the
    /// library holds its own.
    fn install_callbacks(self: &Arc<Self>, peer: &Arc<Peer>) {
        let connection = Arc::clone(peer.connection());

        let sfu = Arc::clone(self);
        let weak = Arc::downgrade(peer);
        connection.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let sfu = Arc::clone(&sfu);
            let weak = weak.clone();
            Box::pin(async move {
                let Some(peer) = weak.upgrade() else { return };
                debug!(peer_id = %peer.id(), state = %state, "ICE connection state changed");

                match state {
                    RTCIceConnectionState::Disconnected => {
                        warn!(peer_id = %peer.id(), "ICE disconnected, starting grace period");
                        tokio::spawn(async move {
                            tokio::time::sleep(ICE_DISCONNECT_GRACE).await;
                            if peer.connection().ice_connection_state()
                                == RTCIceConnectionState::Disconnected
                            {
                                info!(peer_id = %peer.id(), "Grace period expired, removing peer");
                                sfu.teardown_peer(&peer).await;
                            }
                        });
                    }
                    RTCIceConnectionState::Failed | RTCIceConnectionState::Closed => {
                        tokio::spawn(async move {
                            sfu.teardown_peer(&peer).await;
                        });
                    }
                    _ => {}
                }
            })
        }));

        let sfu = Arc::clone(self);
        let weak = Arc::downgrade(peer);
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sfu = Arc::clone(&sfu);
            let weak = weak.clone();
            Box::pin(async move {
                let Some(peer) = weak.upgrade() else { return };
                tokio::spawn(sfu.fan_out_track(peer, track));
            })
        }));
    }

    /// Remove a peer from its room, close its transport, drop its queued
    /// signals. Exactly-once; callers may race.
    ///
    /// Tracks leave the room map before the transport closes, and the
    /// room itself is torn down when its last peer goes.
    pub async fn teardown_peer(&self, peer: &Arc<Peer>) {
        if !peer.begin_teardown() {
            return;
        }

        if let Some(room) = self.get_room(peer.room_id()) {
            if room.remove_peer(peer) {
                info!(
                    room_id = %peer.room_id(),
                    peer_id = %peer.id(),
                    "Peer removed from room"
                );
            }
            if room.is_empty() {
                self.remove_room_if_empty(peer.room_id());
            }
        }

        if let Err(e) = peer.connection().close().await {
            debug!(peer_id = %peer.id(), error = %e, "Error closing peer connection");
        }
    }

    // ---- Track fan-out ----

    /// Forward a newly surfaced remote track to every other peer in the
    /// room and start its forwarder and keyframe pacer.
    async fn fan_out_track(self: Arc<Self>, peer: Arc<Peer>, remote: Arc<TrackRemote>) {
        let Some(room) = self.get_room(peer.room_id()) else {
            return;
        };
        if room.is_closed() {
            return;
        }

        let track_id = remote.id();
        info!(
            room_id = %room.id(),
            peer_id = %peer.id(),
            track_id = %track_id,
            kind = %remote.kind(),
            "Remote track received"
        );

        let local = Arc::new(TrackLocalStaticRTP::new(
            remote.codec().capability.clone(),
            track_id.clone(),
            peer.id().to_string(),
        ));

        room.insert_track(&track_id, Arc::clone(&local));
        peer.add_local_track(&track_id, Arc::clone(&local));

        // Offer the track to everyone already in the room. A failure for
        // one subscriber does not abort the fan-out; a full signal queue
        // marks that subscriber as failed.
        for subscriber in room.peers_except(peer.id()) {
            match self
                .offer_track(&subscriber, &local, peer.id(), room.id(), &track_id)
                .await
            {
                Ok(()) => {}
                Err(SfuError::SignalQueueFull(id)) => {
                    warn!(peer_id = %id, "Signal queue overflow, tearing peer down");
                    let sfu = Arc::clone(&self);
                    tokio::spawn(async move {
                        sfu.teardown_peer(&subscriber).await;
                    });
                }
                Err(e) => {
                    warn!(
                        peer_id = %subscriber.id(),
                        track_id = %track_id,
                        error = %e,
                        "Failed to offer track to peer"
                    );
                }
            }
        }

        // Forwarder: remote RTP -> local track, until read error, closed
        // pipe, or room close
        let close = room.close_token();
        let reader = Arc::clone(&remote);
        let writer = Arc::clone(&local);
        let forwarder_track = track_id.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; RTP_BUFFER_SIZE];
            loop {
                tokio::select! {
                    () = close.cancelled() => break,
                    res = reader.read(&mut buf) => {
                        let Ok((pkt, _)) = res else { break };
                        match writer.write_rtp(&pkt).await {
                            Ok(_) => {}
                            Err(err) if err == webrtc::Error::ErrClosedPipe => break,
                            Err(err) => {
                                warn!(track_id = %forwarder_track, error = %err, "Forwarder write failed");
                                break;
                            }
                        }
                    }
                }
            }
            debug!(track_id = %forwarder_track, "Forwarder stopped");
        });

        // Keyframe pacer: periodic PLI toward the sender so late joiners
        // get a decodable frame promptly
        let close = room.close_token();
        let connection = Arc::clone(peer.connection());
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + KEYFRAME_INTERVAL, KEYFRAME_INTERVAL);
            loop {
                tokio::select! {
                    () = close.cancelled() => break,
                    _ = ticker.tick() => {
                        if remote.kind() == RTPCodecType::Video {
                            let pli = PictureLossIndication {
                                sender_ssrc: 0,
                                media_ssrc: remote.ssrc(),
                            };
                            if let Err(err) = connection.write_rtcp(&[Box::new(pli)]).await {
                                debug!(error = %err, "PLI write failed, stopping pacer");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Attach a forwarded track to one subscriber and push the
    /// renegotiation offer onto its signal queue
    async fn offer_track(
        &self,
        subscriber: &Arc<Peer>,
        track: &Arc<TrackLocalStaticRTP>,
        origin_peer_id: &str,
        room_id: &str,
        track_id: &str,
    ) -> Result<()> {
        subscriber
            .connection()
            .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let offer = subscriber.connection().create_offer(None).await?;
        let sdp = offer.sdp.clone();
        subscriber.connection().set_local_description(offer).await?;

        subscriber.enqueue_signal(SignalMessage::offer(sdp, origin_peer_id, room_id, track_id))
    }

    // ---- Signaling dispatch ----

    /// Apply an inbound offer and enqueue exactly one answer.
    ///
    /// On glare the newest offer is authoritative: a pending remote
    /// offer is simply superseded, no rollback.
    pub async fn handle_offer(&self, peer: &Arc<Peer>, sdp: String) -> Result<()> {
        if peer.connection().signaling_state() == RTCSignalingState::HaveRemoteOffer {
            debug!(peer_id = %peer.id(), "Offer glare, newest offer supersedes the pending one");
        }

        let offer = RTCSessionDescription::offer(sdp)?;
        peer.connection().set_remote_description(offer).await?;

        let answer = peer.connection().create_answer(None).await?;
        let sdp = answer.sdp.clone();
        peer.connection().set_local_description(answer).await?;

        peer.enqueue_signal(SignalMessage::answer(sdp, peer.id(), peer.room_id()))
    }

    /// Apply an inbound answer; accepted only while a local offer is
    /// pending, otherwise logged and discarded.
    pub async fn handle_answer(&self, peer: &Arc<Peer>, sdp: String) -> Result<()> {
        if peer.connection().signaling_state() != RTCSignalingState::HaveLocalOffer {
            debug!(
                peer_id = %peer.id(),
                state = %peer.connection().signaling_state(),
                "Answer received in unexpected signaling state, discarding"
            );
            return Ok(());
        }

        let answer = RTCSessionDescription::answer(sdp)?;
        peer.connection().set_remote_description(answer).await?;
        Ok(())
    }

    /// Add a trickled ICE candidate
    pub async fn handle_candidate(
        &self,
        peer: &Arc<Peer>,
        candidate: RTCIceCandidateInit,
    ) -> Result<()> {
        if candidate.candidate.is_empty() {
            return Err(SfuError::EmptyCandidate);
        }
        if peer.connection().ice_connection_state() == RTCIceConnectionState::Closed {
            return Err(SfuError::ConnectionClosed);
        }

        peer.connection().add_ice_candidate(candidate).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalKind;

    fn sfu() -> Arc<SfuService> {
        SfuService::new(SfuConfig::default()).unwrap()
    }

    /// Build a client-side peer connection for driving offers at the SFU
    async fn client_connection() -> Arc<webrtc::peer_connection::RTCPeerConnection> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).unwrap();
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_room_returns_same_instance() {
        let sfu = sfu();

        let room1 = sfu.get_or_create_room("room-a");
        let room2 = sfu.get_or_create_room("room-a");
        assert!(Arc::ptr_eq(&room1, &room2));
        assert_eq!(sfu.room_count(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_room_concurrent() {
        let sfu = sfu();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sfu = Arc::clone(&sfu);
                tokio::spawn(async move { sfu.get_or_create_room("room-a") })
            })
            .collect();

        let mut rooms = Vec::new();
        for handle in handles {
            rooms.push(handle.await.unwrap());
        }

        assert_eq!(sfu.room_count(), 1);
        assert!(rooms.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_remove_room_idempotent() {
        let sfu = sfu();

        let room = sfu.get_or_create_room("room-a");
        sfu.remove_room("room-a");
        assert!(room.is_closed());
        assert_eq!(sfu.room_count(), 0);

        // Second removal is a no-op
        sfu.remove_room("room-a");
        assert_eq!(sfu.room_count(), 0);
    }

    #[tokio::test]
    async fn test_create_peer_registers_in_room() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        assert_eq!(peer.id(), "alice");
        assert_eq!(peer.data_channel().label(), "data");

        let room = sfu.get_room("room-a").unwrap();
        assert_eq!(room.peer_count(), 1);
        assert!(room.get_peer("alice").is_some());

        sfu.teardown_peer(&peer).await;
    }

    #[tokio::test]
    async fn test_duplicate_join_replaces_prior_peer() {
        let sfu = sfu();

        let first = sfu.create_peer("room-a", "alice").await.unwrap();
        let second = sfu.create_peer("room-a", "alice").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let room = sfu.get_room("room-a").unwrap();
        assert_eq!(room.peer_count(), 1);
        assert!(Arc::ptr_eq(&room.get_peer("alice").unwrap(), &second));

        // The prior transport was closed by the replacement
        assert_eq!(
            first.connection().connection_state(),
            webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState::Closed
        );

        sfu.teardown_peer(&second).await;
    }

    #[tokio::test]
    async fn test_teardown_removes_peer_and_tracks() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        let room = sfu.get_room("room-a").unwrap();

        // Simulate a published track
        let track = Arc::new(TrackLocalStaticRTP::new(
            webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                ..Default::default()
            },
            "track-1".to_string(),
            "alice".to_string(),
        ));
        room.insert_track("track-1", Arc::clone(&track));
        peer.add_local_track("track-1", track);
        assert!(room.contains_track("track-1"));

        sfu.teardown_peer(&peer).await;

        assert!(!room.contains_track("track-1"));
        assert_eq!(room.track_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_room_removed_after_last_peer() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        let room = sfu.get_room("room-a").unwrap();
        assert_eq!(sfu.room_count(), 1);

        sfu.teardown_peer(&peer).await;

        assert_eq!(sfu.room_count(), 0);
        assert!(room.is_closed());
    }

    #[tokio::test]
    async fn test_teardown_is_exactly_once() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        sfu.teardown_peer(&peer).await;
        // Racing callers find the work already done
        sfu.teardown_peer(&peer).await;

        assert_eq!(sfu.room_count(), 0);
    }

    #[tokio::test]
    async fn test_signal_queue_overflow() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();

        for _ in 0..crate::peer::SIGNAL_QUEUE_CAPACITY {
            peer.enqueue_signal(SignalMessage::answer("v=0".to_string(), "alice", "room-a"))
                .unwrap();
        }

        let err = peer
            .enqueue_signal(SignalMessage::answer("v=0".to_string(), "alice", "room-a"))
            .unwrap_err();
        assert!(matches!(err, SfuError::SignalQueueFull(_)));

        sfu.teardown_peer(&peer).await;
    }

    #[tokio::test]
    async fn test_offer_yields_exactly_one_answer() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();

        // Drive a real offer from a client-side connection
        let client = client_connection().await;
        client.create_data_channel("data", None).await.unwrap();
        let offer = client.create_offer(None).await.unwrap();

        sfu.handle_offer(&peer, offer.sdp).await.unwrap();

        let mut rx = peer.take_signal_receiver().unwrap();
        let answer = rx.try_recv().unwrap();
        assert_eq!(answer.kind, SignalKind::Answer);
        assert!(answer.sdp.is_some());
        assert_eq!(answer.user_id, "alice");
        assert_eq!(answer.meeting_id, "room-a");
        // Exactly one answer, nothing else queued
        assert!(rx.try_recv().is_err());

        let _ = client.close().await;
        sfu.teardown_peer(&peer).await;
    }

    #[tokio::test]
    async fn test_answer_in_unexpected_state_discarded() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();

        // Build a syntactically valid answer via a two-connection dance
        let offerer = client_connection().await;
        let answerer = client_connection().await;
        offerer.create_data_channel("data", None).await.unwrap();
        let offer = offerer.create_offer(None).await.unwrap();
        answerer.set_remote_description(offer).await.unwrap();
        let answer = answerer.create_answer(None).await.unwrap();

        // The SFU peer has no local offer pending, so this is discarded
        // without error
        sfu.handle_answer(&peer, answer.sdp).await.unwrap();
        assert_eq!(
            peer.connection().signaling_state(),
            RTCSignalingState::Stable
        );

        let _ = offerer.close().await;
        let _ = answerer.close().await;
        sfu.teardown_peer(&peer).await;
    }

    #[tokio::test]
    async fn test_empty_candidate_rejected() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        let err = sfu
            .handle_candidate(&peer, RTCIceCandidateInit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SfuError::EmptyCandidate));

        sfu.teardown_peer(&peer).await;
    }

    #[tokio::test]
    async fn test_candidate_on_closed_connection_rejected() {
        let sfu = sfu();

        let peer = sfu.create_peer("room-a", "alice").await.unwrap();
        sfu.teardown_peer(&peer).await;

        let candidate = RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54400 typ host".to_string(),
            ..Default::default()
        };
        let err = sfu.handle_candidate(&peer, candidate).await.unwrap_err();
        assert!(matches!(err, SfuError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_closed_room_rejects_new_peer() {
        let sfu = sfu();

        let room = sfu.get_or_create_room("room-a");
        room.close();

        let err = sfu.create_peer("room-a", "alice").await.unwrap_err();
        assert!(matches!(err, SfuError::RoomClosed(_)));
        assert_eq!(room.peer_count(), 0);
    }
}
