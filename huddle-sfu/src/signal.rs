//! Signaling wire messages
//!
//! One JSON object per WebSocket frame. Field names follow the browser
//! conventions the frontend expects (camelCase, `type` discriminant).

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,

    /// Session description, for offer/answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,

    /// ICE candidate init, for candidate messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<RTCIceCandidateInit>,

    pub user_id: String,
    pub meeting_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,

    /// Target user id for directed messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl SignalMessage {
    /// Offer announcing a new forwarded track to a subscriber
    #[must_use]
    pub fn offer(sdp: String, user_id: &str, meeting_id: &str, track_id: &str) -> Self {
        Self {
            kind: SignalKind::Offer,
            sdp: Some(sdp),
            candidate: None,
            user_id: user_id.to_string(),
            meeting_id: meeting_id.to_string(),
            track_id: Some(track_id.to_string()),
            target: None,
        }
    }

    /// Answer to an inbound offer
    #[must_use]
    pub fn answer(sdp: String, user_id: &str, meeting_id: &str) -> Self {
        Self {
            kind: SignalKind::Answer,
            sdp: Some(sdp),
            candidate: None,
            user_id: user_id.to_string(),
            meeting_id: meeting_id.to_string(),
            track_id: None,
            target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let msg = SignalMessage::offer("v=0".to_string(), "user-1", "meeting-1", "track-1");
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains(r#""type":"offer""#));
        assert!(json.contains(r#""userId":"user-1""#));
        assert!(json.contains(r#""meetingId":"meeting-1""#));
        assert!(json.contains(r#""trackId":"track-1""#));
        // Absent optionals are omitted, not null
        assert!(!json.contains("candidate"));
        assert!(!json.contains("target"));
    }

    #[test]
    fn test_candidate_roundtrip() {
        let json = r#"{
            "type": "candidate",
            "candidate": {
                "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 54400 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            },
            "userId": "user-1",
            "meetingId": "meeting-1"
        }"#;

        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, SignalKind::Candidate);
        let candidate = msg.candidate.unwrap();
        assert!(candidate.candidate.starts_with("candidate:1"));
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
    }

    #[test]
    fn test_answer_has_no_track() {
        let msg = SignalMessage::answer("v=0".to_string(), "user-1", "meeting-1");
        assert_eq!(msg.kind, SignalKind::Answer);
        assert!(msg.track_id.is_none());
    }
}
