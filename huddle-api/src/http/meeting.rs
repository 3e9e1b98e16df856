//! Meeting endpoints: lifecycle, participants, chat persistence

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use huddle_core::models::{ChatMessage, Meeting, MeetingId, MeetingParticipant};

use super::{middleware::AuthUser, AppResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingResponse {
    pub id: String,
    pub title: String,
    pub host_id: String,
    pub meeting_code: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<Meeting> for MeetingResponse {
    fn from(meeting: Meeting) -> Self {
        Self {
            id: meeting.id.to_string(),
            title: meeting.title,
            host_id: meeting.host_id.to_string(),
            meeting_code: meeting.meeting_code,
            is_private: meeting.is_private,
            created_at: meeting.created_at,
            ended_at: meeting.ended_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub id: Uuid,
    pub meeting_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

impl From<MeetingParticipant> for ParticipantResponse {
    fn from(p: MeetingParticipant) -> Self {
        Self {
            id: p.id,
            meeting_id: p.meeting_id.to_string(),
            user_id: p.user_id.to_string(),
            role: p.role.as_str().to_string(),
            joined_at: p.joined_at,
            left_at: p.left_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub meeting_id: String,
    pub user_id: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            meeting_id: m.meeting_id.to_string(),
            user_id: m.user_id.to_string(),
            message: m.message,
            sent_at: m.sent_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub title: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeetingEnvelope {
    pub meeting: MeetingResponse,
}

/// `POST /api/meetings`
pub async fn create_meeting(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateMeetingRequest>,
) -> AppResult<Json<MeetingEnvelope>> {
    let meeting = state
        .meeting_service
        .create_meeting(&req.title, auth.user_id, req.is_private, req.password)
        .await?;

    Ok(Json(MeetingEnvelope {
        meeting: meeting.into(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMeetingRequest {
    pub meeting_code: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/meetings/join`
pub async fn join_meeting(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<JoinMeetingRequest>,
) -> AppResult<Json<MeetingEnvelope>> {
    let meeting = state
        .meeting_service
        .join_meeting(&req.meeting_code, auth.user_id, &req.password)
        .await?;

    Ok(Json(MeetingEnvelope {
        meeting: meeting.into(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeetingListResponse {
    pub meetings: Vec<MeetingResponse>,
}

/// `GET /api/meetings`
pub async fn list_meetings(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<MeetingListResponse>> {
    let meetings = state
        .meeting_service
        .list_active_for_user(&auth.user_id)
        .await?;

    Ok(Json(MeetingListResponse {
        meetings: meetings.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /api/meetings/{id}`
pub async fn get_meeting(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MeetingEnvelope>> {
    let meeting = state
        .meeting_service
        .get_meeting(&MeetingId::from_uuid(id))
        .await?;

    Ok(Json(MeetingEnvelope {
        meeting: meeting.into(),
    }))
}

/// `POST /api/meetings/{id}/end`
///
/// Host only; also closes the SFU room so every bound task terminates.
pub async fn end_meeting(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let meeting_id = MeetingId::from_uuid(id);
    state
        .meeting_service
        .end_meeting(&meeting_id, &auth.user_id)
        .await?;

    state.sfu.remove_room(&meeting_id.to_string());

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantListResponse {
    pub participants: Vec<ParticipantResponse>,
}

/// `GET /api/meetings/{id}/participants`
pub async fn participants(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ParticipantListResponse>> {
    let participants = state
        .meeting_service
        .participants(&MeetingId::from_uuid(id))
        .await?;

    Ok(Json(ParticipantListResponse {
        participants: participants.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageEnvelope {
    pub message: ChatMessageResponse,
}

/// `POST /api/meetings/{id}/chat`
pub async fn send_chat(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendChatRequest>,
) -> AppResult<Json<ChatMessageEnvelope>> {
    let saved = state
        .meeting_service
        .save_chat_message(MeetingId::from_uuid(id), auth.user_id, &req.message)
        .await?;

    Ok(Json(ChatMessageEnvelope {
        message: saved.into(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessageResponse>,
}

/// `GET /api/meetings/{id}/chat`
pub async fn chat_history(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ChatHistoryResponse>> {
    let messages = state
        .meeting_service
        .chat_history(&MeetingId::from_uuid(id))
        .await?;

    Ok(Json(ChatHistoryResponse {
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}
