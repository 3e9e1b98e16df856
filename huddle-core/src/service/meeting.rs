use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;

use crate::{
    models::{ChatMessage, Meeting, MeetingId, MeetingParticipant, ParticipantRole, UserId},
    repository::{ChatStore, MeetingStore},
    Error, Result,
};

/// Meeting service: meeting lifecycle, participants, and chat persistence
///
/// Chat here is storage only. Real-time chat rides the peer data channel;
/// this service never broadcasts.
pub struct MeetingService {
    meetings: Arc<dyn MeetingStore>,
    chats: Arc<dyn ChatStore>,
}

impl MeetingService {
    #[must_use]
    pub fn new(meetings: Arc<dyn MeetingStore>, chats: Arc<dyn ChatStore>) -> Self {
        Self { meetings, chats }
    }

    /// Create a meeting and register the host as its first participant
    ///
    /// The meeting code is random; a collision shows up as an
    /// `AlreadyExists` from the unique index and the caller retries.
    pub async fn create_meeting(
        &self,
        title: &str,
        host_id: UserId,
        is_private: bool,
        password: Option<String>,
    ) -> Result<Meeting> {
        let meeting = self
            .meetings
            .create(&Meeting::new(
                title.to_string(),
                host_id,
                is_private,
                password,
            ))
            .await?;

        self.meetings
            .add_participant(&MeetingParticipant::new(
                meeting.id,
                host_id,
                ParticipantRole::Host,
            ))
            .await?;

        info!(meeting_id = %meeting.id, host_id = %host_id, "Meeting created");
        Ok(meeting)
    }

    /// Join a meeting by code
    ///
    /// Rejoining after a leave resets `joined_at` and clears `left_at`
    /// instead of inserting a second participant row.
    pub async fn join_meeting(
        &self,
        meeting_code: &str,
        user_id: UserId,
        password: &str,
    ) -> Result<Meeting> {
        let meeting = self
            .meetings
            .get_by_code(meeting_code)
            .await?
            .ok_or_else(|| Error::NotFound("Meeting not found".to_string()))?;

        if meeting.is_private {
            let expected = meeting.password.as_deref().unwrap_or("");
            // Constant-time compare; the length check alone would leak,
            // ct_eq handles equal-length slices
            let matches = expected.len() == password.len()
                && expected.as_bytes().ct_eq(password.as_bytes()).into();
            if !matches {
                return Err(Error::Authentication("Invalid meeting password".to_string()));
            }
        }

        let participants = self.meetings.participants(&meeting.id).await?;
        if let Some(existing) = participants.into_iter().find(|p| p.user_id == user_id) {
            if existing.left_at.is_some() {
                let mut participant = existing;
                participant.joined_at = Utc::now();
                participant.left_at = None;
                self.meetings.update_participant(&participant).await?;
            }
        } else {
            self.meetings
                .add_participant(&MeetingParticipant::new(
                    meeting.id,
                    user_id,
                    ParticipantRole::Participant,
                ))
                .await?;
        }

        info!(meeting_id = %meeting.id, user_id = %user_id, "Participant joined");
        Ok(meeting)
    }

    /// Mark a participant as having left the meeting
    pub async fn leave_meeting(&self, meeting_id: &MeetingId, user_id: &UserId) -> Result<()> {
        let participants = self.meetings.participants(meeting_id).await?;
        if let Some(mut participant) = participants
            .into_iter()
            .find(|p| p.user_id == *user_id && p.left_at.is_none())
        {
            participant.left_at = Some(Utc::now());
            self.meetings.update_participant(&participant).await?;
        }
        Ok(())
    }

    /// End a meeting; host only, idempotent
    pub async fn end_meeting(&self, meeting_id: &MeetingId, caller_id: &UserId) -> Result<()> {
        let meeting = self
            .meetings
            .get_by_id(meeting_id)
            .await?
            .ok_or_else(|| Error::NotFound("Meeting not found".to_string()))?;

        if meeting.host_id != *caller_id {
            return Err(Error::Authorization(
                "Only the host can end a meeting".to_string(),
            ));
        }

        self.meetings.end_meeting(meeting_id).await?;
        info!(meeting_id = %meeting_id, "Meeting ended");
        Ok(())
    }

    pub async fn get_meeting(&self, meeting_id: &MeetingId) -> Result<Meeting> {
        self.meetings
            .get_by_id(meeting_id)
            .await?
            .ok_or_else(|| Error::NotFound("Meeting not found".to_string()))
    }

    pub async fn get_meeting_by_code(&self, code: &str) -> Result<Meeting> {
        self.meetings
            .get_by_code(code)
            .await?
            .ok_or_else(|| Error::NotFound("Meeting not found".to_string()))
    }

    pub async fn list_active_for_user(&self, user_id: &UserId) -> Result<Vec<Meeting>> {
        self.meetings.list_active_for_user(user_id).await
    }

    pub async fn participants(&self, meeting_id: &MeetingId) -> Result<Vec<MeetingParticipant>> {
        self.meetings.participants(meeting_id).await
    }

    /// Persist a chat message
    pub async fn save_chat_message(
        &self,
        meeting_id: MeetingId,
        user_id: UserId,
        message: &str,
    ) -> Result<ChatMessage> {
        self.chats
            .append(&ChatMessage::new(meeting_id, user_id, message.to_string()))
            .await
    }

    /// Chat history ordered by `sent_at` ascending
    pub async fn chat_history(&self, meeting_id: &MeetingId) -> Result<Vec<ChatMessage>> {
        self.chats.history(meeting_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{InMemoryChatStore, InMemoryMeetingStore};

    fn service() -> MeetingService {
        MeetingService::new(
            Arc::new(InMemoryMeetingStore::default()),
            Arc::new(InMemoryChatStore::default()),
        )
    }

    #[tokio::test]
    async fn test_create_meeting_registers_host() {
        let svc = service();
        let host = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();
        assert_eq!(meeting.meeting_code.len(), crate::models::MEETING_CODE_LEN);

        let participants = svc.participants(&meeting.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].user_id, host);
        assert_eq!(participants[0].role, ParticipantRole::Host);
    }

    #[tokio::test]
    async fn test_join_by_code() {
        let svc = service();
        let host = UserId::new();
        let guest = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();
        let joined = svc
            .join_meeting(&meeting.meeting_code, guest, "")
            .await
            .unwrap();
        assert_eq!(joined.id, meeting.id);

        let participants = svc.participants(&meeting.id).await.unwrap();
        assert_eq!(participants.len(), 2);
        let p = participants.iter().find(|p| p.user_id == guest).unwrap();
        assert_eq!(p.role, ParticipantRole::Participant);
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let svc = service();
        let err = svc
            .join_meeting("NOSUCHCODE0", UserId::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_join_private_wrong_password() {
        let svc = service();
        let host = UserId::new();
        let guest = UserId::new();

        let meeting = svc
            .create_meeting("Private", host, true, Some("p".to_string()))
            .await
            .unwrap();

        let err = svc
            .join_meeting(&meeting.meeting_code, guest, "q")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        // No participant row for the rejected join
        let participants = svc.participants(&meeting.id).await.unwrap();
        assert!(participants.iter().all(|p| p.user_id != guest));

        // Correct password succeeds
        svc.join_meeting(&meeting.meeting_code, guest, "p")
            .await
            .unwrap();
        let participants = svc.participants(&meeting.id).await.unwrap();
        assert!(participants.iter().any(|p| p.user_id == guest));
    }

    #[tokio::test]
    async fn test_rejoin_updates_existing_row() {
        let svc = service();
        let host = UserId::new();
        let guest = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();
        svc.join_meeting(&meeting.meeting_code, guest, "").await.unwrap();
        svc.leave_meeting(&meeting.id, &guest).await.unwrap();

        let left = svc
            .participants(&meeting.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.user_id == guest)
            .unwrap();
        assert!(left.left_at.is_some());

        svc.join_meeting(&meeting.meeting_code, guest, "").await.unwrap();

        let participants = svc.participants(&meeting.id).await.unwrap();
        let rejoined: Vec<_> = participants.iter().filter(|p| p.user_id == guest).collect();
        // Same row, not a second one
        assert_eq!(rejoined.len(), 1);
        assert_eq!(rejoined[0].id, left.id);
        assert!(rejoined[0].left_at.is_none());
        assert!(rejoined[0].joined_at > left.joined_at);
    }

    #[tokio::test]
    async fn test_end_meeting_host_only() {
        let svc = service();
        let host = UserId::new();
        let guest = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();

        let err = svc.end_meeting(&meeting.id, &guest).await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
        // A rejected end must not mutate state
        assert!(svc.get_meeting(&meeting.id).await.unwrap().is_active());

        svc.end_meeting(&meeting.id, &host).await.unwrap();
        assert!(!svc.get_meeting(&meeting.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_end_meeting_idempotent() {
        let svc = service();
        let host = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();
        svc.end_meeting(&meeting.id, &host).await.unwrap();
        let first_ended_at = svc.get_meeting(&meeting.id).await.unwrap().ended_at;

        svc.end_meeting(&meeting.id, &host).await.unwrap();
        let second_ended_at = svc.get_meeting(&meeting.id).await.unwrap().ended_at;
        assert_eq!(first_ended_at, second_ended_at);
    }

    #[tokio::test]
    async fn test_chat_history_ascending_and_returned() {
        let svc = service();
        let host = UserId::new();

        let meeting = svc.create_meeting("Standup", host, false, None).await.unwrap();
        svc.save_chat_message(meeting.id, host, "first").await.unwrap();
        svc.save_chat_message(meeting.id, host, "second").await.unwrap();
        svc.save_chat_message(meeting.id, host, "third").await.unwrap();

        let history = svc.chat_history(&meeting.id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(history.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }

    #[tokio::test]
    async fn test_list_active_excludes_ended() {
        let svc = service();
        let host = UserId::new();

        let m1 = svc.create_meeting("One", host, false, None).await.unwrap();
        let m2 = svc.create_meeting("Two", host, false, None).await.unwrap();
        svc.end_meeting(&m1.id, &host).await.unwrap();

        let active = svc.list_active_for_user(&host).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, m2.id);
    }
}
