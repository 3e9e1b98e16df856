//! In-memory store doubles for service-level tests
//!
//! These mirror the Postgres repositories' observable behavior closely
//! enough for unit tests: unique meeting codes, idempotent end, ordered
//! chat history.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use crate::{
    models::{ChatMessage, Meeting, MeetingId, MeetingParticipant, User, UserId},
    repository::{ChatStore, MeetingStore, UserStore},
    Error, Result,
};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(Error::AlreadyExists("Email already registered".to_string()));
        }
        users.push(user.clone());
        Ok(user.clone())
    }

    async fn get_by_id(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == *id)
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryMeetingStore {
    meetings: Mutex<Vec<Meeting>>,
    participants: Mutex<Vec<MeetingParticipant>>,
}

#[async_trait]
impl MeetingStore for InMemoryMeetingStore {
    async fn create(&self, meeting: &Meeting) -> Result<Meeting> {
        let mut meetings = self.meetings.lock().unwrap();
        if meetings
            .iter()
            .any(|m| m.meeting_code == meeting.meeting_code)
        {
            return Err(Error::AlreadyExists(
                "Meeting code already in use".to_string(),
            ));
        }
        meetings.push(meeting.clone());
        Ok(meeting.clone())
    }

    async fn get_by_id(&self, id: &MeetingId) -> Result<Option<Meeting>> {
        Ok(self
            .meetings
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == *id)
            .cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Meeting>> {
        Ok(self
            .meetings
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.meeting_code == code)
            .cloned())
    }

    async fn list_active_for_user(&self, user_id: &UserId) -> Result<Vec<Meeting>> {
        let participant_meetings: Vec<MeetingId> = self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == *user_id)
            .map(|p| p.meeting_id)
            .collect();

        let mut meetings: Vec<Meeting> = self
            .meetings
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.ended_at.is_none())
            .filter(|m| m.host_id == *user_id || participant_meetings.contains(&m.id))
            .cloned()
            .collect();
        meetings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(meetings)
    }

    async fn end_meeting(&self, id: &MeetingId) -> Result<()> {
        let mut meetings = self.meetings.lock().unwrap();
        if let Some(meeting) = meetings
            .iter_mut()
            .find(|m| m.id == *id && m.ended_at.is_none())
        {
            let now = Utc::now();
            meeting.ended_at = Some(now);
            meeting.updated_at = now;
        }
        Ok(())
    }

    async fn add_participant(&self, participant: &MeetingParticipant) -> Result<()> {
        self.participants.lock().unwrap().push(participant.clone());
        Ok(())
    }

    async fn update_participant(&self, participant: &MeetingParticipant) -> Result<()> {
        let mut participants = self.participants.lock().unwrap();
        if let Some(existing) = participants.iter_mut().find(|p| p.id == participant.id) {
            *existing = participant.clone();
            Ok(())
        } else {
            Err(Error::NotFound("Participant not found".to_string()))
        }
    }

    async fn participants(&self, meeting_id: &MeetingId) -> Result<Vec<MeetingParticipant>> {
        let mut participants: Vec<MeetingParticipant> = self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.meeting_id == *meeting_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(participants)
    }
}

#[derive(Default)]
pub struct InMemoryChatStore {
    messages: Mutex<Vec<ChatMessage>>,
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn append(&self, message: &ChatMessage) -> Result<ChatMessage> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(message.clone())
    }

    async fn history(&self, meeting_id: &MeetingId) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.meeting_id == *meeting_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(messages)
    }
}
