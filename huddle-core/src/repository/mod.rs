//! Postgres repositories
//!
//! Each store is a narrow trait so the services above can be wired to
//! the Postgres implementations in production and to in-memory doubles
//! in tests. Repositories hold a cloned `PgPool` and run plain queries;
//! they are slow, fallible collaborators compared to everything else in
//! the process.

mod chat;
mod meeting;
mod user;

pub use chat::ChatRepository;
pub use meeting::MeetingRepository;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::{
    models::{ChatMessage, Meeting, MeetingId, MeetingParticipant, User, UserId},
    Result,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;
    async fn get_by_id(&self, id: &UserId) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn create(&self, meeting: &Meeting) -> Result<Meeting>;
    async fn get_by_id(&self, id: &MeetingId) -> Result<Option<Meeting>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Meeting>>;
    /// Active meetings where the user is host or participant, newest first
    async fn list_active_for_user(&self, user_id: &UserId) -> Result<Vec<Meeting>>;
    /// Set `ended_at` once; a second call is a no-op
    async fn end_meeting(&self, id: &MeetingId) -> Result<()>;
    async fn add_participant(&self, participant: &MeetingParticipant) -> Result<()>;
    async fn update_participant(&self, participant: &MeetingParticipant) -> Result<()>;
    async fn participants(&self, meeting_id: &MeetingId) -> Result<Vec<MeetingParticipant>>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, message: &ChatMessage) -> Result<ChatMessage>;
    /// Full history for a meeting, ordered by `sent_at` ascending
    async fn history(&self, meeting_id: &MeetingId) -> Result<Vec<ChatMessage>>;
}
