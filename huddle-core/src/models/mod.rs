pub mod id;
pub mod meeting;
pub mod user;

pub use id::{MeetingId, UserId};
pub use meeting::{
    generate_meeting_code, ChatMessage, Meeting, MeetingParticipant, ParticipantRole,
    MEETING_CODE_LEN,
};
pub use user::{LoginRequest, RegisterRequest, User};
