use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::id::{MeetingId, UserId};

/// Alphabet for meeting codes: uppercase letters and digits only, so
/// codes survive being read out loud or typed from a phone screen.
const MEETING_CODE_ALPHABET: [char; 36] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Meeting code length. Uniqueness is probabilistic; collisions surface
/// as unique-index violations and the caller retries.
pub const MEETING_CODE_LEN: usize = 11;

/// Generate a random meeting code
#[must_use]
pub fn generate_meeting_code() -> String {
    nanoid::nanoid!(MEETING_CODE_LEN, &MEETING_CODE_ALPHABET)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub title: String,
    pub host_id: UserId,
    pub meeting_code: String,
    /// Plain shared secret compared on join; only meaningful when
    /// `is_private` is set
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Meeting {
    #[must_use]
    pub fn new(title: String, host_id: UserId, is_private: bool, password: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MeetingId::new(),
            title,
            host_id,
            meeting_code: generate_meeting_code(),
            password,
            is_private,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            ended_at: None,
        }
    }

    /// A meeting accepts signaling connections until the host ends it
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Participant role within a meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

impl ParticipantRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Participant => "participant",
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "participant" => Ok(Self::Participant),
            _ => Err(crate::Error::InvalidInput(format!(
                "Unknown participant role: {s}"
            ))),
        }
    }
}

// Database mapping: ParticipantRole <-> TEXT
impl sqlx::Type<sqlx::Postgres> for ParticipantRole {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for ParticipantRole {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ParticipantRole {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.parse::<Self>().map_err(Into::into)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingParticipant {
    pub id: Uuid,
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl MeetingParticipant {
    #[must_use]
    pub fn new(meeting_id: MeetingId, user_id: UserId, role: ParticipantRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            user_id,
            role,
            joined_at: Utc::now(),
            left_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(meeting_id: MeetingId, user_id: UserId, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            user_id,
            message,
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_code_shape() {
        let code = generate_meeting_code();
        assert_eq!(code.len(), MEETING_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_meeting_codes_differ() {
        assert_ne!(generate_meeting_code(), generate_meeting_code());
    }

    #[test]
    fn test_new_meeting_is_active() {
        let meeting = Meeting::new("Standup".to_string(), UserId::new(), false, None);
        assert!(meeting.is_active());
        assert!(meeting.ended_at.is_none());
    }

    #[test]
    fn test_password_not_serialized() {
        let meeting = Meeting::new(
            "Private".to_string(),
            UserId::new(),
            true,
            Some("hunter2".to_string()),
        );

        let json = serde_json::to_string(&meeting).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("host".parse::<ParticipantRole>().unwrap(), ParticipantRole::Host);
        assert!("owner".parse::<ParticipantRole>().is_err());
    }
}
