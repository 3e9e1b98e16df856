//! Service construction
//!
//! Repositories are constructed here and handed to the services
//! explicitly; there is no process-wide database singleton.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::{
    repository::{ChatRepository, MeetingRepository, UserRepository},
    service::{JwtService, MeetingService, UserService},
    Config,
};

/// Container for the core services the API layer depends on
#[derive(Clone)]
pub struct Services {
    pub user_service: Arc<UserService>,
    pub meeting_service: Arc<MeetingService>,
    pub jwt_service: JwtService,
}

/// Wire repositories and services over a shared pool
pub fn init_services(pool: PgPool, config: &Config) -> Result<Services> {
    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.token_duration_hours)
        .map_err(|e| anyhow::anyhow!("Failed to create JWT service: {e}"))?;

    let user_repo = Arc::new(UserRepository::new(pool.clone()));
    let meeting_repo = Arc::new(MeetingRepository::new(pool.clone()));
    let chat_repo = Arc::new(ChatRepository::new(pool));

    let user_service = Arc::new(UserService::new(user_repo, jwt_service.clone()));
    let meeting_service = Arc::new(MeetingService::new(meeting_repo, chat_repo));

    info!("Core services initialized");

    Ok(Services {
        user_service,
        meeting_service,
        jwt_service,
    })
}
