use std::sync::Arc;

use crate::{
    models::User,
    repository::UserStore,
    service::auth::{hash_password, verify_password, JwtService},
    Error, Result,
};

/// User service: registration and login
pub struct UserService {
    users: Arc<dyn UserStore>,
    jwt: JwtService,
}

impl UserService {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, jwt: JwtService) -> Self {
        Self { users, jwt }
    }

    /// Register a new user and issue a token
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(User, String)> {
        if self.users.get_by_email(email).await?.is_some() {
            return Err(Error::AlreadyExists(
                "User with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(password).await?;
        let user = self
            .users
            .create(&User::new(
                email.to_string(),
                password_hash,
                display_name.to_string(),
            ))
            .await?;

        let token = self.jwt.sign_token(&user.id, &user.email)?;
        Ok((user, token))
    }

    /// Authenticate a user and issue a token
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        // The same error for unknown email and bad password, so login
        // responses do not reveal which emails are registered
        let user = self
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| Error::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(Error::Authentication(
                "Invalid email or password".to_string(),
            ));
        }

        let token = self.jwt.sign_token(&user.id, &user.email)?;
        Ok((user, token))
    }

    pub async fn get_user(&self, id: &crate::models::UserId) -> Result<Option<User>> {
        self.users.get_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::InMemoryUserStore;

    fn service() -> UserService {
        UserService::new(
            Arc::new(InMemoryUserStore::default()),
            JwtService::new("test-secret", 24).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let svc = service();

        let (user, token) = svc
            .register("a@example.com", "password123", "Alice")
            .await
            .unwrap();
        assert_eq!(user.email, "a@example.com");
        assert!(!token.is_empty());

        let (logged_in, _) = svc.login("a@example.com", "password123").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let svc = service();

        svc.register("a@example.com", "password123", "Alice")
            .await
            .unwrap();
        let err = svc
            .register("a@example.com", "other-password", "Alice 2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let svc = service();

        svc.register("a@example.com", "password123", "Alice")
            .await
            .unwrap();
        let err = svc.login("a@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let svc = service();
        let err = svc.login("missing@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
