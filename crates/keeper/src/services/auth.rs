use db::{StoreError, UserStore};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::password::PasswordHasher;
use crate::token::TokenManager;
use crate::validation::{validate_email, validate_password};

/// Account registration and login
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenManager>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    /// Create an account and return its id
    pub async fn register(&self, email: &str, password: &str) -> Result<i64, ServiceError> {
        validate_email(email)?;
        validate_password(password)?;

        let hash = self.hasher.hash(password.to_string()).await?;
        let user_id = self
            .users
            .save_user(email, &hash)
            .await
            .map_err(|e| ServiceError::store("register", e))?;

        info!("Registered user {}", user_id);
        Ok(user_id)
    }

    /// Check credentials and mint a session token. Unknown email and wrong
    /// password both yield `InvalidCredentials` after one hash verification.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }

        let user = match self.users.find_user(email).await {
            Ok(user) => Some(user),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(ServiceError::store("login", e)),
        };

        let stored = user.as_ref().map(|u| u.password_hash.clone());
        if !self.hasher.verify(password.to_string(), stored).await? {
            debug!("Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        let Some(user) = user else {
            return Err(ServiceError::InvalidCredentials);
        };

        let token = self
            .tokens
            .issue(user.id, &user.email)
            .map_err(|e| ServiceError::internal("issue_token", e))?;

        info!("User {} logged in", user.id);
        Ok(token)
    }
}
