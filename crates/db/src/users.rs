//! User accounts

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, QueryFilter, Set};
use tracing::debug;

use crate::database::Database;
use crate::entity::users;
use crate::error::{StoreError, StoreResult};

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            password_hash: model.password_hash,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new account and return its id.
    /// `AlreadyExists` when the email is taken (exact, case-sensitive match).
    async fn save_user(&self, email: &str, password_hash: &str) -> StoreResult<i64>;

    /// Look up an account by exact email. `NotFound` when absent.
    async fn find_user(&self, email: &str) -> StoreResult<User>;
}

#[async_trait]
impl UserStore for Database {
    async fn save_user(&self, email: &str, password_hash: &str) -> StoreResult<i64> {
        let user = users::ActiveModel {
            id: NotSet,
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(Utc::now()),
        };

        let saved = user
            .insert(self.connection())
            .await
            .map_err(|e| StoreError::on_insert(e, format!("user {}", email)))?;

        debug!("Saved user {} with id {}", email, saved.id);
        Ok(saved.id)
    }

    async fn find_user(&self, email: &str) -> StoreResult<User> {
        users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(self.connection())
            .await?
            .map(User::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", email)))
    }
}
