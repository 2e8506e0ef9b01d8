use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Participant;

/// Account record as the marketplace core exposes it to the chat layer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
}

impl UserProfile {
    pub fn into_participant(self) -> Participant {
        Participant {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
        }
    }
}

/// Identity lookup against the marketplace's account base. Accounts are
/// created and verified elsewhere; the chat layer only resolves them.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` means the id does not belong to any known account.
    async fn resolve(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;
}

pub struct PgUserDirectory {
    pool: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, username, display_name, avatar_url, is_verified \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserProfile {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
            avatar_url: row.get("avatar_url"),
            verified: row.get("is_verified"),
        }))
    }
}

/// Fixed set of accounts for tests.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id, profile);
    }

    /// Convenience: register a verified account and return its id.
    pub fn add_verified(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(UserProfile {
            id,
            username: username.to_string(),
            display_name: None,
            avatar_url: None,
            verified: true,
        });
        id
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn resolve(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }
}
