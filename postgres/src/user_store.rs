//! `PostgreSQL` implementation of [`UserStore`].

use crate::map_sqlx_error;
use async_trait::async_trait;
use eventhub_core::identity::{Announcement, NewUser, Role, User, UserId, UserStore};
use eventhub_core::store::{StoreError, StoreResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at";

/// Users in the `users` table, announced through the `outbox` table.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> StoreResult<User> {
        let role: String = row.try_get("role").map_err(map_sqlx_error)?;
        Ok(User {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            email: row.try_get("email").map_err(map_sqlx_error)?,
            password_hash: row.try_get("password_hash").map_err(map_sqlx_error)?,
            role: role
                .parse::<Role>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        })
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create_user(&self, user: NewUser, announce: Announcement) -> StoreResult<User> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(&format!(
            r"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let created = Self::row_to_user(&row)?;

        if let Some(message) = announce(&created) {
            let outbox_id: i64 = sqlx::query_scalar(
                r"
                INSERT INTO outbox (topic, event_type, event_key, payload, metadata)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(&message.topic)
            .bind(&message.event.event_type)
            .bind(&message.event.key)
            .bind(&message.event.data)
            .bind(&message.event.metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(
                user_id = created.id,
                outbox_id,
                topic = %message.topic,
                "Outbox message written with user"
            );
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
