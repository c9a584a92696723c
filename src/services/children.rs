use chrono::Utc;
use uuid::Uuid;

use crate::{db::DbPool, error::AppError, models::child::Child};

#[derive(Clone)]
pub struct ChildService {
    db: DbPool,
}

impl ChildService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Child>, AppError> {
        let children = sqlx::query_as::<_, Child>(
            "SELECT id, user_id, nickname, created_at FROM children \
             WHERE user_id = ?1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(children)
    }

    pub async fn create(&self, user_id: &str, nickname: &str) -> Result<Child, AppError> {
        let child = Child {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            nickname: nickname.to_owned(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO children (id, user_id, nickname, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&child.id)
            .bind(&child.user_id)
            .bind(&child.nickname)
            .bind(child.created_at)
            .execute(&self.db)
            .await?;
        Ok(child)
    }

    pub async fn update(
        &self,
        user_id: &str,
        child_id: &str,
        nickname: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE children SET nickname = ?1 WHERE id = ?2 AND user_id = ?3")
            .bind(nickname)
            .bind(child_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Deleting a child also drops its trip links; the trips themselves
    /// are untouched.
    pub async fn delete(&self, user_id: &str, child_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM children WHERE id = ?1 AND user_id = ?2")
            .bind(child_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() > 0 {
            sqlx::query("DELETE FROM trip_children WHERE child_id = ?1")
                .bind(child_id)
                .execute(&self.db)
                .await?;
        }
        Ok(())
    }
}
