use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A household member trips can be attributed to. Deleting a child never
/// deletes trips, only the links pointing at it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: String,
    pub user_id: String,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
}
