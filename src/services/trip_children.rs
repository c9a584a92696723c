use std::collections::HashMap;

use sqlx::QueryBuilder;

use crate::{db::DbPool, error::AppError};

pub type TripChildrenMap = HashMap<String, Vec<String>>;

#[derive(Clone)]
pub struct TripChildService {
    db: DbPool,
}

impl TripChildService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Child ids per trip id. Trips with no links are simply absent from the
    /// map; an empty input returns without touching the pool.
    pub async fn list(&self, trip_ids: &[String]) -> Result<TripChildrenMap, AppError> {
        if trip_ids.is_empty() {
            return Ok(TripChildrenMap::new());
        }

        let mut query =
            QueryBuilder::new("SELECT trip_id, child_id FROM trip_children WHERE trip_id IN (");
        let mut ids = query.separated(", ");
        for trip_id in trip_ids {
            ids.push_bind(trip_id);
        }
        ids.push_unseparated(")");

        let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&self.db).await?;

        let mut map = TripChildrenMap::new();
        for (trip_id, child_id) in rows {
            map.entry(trip_id).or_default().push(child_id);
        }
        Ok(map)
    }

    /// Replace-on-write: drop every existing link, then insert the new set.
    /// The two statements are not wrapped in a transaction; a failed insert
    /// leaves the trip with no links at all.
    pub async fn set(&self, trip_id: &str, child_ids: &[String]) -> Result<(), AppError> {
        sqlx::query("DELETE FROM trip_children WHERE trip_id = ?1")
            .bind(trip_id)
            .execute(&self.db)
            .await?;

        if child_ids.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::new("INSERT INTO trip_children (trip_id, child_id) ");
        query.push_values(child_ids, |mut row, child_id| {
            row.push_bind(trip_id).push_bind(child_id);
        });
        query.build().execute(&self.db).await?;
        Ok(())
    }
}
