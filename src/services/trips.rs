use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::trip::{Trip, TripInput},
    services::metadata::{self, TripMetadata},
};

/// The reimbursement table's fixed row shape. `end_text` doubles as the
/// destination name and `miles` holds the already-doubled total; everything
/// else lives in the packed `notes` column.
#[derive(Debug, Clone, FromRow)]
pub struct TripRow {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub miles: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
}

impl TripService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// All trips of a user, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query_as::<_, TripRow>(
            "SELECT id, user_id, date, start_text, end_text, miles, notes, created_at \
             FROM trips WHERE user_id = ?1 ORDER BY date DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn get(&self, user_id: &str, trip_id: &str) -> Result<Trip, AppError> {
        let row = sqlx::query_as::<_, TripRow>(
            "SELECT id, user_id, date, start_text, end_text, miles, notes, created_at \
             FROM trips WHERE id = ?1 AND user_id = ?2",
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(map_row).ok_or(AppError::NotFound)
    }

    pub async fn create(&self, user_id: &str, input: &TripInput) -> Result<Trip, AppError> {
        let row = TripRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            date: input.date,
            start_text: None,
            end_text: Some(input.destination_name.clone()),
            miles: input.total_miles(),
            notes: Some(metadata::encode(&TripMetadata::from_input(input))?),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO trips (id, user_id, date, start_text, end_text, miles, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(row.date)
        .bind(&row.start_text)
        .bind(&row.end_text)
        .bind(row.miles)
        .bind(&row.notes)
        .bind(row.created_at)
        .execute(&self.db)
        .await?;
        Ok(map_row(row))
    }

    pub async fn update(
        &self,
        user_id: &str,
        trip_id: &str,
        input: &TripInput,
    ) -> Result<Trip, AppError> {
        let notes = metadata::encode(&TripMetadata::from_input(input))?;
        let result = sqlx::query(
            "UPDATE trips SET date = ?1, end_text = ?2, miles = ?3, notes = ?4 \
             WHERE id = ?5 AND user_id = ?6",
        )
        .bind(input.date)
        .bind(&input.destination_name)
        .bind(input.total_miles())
        .bind(&notes)
        .bind(trip_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        self.get(user_id, trip_id).await
    }

    /// Removes the row only; association cleanup is the caller's job.
    pub async fn delete(&self, user_id: &str, trip_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM trips WHERE id = ?1 AND user_id = ?2")
            .bind(trip_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

fn map_row(row: TripRow) -> Trip {
    let meta = metadata::decode(row.notes.as_deref(), row.miles);
    Trip {
        id: row.id,
        date: row.date,
        reason: meta.reason,
        destination_name: row.end_text.unwrap_or_default(),
        destination_address: meta.destination_address,
        one_way_miles: meta.one_way_miles,
        round_trip: meta.round_trip,
        notes: meta.user_notes,
        created_at: row.created_at,
        child_ids: Vec::new(),
    }
}
