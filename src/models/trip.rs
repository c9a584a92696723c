use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const TRIP_REASONS: [TripReason; 5] = [
    TripReason::Visit,
    TripReason::School,
    TripReason::Meeting,
    TripReason::Medical,
    TripReason::Other,
];

/// Why a trip was driven. Stored lowercase; displayed via [`TripReason::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripReason {
    Visit,
    School,
    Meeting,
    Medical,
    Other,
}

impl TripReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripReason::Visit => "visit",
            TripReason::School => "school",
            TripReason::Meeting => "meeting",
            TripReason::Medical => "medical",
            TripReason::Other => "other",
        }
    }

    /// Capitalised display form.
    pub fn label(&self) -> &'static str {
        match self {
            TripReason::Visit => "Visit",
            TripReason::School => "School",
            TripReason::Meeting => "Meeting",
            TripReason::Medical => "Medical",
            TripReason::Other => "Other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        TRIP_REASONS.into_iter().find(|r| r.as_str() == raw)
    }
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logged mileage event, hydrated with its associated children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub date: NaiveDate,
    pub reason: TripReason,
    pub destination_name: String,
    pub destination_address: Option<String>,
    pub one_way_miles: f64,
    pub round_trip: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub child_ids: Vec<String>,
}

impl Trip {
    pub fn total_miles(&self) -> f64 {
        total_miles(self.one_way_miles, self.round_trip)
    }

    pub fn month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}

/// The mutable subset of [`Trip`] used for create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct TripInput {
    pub date: NaiveDate,
    pub reason: TripReason,
    pub destination_name: String,
    pub destination_address: Option<String>,
    pub one_way_miles: f64,
    pub round_trip: bool,
    pub notes: Option<String>,
}

impl TripInput {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.destination_name.trim().is_empty() {
            return Err(AppError::Validation("destination name is required".into()));
        }
        if !(self.one_way_miles > 0.0) {
            return Err(AppError::Validation(
                "one-way miles must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn total_miles(&self) -> f64 {
        total_miles(self.one_way_miles, self.round_trip)
    }
}

pub fn total_miles(one_way_miles: f64, round_trip: bool) -> f64 {
    one_way_miles * if round_trip { 2.0 } else { 1.0 }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripTotals {
    pub total_trips: usize,
    pub total_miles: f64,
    pub month_miles: f64,
}

/// Summary over a trip list, with `month_miles` scoped to the current
/// wall-clock month. Tests go through [`calculate_totals_for_month`].
pub fn calculate_totals(trips: &[Trip]) -> TripTotals {
    calculate_totals_for_month(trips, &current_month())
}

pub fn calculate_totals_for_month(trips: &[Trip], month: &str) -> TripTotals {
    let total_miles = trips.iter().map(Trip::total_miles).sum();
    let month_miles = trips
        .iter()
        .filter(|trip| trip.month() == month)
        .map(Trip::total_miles)
        .sum();
    TripTotals {
        total_trips: trips.len(),
        total_miles,
        month_miles,
    }
}

pub fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}
