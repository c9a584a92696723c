//! Packs the trip fields the reimbursement schema has no columns for into
//! the row's free-text `notes` column: a fixed tag followed by a JSON
//! payload. Rows written before the tag existed (or by other tools) decode
//! to a usable fallback instead of failing.

use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::trip::{TripInput, TripReason},
};

pub const METADATA_PREFIX: &str = "[REV_META]";

/// The packed fields. JSON keys stay camelCase for compatibility with rows
/// written by earlier versions of the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripMetadata {
    pub reason: TripReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    pub one_way_miles: f64,
    pub round_trip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
}

impl TripMetadata {
    pub fn from_input(input: &TripInput) -> Self {
        Self {
            reason: input.reason,
            destination_address: input.destination_address.clone(),
            one_way_miles: input.one_way_miles,
            round_trip: input.round_trip,
            user_notes: input.notes.clone(),
        }
    }
}

pub fn encode(meta: &TripMetadata) -> Result<String, AppError> {
    let payload = serde_json::to_string(meta).map_err(|err| AppError::Other(err.into()))?;
    Ok(format!("{METADATA_PREFIX}{payload}"))
}

/// Total function: malformed or legacy notes degrade to a fallback record
/// with the one-way distance taken from the row's native miles column and
/// the raw text preserved verbatim as the user's notes.
pub fn decode(notes: Option<&str>, row_miles: f64) -> TripMetadata {
    let Some(raw) = notes else {
        return fallback(None, row_miles);
    };
    let Some(payload) = raw.strip_prefix(METADATA_PREFIX) else {
        return fallback(Some(raw), row_miles);
    };
    serde_json::from_str(payload).unwrap_or_else(|_| fallback(Some(raw), row_miles))
}

fn fallback(notes: Option<&str>, row_miles: f64) -> TripMetadata {
    TripMetadata {
        reason: TripReason::Other,
        destination_address: None,
        one_way_miles: row_miles,
        round_trip: false,
        user_notes: notes.map(str::to_owned),
    }
}
